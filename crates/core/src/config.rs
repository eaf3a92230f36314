// TrackRig - Track Test Rig Co-Simulation
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::dynamics::integrator::IntegratorSettings;
use crate::{RigError, RigResult};
use serde::{Deserialize, Serialize};

/// Timing of the co-simulation loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Macro-step, seconds.
    pub step_size: f64,
    /// Simulated time between two observer render notifications.
    pub render_interval: f64,
    /// Tracks under test, one force exchange entry each.
    pub num_tracks: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            step_size: 1e-5,
            render_interval: 1e-5,
            num_tracks: 1,
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> RigResult<()> {
        if !(self.step_size > 0.0 && self.step_size.is_finite()) {
            return Err(RigError::Configuration(format!(
                "step size must be positive, got {}",
                self.step_size
            )));
        }
        if !(self.render_interval > 0.0 && self.render_interval.is_finite()) {
            return Err(RigError::Configuration(format!(
                "render interval must be positive, got {}",
                self.render_interval
            )));
        }
        if self.num_tracks == 0 {
            return Err(RigError::Configuration(
                "at least one track is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Macro-steps between render notifications.
    pub fn render_cadence(&self) -> u64 {
        trackrig_config::render_steps(self.render_interval, self.step_size)
    }
}

impl From<&trackrig_config::RigConfig> for LoopConfig {
    fn from(config: &trackrig_config::RigConfig) -> Self {
        Self {
            step_size: config.simulation.step_size,
            render_interval: config.simulation.render_interval,
            num_tracks: 1,
        }
    }
}

impl From<&trackrig_config::IntegratorSettings> for IntegratorSettings {
    fn from(settings: &trackrig_config::IntegratorSettings) -> Self {
        Self {
            alpha: settings.alpha,
            max_iterations: settings.max_iterations,
            abs_tolerance: settings.abs_tolerance,
            step_control: settings.step_control,
            scaling: settings.scaling,
            modified_newton: settings.modified_newton,
            max_bisections: settings.max_bisections,
        }
    }
}
