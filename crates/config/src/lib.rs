// TrackRig - Track Test Rig Co-Simulation
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SCHEMA_VERSION: &str = "1.0";

/// Deepest step subdivision the integrator will attempt.
pub const MAX_BISECTIONS: u32 = 30;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// Track shoe families a track assembly description may name.
///
/// Only the band families can be mounted on the test rig; the pin families
/// parse so that a description can be rejected with a precise message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackShoeType {
    SinglePin,
    DoublePin,
    #[serde(alias = "bushing")]
    BandBushing,
    #[serde(alias = "ancf", alias = "band")]
    BandAncf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleSide {
    #[default]
    Left,
    Right,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SimulationSettings {
    /// Fixed macro-step, seconds.
    #[serde(default = "default_step_size")]
    pub step_size: f64,
    /// Interval between two render frames, seconds.
    #[serde(default = "default_step_size")]
    pub render_interval: f64,
}

fn default_step_size() -> f64 {
    1e-5
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            step_size: default_step_size(),
            render_interval: default_step_size(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DriverKeyframe {
    pub time: f64,
    #[serde(default)]
    pub throttle: f64,
    #[serde(default)]
    pub displacement: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DriverSettings {
    #[serde(default = "default_post_limit")]
    pub post_limit: f64,
    /// Time to go from zero to full throttle.
    #[serde(default = "default_steering_time")]
    pub steering_time: f64,
    /// Time to go from zero to full post displacement.
    #[serde(default = "default_displacement_time")]
    pub displacement_time: f64,
    #[serde(default)]
    pub schedule: Vec<DriverKeyframe>,
}

fn default_post_limit() -> f64 {
    0.2
}

fn default_steering_time() -> f64 {
    1.0
}

fn default_displacement_time() -> f64 {
    2.0
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            post_limit: default_post_limit(),
            steering_time: default_steering_time(),
            displacement_time: default_displacement_time(),
            schedule: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TrackSettings {
    pub variant: TrackShoeType,
    #[serde(default)]
    pub side: VehicleSide,
}

impl Default for TrackSettings {
    fn default() -> Self {
        Self {
            variant: TrackShoeType::BandAncf,
            side: VehicleSide::Left,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RigPlacement {
    #[serde(default = "default_rig_location")]
    pub location: [f64; 3],
    /// Unit quaternion, `[w, x, y, z]`.
    #[serde(default = "default_rig_rotation")]
    pub rotation: [f64; 4],
    /// Where the track assembly attaches on the chassis, chassis frame.
    #[serde(default = "default_attach_location")]
    pub attach_location: [f64; 3],
}

fn default_rig_location() -> [f64; 3] {
    [0.0, 0.0, 2.0]
}

fn default_rig_rotation() -> [f64; 4] {
    [1.0, 0.0, 0.0, 0.0]
}

fn default_attach_location() -> [f64; 3] {
    [0.0, 1.0, 0.0]
}

impl Default for RigPlacement {
    fn default() -> Self {
        Self {
            location: default_rig_location(),
            rotation: default_rig_rotation(),
            attach_location: default_attach_location(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct IntegratorSettings {
    /// Numerical damping, in [-1/3, 0].
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_abs_tolerance")]
    pub abs_tolerance: f64,
    #[serde(default = "default_true")]
    pub step_control: bool,
    #[serde(default = "default_true")]
    pub scaling: bool,
    #[serde(default)]
    pub modified_newton: bool,
    #[serde(default = "default_max_bisections")]
    pub max_bisections: u32,
}

fn default_alpha() -> f64 {
    -0.2
}

fn default_max_iterations() -> u32 {
    200
}

fn default_abs_tolerance() -> f64 {
    1e-2
}

fn default_true() -> bool {
    true
}

fn default_max_bisections() -> u32 {
    6
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            max_iterations: default_max_iterations(),
            abs_tolerance: default_abs_tolerance(),
            step_control: true,
            scaling: true,
            modified_newton: false,
            max_bisections: default_max_bisections(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OutputSettings {
    #[serde(default = "default_output_directory")]
    pub directory: String,
    /// Write render-frame snapshots into `directory`.
    #[serde(default)]
    pub snapshots: bool,
    /// First macro-step after which frames are written.
    #[serde(default = "default_snapshot_start_step")]
    pub snapshot_start_step: u64,
}

fn default_output_directory() -> String {
    "TRACK_TEST_RIG".to_string()
}

fn default_snapshot_start_step() -> u64 {
    1000
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            snapshots: false,
            snapshot_start_step: default_snapshot_start_step(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct RunLimits {
    #[serde(default)]
    pub max_steps: Option<u64>,
    #[serde(default)]
    pub end_time: Option<f64>,
}

/// Complete description of one track test rig run.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RigConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub simulation: SimulationSettings,
    #[serde(default)]
    pub driver: DriverSettings,
    #[serde(default)]
    pub track: TrackSettings,
    #[serde(default)]
    pub rig: RigPlacement,
    #[serde(default)]
    pub integrator: IntegratorSettings,
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub limits: RunLimits,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            name: None,
            simulation: SimulationSettings::default(),
            driver: DriverSettings::default(),
            track: TrackSettings::default(),
            rig: RigPlacement::default(),
            integrator: IntegratorSettings::default(),
            output: OutputSettings::default(),
            limits: RunLimits::default(),
        }
    }
}

impl RigConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rig config at {:?}", path))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Invalid rig config {:?}", path))?;
        tracing::debug!("Loaded rig config {:?} ({:?})", path, config.track.variant);
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("Failed to parse Rig Config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '{}'",
                self.schema_version,
                SCHEMA_VERSION
            );
        }

        let sim = &self.simulation;
        if !(sim.step_size.is_finite() && sim.step_size > 0.0) {
            anyhow::bail!("'simulation.step_size' must be a positive number of seconds");
        }
        if !(sim.render_interval.is_finite() && sim.render_interval > 0.0) {
            anyhow::bail!("'simulation.render_interval' must be a positive number of seconds");
        }

        let drv = &self.driver;
        if !(drv.post_limit.is_finite() && drv.post_limit >= 0.0) {
            anyhow::bail!("'driver.post_limit' must be non-negative");
        }
        if !(drv.steering_time > 0.0 && drv.displacement_time > 0.0) {
            anyhow::bail!("'driver.steering_time' and 'driver.displacement_time' must be positive");
        }
        if drv
            .schedule
            .windows(2)
            .any(|pair| pair[1].time < pair[0].time)
        {
            anyhow::bail!("'driver.schedule' keyframes must be sorted by time");
        }

        let integ = &self.integrator;
        if !(-1.0 / 3.0..=0.0).contains(&integ.alpha) {
            anyhow::bail!(
                "'integrator.alpha' = {} is outside [-1/3, 0]",
                integ.alpha
            );
        }
        if !(integ.abs_tolerance.is_finite() && integ.abs_tolerance > 0.0) {
            anyhow::bail!("'integrator.abs_tolerance' must be positive");
        }
        if integ.max_bisections > MAX_BISECTIONS {
            anyhow::bail!(
                "'integrator.max_bisections' = {} exceeds {}",
                integ.max_bisections,
                MAX_BISECTIONS
            );
        }

        let w = self.rig.rotation;
        let norm = (w[0] * w[0] + w[1] * w[1] + w[2] * w[2] + w[3] * w[3]).sqrt();
        if !(norm.is_finite() && norm > 0.0) {
            anyhow::bail!("'rig.rotation' must be a non-zero quaternion");
        }

        if let Some(end_time) = self.limits.end_time {
            if !(end_time.is_finite() && end_time >= 0.0) {
                anyhow::bail!("'limits.end_time' must be non-negative");
            }
        }

        if self.output.directory.trim().is_empty() {
            anyhow::bail!("'output.directory' cannot be empty");
        }

        Ok(())
    }

    /// Number of macro-steps between two render frames.
    pub fn render_steps(&self) -> u64 {
        render_steps(self.simulation.render_interval, self.simulation.step_size)
    }
}

/// `ceil(render_interval / step_size)`, never less than one.
///
/// Ratios within a few ulps of an integer snap to it, so a render interval
/// equal to the step size always yields a cadence of one.
pub fn render_steps(render_interval: f64, step_size: f64) -> u64 {
    let ratio = render_interval / step_size;
    let nearest = ratio.round();
    let steps = if (ratio - nearest).abs() <= 1e-9 * nearest.max(1.0) {
        nearest
    } else {
        ratio.ceil()
    };
    steps.max(1.0) as u64
}
