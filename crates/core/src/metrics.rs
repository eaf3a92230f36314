// TrackRig - Track Test Rig Co-Simulation
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::cosim::{LoopSummary, StepReport};
use crate::snapshot::RenderFrame;
use crate::{RigObserver, RigResult};
use serde::Serialize;
use std::time::Instant;

/// Step and solver counters gathered while the loop runs.
#[derive(Debug)]
pub struct LoopMetrics {
    steps: u64,
    frames: u64,
    newton_iterations: u64,
    max_iterations: u32,
    bisections: u64,
    last_time: f64,
    start_time: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsReport {
    pub steps: u64,
    pub frames: u64,
    pub newton_iterations: u64,
    pub max_iterations: u32,
    pub mean_iterations: f64,
    pub bisections: u64,
    pub simulated_time: f64,
    pub steps_per_second: f64,
}

impl Default for LoopMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopMetrics {
    pub fn new() -> Self {
        Self {
            steps: 0,
            frames: 0,
            newton_iterations: 0,
            max_iterations: 0,
            bisections: 0,
            last_time: 0.0,
            start_time: Instant::now(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn get_steps(&self) -> u64 {
        self.steps
    }

    pub fn get_steps_per_second(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.steps as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn report(&self) -> MetricsReport {
        MetricsReport {
            steps: self.steps,
            frames: self.frames,
            newton_iterations: self.newton_iterations,
            max_iterations: self.max_iterations,
            mean_iterations: if self.steps > 0 {
                self.newton_iterations as f64 / self.steps as f64
            } else {
                0.0
            },
            bisections: self.bisections,
            simulated_time: self.last_time,
            steps_per_second: self.get_steps_per_second(),
        }
    }
}

impl RigObserver for LoopMetrics {
    fn on_render(&mut self, _frame: &RenderFrame) -> RigResult<()> {
        self.frames += 1;
        Ok(())
    }

    fn on_step_end(&mut self, report: &StepReport) {
        self.steps += 1;
        self.newton_iterations += report.diagnostics.iterations as u64;
        self.max_iterations = self.max_iterations.max(report.diagnostics.iterations);
        self.bisections += report.diagnostics.bisections as u64;
        self.last_time = report.time;
    }

    fn on_loop_end(&mut self, summary: &LoopSummary) {
        tracing::info!(
            "Loop finished after {} steps ({:.0} steps/s, {} Newton iterations)",
            summary.steps,
            self.get_steps_per_second(),
            self.newton_iterations
        );
    }
}
