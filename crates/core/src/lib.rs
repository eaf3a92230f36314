// TrackRig - Track Test Rig Co-Simulation
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod config;
pub mod cosim;
pub mod driver;
pub mod dynamics;
pub mod forces;
pub mod metrics;
pub mod observers;
pub mod rig;
pub mod snapshot;
pub mod system;
pub mod track;

pub use config::LoopConfig;
pub use cosim::{CoSimulationLoop, LoopSummary, StepReport};
pub use driver::DriverModel;
pub use dynamics::integrator::{HhtIntegrator, IntegratorDiagnostics};
pub use forces::{ForceExchangeBuffer, TrackForce};
pub use metrics::LoopMetrics;
pub use observers::{ObserverSet, StopConditions, StopReason};
pub use rig::RigFixture;
pub use snapshot::{FrameSnapshotWriter, RenderFrame};
pub use track::{TrackAssembly, TrackVariant};

use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum RigError {
    #[error("'{operation}' called out of order: {reason}")]
    Ordering {
        operation: &'static str,
        reason: &'static str,
    },
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error(
        "Integrator diverged at t={time:.6}s (h={step:e}): {} iterations, residual {:.3e}",
        diagnostics.iterations,
        diagnostics.residual_norm
    )]
    IntegratorDivergence {
        time: f64,
        step: f64,
        diagnostics: IntegratorDiagnostics,
    },
    #[error("Cannot prepare output location {path:?}: {source}")]
    Resource {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type RigResult<T> = Result<T, RigError>;

/// Driver outputs handed to the rig at every synchronization point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ControlSignal {
    /// Normalized sprocket drive demand, `[0, 1]`.
    pub throttle: f64,
    /// Commanded post travel, `[-limit, +limit]`.
    pub post_displacement: f64,
}

/// Callbacks the co-simulation loop invokes at fixed points of a macro-step.
///
/// Observers only ever see copies of rig state. The loop owns time
/// advancement; an observer can at most ask it to stop through
/// [`RigObserver::keep_running`], which is polled between macro-steps.
pub trait RigObserver {
    fn keep_running(&mut self) -> bool {
        true
    }
    fn on_render(&mut self, _frame: &snapshot::RenderFrame) -> RigResult<()> {
        Ok(())
    }
    fn synchronize(&mut self, _time: f64, _controls: ControlSignal) {}
    fn advance(&mut self, _step: f64) {}
    fn on_step_end(&mut self, _report: &StepReport) {}
    fn on_loop_end(&mut self, _summary: &LoopSummary) {}
}
