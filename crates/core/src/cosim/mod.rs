// TrackRig - Track Test Rig Co-Simulation
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Fixed-step orchestration of the driver, the rig and an observer.
//!
//! Every macro-step runs the same sequence:
//!
//! 1. render notification when `step % render_cadence == 0`
//! 2. read the driver's current controls
//! 3. synchronize driver, rig and observer at `t`
//! 4. advance driver, rig and observer by `step_size`
//! 5. bump the step counter and take `t` from the rig clock

use crate::config::LoopConfig;
use crate::driver::DriverModel;
use crate::dynamics::integrator::IntegratorDiagnostics;
use crate::forces::{ForceExchangeBuffer, LoadSource, ZeroLoad};
use crate::rig::{RigFixture, RigPhase, NOT_INITIALIZED};
use crate::track::TrackAssembly;
use crate::{ControlSignal, RigError, RigObserver, RigResult};
use serde::Serialize;
use tracing::{debug, info};

const PROGRESS_LOG_INTERVAL: u64 = 10_000;

/// Outcome of one macro-step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepReport {
    /// Steps completed, this one included.
    pub step: u64,
    /// Rig time at the end of the step.
    pub time: f64,
    /// Controls the rig was synchronized with.
    pub controls: ControlSignal,
    pub diagnostics: IntegratorDiagnostics,
    pub rendered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoopSummary {
    pub steps: u64,
    pub frames: u64,
    pub time: f64,
}

pub struct CoSimulationLoop<T: TrackAssembly> {
    config: LoopConfig,
    render_cadence: u64,
    driver: DriverModel,
    rig: RigFixture<T>,
    forces: ForceExchangeBuffer,
    loads: Box<dyn LoadSource>,
    step_number: u64,
    frame_counter: u64,
    time: f64,
}

impl<T: TrackAssembly> CoSimulationLoop<T> {
    /// `rig` must already be initialized.
    pub fn new(config: LoopConfig, mut driver: DriverModel, rig: RigFixture<T>) -> RigResult<Self> {
        config.validate()?;
        if rig.phase() == RigPhase::Unconstructed {
            return Err(RigError::Ordering {
                operation: "CoSimulationLoop::new",
                reason: NOT_INITIALIZED,
            });
        }
        driver.initialize();
        let render_cadence = config.render_cadence();
        info!(
            "Co-simulation loop: step {:e}s, render every {} steps, variant {:?}",
            config.step_size,
            render_cadence,
            T::VARIANT
        );
        Ok(Self {
            render_cadence,
            driver,
            time: rig.time(),
            rig,
            forces: ForceExchangeBuffer::new(config.num_tracks),
            loads: Box::new(ZeroLoad),
            step_number: 0,
            frame_counter: 0,
            config,
        })
    }

    pub fn with_load_source(mut self, loads: Box<dyn LoadSource>) -> Self {
        self.loads = loads;
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn render_cadence(&self) -> u64 {
        self.render_cadence
    }

    pub fn step_number(&self) -> u64 {
        self.step_number
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn driver(&self) -> &DriverModel {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut DriverModel {
        &mut self.driver
    }

    pub fn rig(&self) -> &RigFixture<T> {
        &self.rig
    }

    pub fn forces(&self) -> &ForceExchangeBuffer {
        &self.forces
    }

    pub fn summary(&self) -> LoopSummary {
        LoopSummary {
            steps: self.step_number,
            frames: self.frame_counter,
            time: self.time,
        }
    }

    /// Run one macro-step. If the rig fails to advance it keeps its last
    /// committed state and the step counter does not move, but the driver has
    /// already advanced by one step.
    pub fn step<O: RigObserver + ?Sized>(&mut self, observer: &mut O) -> RigResult<StepReport> {
        let rendered = self.step_number % self.render_cadence == 0;
        if rendered {
            let frame = self.rig.render_frame(self.step_number, self.frame_counter)?;
            observer.on_render(&frame)?;
            self.frame_counter += 1;
        }

        let controls = self.driver.controls();

        self.loads.fill(self.time, &mut self.forces);
        self.driver.synchronize(self.time);
        self.rig.synchronize(
            self.time,
            controls.post_displacement,
            controls.throttle,
            &self.forces,
        )?;
        observer.synchronize(self.time, controls);

        let step = self.config.step_size;
        self.driver.advance(step);
        let diagnostics = self.rig.advance(step)?;
        observer.advance(step);

        self.step_number += 1;
        self.time = self.rig.time();

        debug!(
            "Step {} t = {:.6} throttle {:.4} post {:.4} iterations {}",
            self.step_number,
            self.time,
            controls.throttle,
            controls.post_displacement,
            diagnostics.iterations
        );
        if self.step_number % PROGRESS_LOG_INTERVAL == 0 {
            info!("Progress: {} steps, t = {:.4}s", self.step_number, self.time);
        }

        let report = StepReport {
            step: self.step_number,
            time: self.time,
            controls,
            diagnostics,
            rendered,
        };
        observer.on_step_end(&report);
        Ok(report)
    }

    /// Step until the observer stops the loop. Errors end the run at once.
    pub fn run<O: RigObserver + ?Sized>(&mut self, observer: &mut O) -> RigResult<LoopSummary> {
        while observer.keep_running() {
            self.step(observer)?;
        }
        let summary = self.summary();
        observer.on_loop_end(&summary);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::integrator::IntegratorSettings;
    use crate::observers::StopConditions;
    use crate::snapshot::RenderFrame;
    use crate::track::{m113, BushingTrack, VehicleSide};
    use nalgebra::Isometry3;

    fn rig() -> RigFixture<BushingTrack> {
        let settings = IntegratorSettings {
            modified_newton: true,
            ..Default::default()
        };
        let mut rig = RigFixture::new(m113::bushing_track(VehicleSide::Left), settings).unwrap();
        rig.initialize(Isometry3::identity()).unwrap();
        rig
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        render_steps: Vec<u64>,
        stop_after: u64,
        steps: u64,
    }

    impl RigObserver for Recorder {
        fn keep_running(&mut self) -> bool {
            self.steps < self.stop_after
        }
        fn on_render(&mut self, frame: &RenderFrame) -> RigResult<()> {
            self.events.push("render".into());
            self.render_steps.push(frame.step);
            Ok(())
        }
        fn synchronize(&mut self, _time: f64, _controls: ControlSignal) {
            self.events.push("sync".into());
        }
        fn advance(&mut self, _step: f64) {
            self.events.push("advance".into());
        }
        fn on_step_end(&mut self, _report: &StepReport) {
            self.steps += 1;
            self.events.push("end".into());
        }
    }

    #[test]
    fn test_loop_requires_initialized_rig() {
        let rig = RigFixture::new(
            m113::bushing_track(VehicleSide::Left),
            IntegratorSettings::default(),
        )
        .unwrap();
        let err = CoSimulationLoop::new(LoopConfig::default(), DriverModel::new(0.2, 0.1, 0.1), rig)
            .err()
            .unwrap();
        assert!(matches!(err, RigError::Ordering { .. }));
    }

    #[test]
    fn test_observer_call_order() {
        let config = LoopConfig {
            step_size: 1e-3,
            render_interval: 2e-3,
            num_tracks: 1,
        };
        let mut cosim = CoSimulationLoop::new(config, DriverModel::new(0.2, 0.1, 0.1), rig()).unwrap();
        let mut recorder = Recorder {
            stop_after: 3,
            ..Default::default()
        };
        let summary = cosim.run(&mut recorder).unwrap();

        assert_eq!(summary.steps, 3);
        assert_eq!(summary.frames, 2);
        assert!((summary.time - 3e-3).abs() < 1e-12);
        assert_eq!(recorder.render_steps, vec![0, 2]);
        assert_eq!(
            recorder.events,
            vec![
                "render", "sync", "advance", "end", "sync", "advance", "end", "render", "sync",
                "advance", "end"
            ]
        );
    }

    #[test]
    fn test_equal_intervals_render_every_step() {
        let config = LoopConfig {
            step_size: 1e-3,
            render_interval: 1e-3,
            num_tracks: 1,
        };
        let mut cosim = CoSimulationLoop::new(config, DriverModel::new(0.2, 0.1, 0.1), rig()).unwrap();
        assert_eq!(cosim.render_cadence(), 1);
        let mut recorder = Recorder {
            stop_after: 4,
            ..Default::default()
        };
        cosim.run(&mut recorder).unwrap();
        assert_eq!(recorder.render_steps, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_controls_lag_driver_by_one_step() {
        let config = LoopConfig {
            step_size: 1e-3,
            render_interval: 1e-3,
            num_tracks: 1,
        };
        let mut cosim = CoSimulationLoop::new(config, DriverModel::new(0.2, 0.25, 0.0), rig()).unwrap();
        cosim.driver_mut().set_targets(1.0, 0.0);

        let mut stop = StopConditions::new(Some(2), None);
        let first = cosim.step(&mut stop).unwrap();
        let second = cosim.step(&mut stop).unwrap();
        assert_eq!(first.controls.throttle, 0.0);
        assert_eq!(second.controls.throttle, 0.25);
        assert_eq!(cosim.driver().throttle(), 0.5);
        assert_eq!(cosim.rig().controls().throttle, 0.25);
    }
}
