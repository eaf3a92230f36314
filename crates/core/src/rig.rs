// TrackRig - Track Test Rig Co-Simulation
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::dynamics::integrator::{HhtIntegrator, IntegratorDiagnostics, IntegratorSettings};
use crate::dynamics::{DynamicSystem, ElementLaw, ForceAssembler, GeneralizedState, Strain};
use crate::forces::{ForceExchangeBuffer, TrackForce};
use crate::snapshot::RenderFrame;
use crate::track::{RunningGearPoses, TrackAssembly, TrackVariant, SPROCKET_DOF};
use crate::{ControlSignal, RigError, RigResult};
use nalgebra::{DMatrix, DVector, Isometry3, Vector3};
use tracing::{debug, info};

pub const GRAVITY: f64 = 9.81;

pub(crate) const NOT_INITIALIZED: &str = "the rig is not initialized yet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RigPhase {
    Unconstructed,
    Initialized,
    Running,
}

/// Speed servo on the sprocket with a saturated torque.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SprocketDrive {
    /// Sprocket speed at full throttle, rad/s.
    pub max_speed: f64,
    pub max_torque: f64,
    /// Torque per rad/s of speed error before saturation.
    pub gain: f64,
}

impl Default for SprocketDrive {
    fn default() -> Self {
        Self {
            max_speed: 20.0,
            max_torque: 5000.0,
            gain: 2000.0,
        }
    }
}

/// Servo posts under the road wheels, driven by one displacement command.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PostActuator {
    servo: ElementLaw,
}

impl Default for PostActuator {
    fn default() -> Self {
        Self {
            servo: ElementLaw::linear(1e7, 1e5),
        }
    }
}

/// Everything the integrator sees: the track plus the rig's actuators and
/// the boundary load latched at the last synchronization.
#[derive(Debug, Clone)]
struct RigSystem<T: TrackAssembly> {
    track: T,
    mass: DMatrix<f64>,
    gravity: f64,
    drive: SprocketDrive,
    post: PostActuator,
    throttle: f64,
    // Post travel is linear over the macro-step between the previous and the
    // new command.
    post_start: f64,
    post_rate: f64,
    post_time: f64,
    load: TrackForce,
}

impl<T: TrackAssembly> RigSystem<T> {
    fn post_position(&self, time: f64) -> f64 {
        self.post_start + self.post_rate * (time - self.post_time)
    }
}

impl<T: TrackAssembly> DynamicSystem for RigSystem<T> {
    fn dof(&self) -> usize {
        self.track.dof()
    }

    fn mass_matrix(&self) -> &DMatrix<f64> {
        &self.mass
    }

    fn evaluate(&self, time: f64, q: &DVector<f64>, v: &DVector<f64>, out: &mut ForceAssembler) {
        self.track.add_internal_forces(q, v, self.gravity, out);

        let gear = self.track.running_gear();
        let post = self.post_position(time);
        for k in 0..gear.num_road_wheels() {
            let strain = Strain::linear(&[(gear.wheel_dof(k), 1.0)], q, v)
                .with_offset(-post, -self.post_rate);
            out.add_element(&strain, &self.post.servo, v);
        }

        let target = self.throttle * self.drive.max_speed;
        let x = self.drive.gain * (target - v[SPROCKET_DOF]) / self.drive.max_torque;
        let th = x.tanh();
        out.add_force(SPROCKET_DOF, self.drive.max_torque * th);
        out.add_damping(SPROCKET_DOF, SPROCKET_DOF, self.drive.gain * (1.0 - th * th));

        if !self.load.is_zero() {
            self.track.apply_load(&self.load, out);
        }
    }
}

/// Chassis, one track assembly and the post actuator, advanced as one
/// coupled system.
///
/// The fixture owns the generalized state. Outside influence enters only
/// through [`RigFixture::synchronize`].
#[derive(Debug, Clone)]
pub struct RigFixture<T: TrackAssembly> {
    phase: RigPhase,
    system: RigSystem<T>,
    integrator: HhtIntegrator,
    state: GeneralizedState,
    time: f64,
    chassis: Isometry3<f64>,
    attach_location: Vector3<f64>,
    controls: ControlSignal,
    last_diagnostics: Option<IntegratorDiagnostics>,
}

impl<T: TrackAssembly> RigFixture<T> {
    pub fn new(track: T, integrator: IntegratorSettings) -> RigResult<Self> {
        let integrator = HhtIntegrator::new(integrator)?;
        let dof = track.dof();
        let mass = DMatrix::from_diagonal(&track.mass_diagonal());
        Ok(Self {
            phase: RigPhase::Unconstructed,
            system: RigSystem {
                track,
                mass,
                gravity: GRAVITY,
                drive: SprocketDrive::default(),
                post: PostActuator::default(),
                throttle: 0.0,
                post_start: 0.0,
                post_rate: 0.0,
                post_time: 0.0,
                load: TrackForce::default(),
            },
            integrator,
            state: GeneralizedState::zeros(dof),
            time: 0.0,
            chassis: Isometry3::identity(),
            attach_location: Vector3::zeros(),
            controls: ControlSignal::default(),
            last_diagnostics: None,
        })
    }

    /// Track attachment point in the chassis frame.
    pub fn with_attach_location(mut self, location: Vector3<f64>) -> Self {
        self.attach_location = location;
        self
    }

    pub fn with_drive(mut self, drive: SprocketDrive) -> Self {
        self.system.drive = drive;
        self
    }

    /// Assemble the coupled system at `chassis` with the track at rest.
    pub fn initialize(&mut self, chassis: Isometry3<f64>) -> RigResult<()> {
        if self.phase != RigPhase::Unconstructed {
            return Err(RigError::Ordering {
                operation: "initialize",
                reason: "the rig is already initialized",
            });
        }
        self.chassis = chassis;
        self.time = 0.0;
        self.state = GeneralizedState::zeros(self.system.dof());
        self.system.throttle = 0.0;
        self.system.post_start = 0.0;
        self.system.post_rate = 0.0;
        self.system.post_time = 0.0;
        self.system.load = TrackForce::default();
        self.integrator
            .initialize(&self.system, self.time, &mut self.state)?;
        self.phase = RigPhase::Initialized;
        info!(
            "Rig initialized: track {} ({:?}), {} coordinates",
            self.system.track.name(),
            T::VARIANT,
            self.system.dof()
        );
        Ok(())
    }

    /// Latch the controls and boundary load for the next `advance`. Does not
    /// move time.
    pub fn synchronize(
        &mut self,
        time: f64,
        post_displacement: f64,
        throttle: f64,
        forces: &ForceExchangeBuffer,
    ) -> RigResult<()> {
        self.require_initialized("synchronize")?;
        if (time - self.time).abs() > 1e-9 * self.time.abs().max(1.0) {
            return Err(RigError::Ordering {
                operation: "synchronize",
                reason: "time does not match the rig clock",
            });
        }
        let post_now = self.system.post_position(self.time);
        self.system.post_start = post_now;
        self.system.post_time = self.time;
        self.system.post_rate = 0.0;
        self.system.throttle = throttle;
        self.system.load = forces.get(0).copied().unwrap_or_default();
        self.controls = ControlSignal {
            throttle,
            post_displacement,
        };
        Ok(())
    }

    /// One integrator call over `[t, t + step]`.
    pub fn advance(&mut self, step: f64) -> RigResult<IntegratorDiagnostics> {
        self.require_initialized("advance")?;
        if step > 0.0 {
            self.system.post_rate =
                (self.controls.post_displacement - self.system.post_start) / step;
        }
        let diagnostics = self
            .integrator
            .advance(&self.system, self.time, step, &mut self.state)?;
        self.time += step;
        self.phase = RigPhase::Running;
        self.last_diagnostics = Some(diagnostics);
        debug!(
            "t = {:.6}  Newton iterations: {}",
            self.time, diagnostics.max_substep_iterations
        );
        Ok(diagnostics)
    }

    fn require_initialized(&self, operation: &'static str) -> RigResult<()> {
        match self.phase {
            RigPhase::Unconstructed => Err(RigError::Ordering {
                operation,
                reason: NOT_INITIALIZED,
            }),
            _ => Ok(()),
        }
    }

    pub fn phase(&self) -> RigPhase {
        self.phase
    }

    pub fn variant(&self) -> TrackVariant {
        T::VARIANT
    }

    pub fn track(&self) -> &T {
        &self.system.track
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn state(&self) -> &GeneralizedState {
        &self.state
    }

    pub fn chassis_frame(&self) -> &Isometry3<f64> {
        &self.chassis
    }

    pub fn controls(&self) -> ControlSignal {
        self.controls
    }

    pub fn last_diagnostics(&self) -> Option<&IntegratorDiagnostics> {
        self.last_diagnostics.as_ref()
    }

    /// Newton iterations of the last accepted step.
    pub fn num_iterations(&self) -> u32 {
        self.integrator.num_iterations()
    }

    pub fn post_position(&self) -> f64 {
        self.system.post_position(self.time)
    }

    pub fn belt_travel(&self) -> f64 {
        self.system.track.belt_travel(&self.state.q)
    }

    pub fn poses(&self) -> RigResult<RunningGearPoses> {
        self.require_initialized("poses")?;
        Ok(self.system.track.running_gear().poses(
            &self.state.q,
            self.belt_travel(),
            &self.attach_location,
            &self.chassis,
        ))
    }

    pub fn render_frame(&self, step: u64, frame: u64) -> RigResult<RenderFrame> {
        let poses = self.poses()?;
        Ok(RenderFrame {
            step,
            frame,
            time: self.time,
            variant: T::VARIANT,
            chassis: self.chassis,
            sprocket: poses.sprocket,
            idler: poses.idler,
            road_wheels: poses.road_wheels,
            controls: self.controls,
            diagnostics: self.last_diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{m113, VehicleSide, IDLER_DOF};

    fn settings() -> IntegratorSettings {
        IntegratorSettings {
            modified_newton: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_operations_before_initialize_fail() {
        let mut rig = RigFixture::new(m113::bushing_track(VehicleSide::Left), settings()).unwrap();
        assert_eq!(rig.phase(), RigPhase::Unconstructed);

        let forces = ForceExchangeBuffer::new(1);
        let err = rig.synchronize(0.0, 0.0, 0.0, &forces).unwrap_err();
        assert!(matches!(err, RigError::Ordering { operation: "synchronize", .. }));
        let err = rig.advance(1e-3).unwrap_err();
        assert!(matches!(err, RigError::Ordering { operation: "advance", .. }));
        assert!(matches!(rig.poses(), Err(RigError::Ordering { .. })));
    }

    #[test]
    fn test_initialize_twice_rejected() {
        let mut rig = RigFixture::new(m113::bushing_track(VehicleSide::Left), settings()).unwrap();
        rig.initialize(Isometry3::identity()).unwrap();
        assert_eq!(rig.phase(), RigPhase::Initialized);
        let err = rig.initialize(Isometry3::identity()).unwrap_err();
        assert!(matches!(err, RigError::Ordering { operation: "initialize", .. }));
        assert_eq!(rig.phase(), RigPhase::Initialized);
    }

    #[test]
    fn test_synchronize_does_not_move_time() {
        let mut rig = RigFixture::new(m113::bushing_track(VehicleSide::Left), settings()).unwrap();
        rig.initialize(Isometry3::identity()).unwrap();
        let before = rig.state().clone();
        rig.synchronize(0.0, 0.1, 0.5, &ForceExchangeBuffer::new(1))
            .unwrap();
        assert_eq!(rig.time(), 0.0);
        assert_eq!(rig.state(), &before);
        assert_eq!(rig.controls().throttle, 0.5);
    }

    #[test]
    fn test_synchronize_rejects_foreign_time() {
        let mut rig = RigFixture::new(m113::bushing_track(VehicleSide::Left), settings()).unwrap();
        rig.initialize(Isometry3::identity()).unwrap();
        let forces = ForceExchangeBuffer::new(1);
        let err = rig.synchronize(0.5, 0.01, 0.0, &forces).unwrap_err();
        assert!(matches!(err, RigError::Ordering { operation: "synchronize", .. }));
        assert_eq!(rig.controls(), ControlSignal::default());

        rig.synchronize(0.0, 0.01, 0.0, &forces).unwrap();
        rig.advance(1e-3).unwrap();
        assert!((rig.post_position() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_advance_moves_clock_and_phase() {
        let mut rig = RigFixture::new(m113::bushing_track(VehicleSide::Left), settings()).unwrap();
        rig.initialize(Isometry3::identity()).unwrap();
        let forces = ForceExchangeBuffer::new(1);
        for _ in 0..5 {
            rig.synchronize(rig.time(), 0.0, 0.0, &forces).unwrap();
            let diag = rig.advance(1e-3).unwrap();
            assert!(diag.converged && diag.step_accepted);
        }
        assert_eq!(rig.phase(), RigPhase::Running);
        assert!((rig.time() - 5e-3).abs() < 1e-12);
        assert!(rig.last_diagnostics().is_some());
        // Tensioner preload pushes the idler out.
        assert!(rig.state().q[IDLER_DOF] > 0.0);
    }

    #[test]
    fn test_post_command_is_reached_over_one_step() {
        let mut rig = RigFixture::new(m113::bushing_track(VehicleSide::Left), settings()).unwrap();
        rig.initialize(Isometry3::identity()).unwrap();
        let forces = ForceExchangeBuffer::new(1);
        rig.synchronize(0.0, 0.01, 0.0, &forces).unwrap();
        rig.advance(1e-3).unwrap();
        assert!((rig.post_position() - 0.01).abs() < 1e-12);
        rig.synchronize(rig.time(), 0.01, 0.0, &forces).unwrap();
        rig.advance(1e-3).unwrap();
        assert!((rig.post_position() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_render_frame_reports_chassis_pose() {
        let mut rig = RigFixture::new(m113::band_track(VehicleSide::Left), settings())
            .unwrap()
            .with_attach_location(Vector3::new(0.0, 1.0, 0.0));
        rig.initialize(Isometry3::translation(0.0, 0.0, 2.0)).unwrap();
        let frame = rig.render_frame(0, 0).unwrap();
        assert_eq!(frame.variant, TrackVariant::FiniteElementBand);
        assert!((frame.sprocket.position - Vector3::new(0.0, 1.0, 2.0)).norm() < 1e-12);
        assert_eq!(frame.road_wheels.len(), m113::NUM_ROAD_WHEELS);
        assert!(frame.diagnostics.is_none());
    }
}
