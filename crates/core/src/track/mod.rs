// TrackRig - Track Test Rig Co-Simulation
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod band;
pub mod bushing;
pub mod m113;

pub use band::BandTrack;
pub use bushing::BushingTrack;

use crate::dynamics::{ElementLaw, ForceAssembler, Strain};
use crate::forces::TrackForce;
use crate::{RigError, RigResult};
use nalgebra::{DVector, Isometry3, Point3, UnitQuaternion, Vector3};
use serde::Serialize;
use trackrig_config::TrackShoeType;

pub use trackrig_config::VehicleSide;

pub const SPROCKET_DOF: usize = 0;
pub const IDLER_DOF: usize = 1;
pub const FIRST_WHEEL_DOF: usize = 2;

/// Track discretizations the rig can mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackVariant {
    Bushing,
    FiniteElementBand,
}

impl TryFrom<TrackShoeType> for TrackVariant {
    type Error = RigError;

    fn try_from(shoe: TrackShoeType) -> RigResult<Self> {
        match shoe {
            TrackShoeType::BandBushing => Ok(TrackVariant::Bushing),
            TrackShoeType::BandAncf => Ok(TrackVariant::FiniteElementBand),
            other => Err(RigError::Configuration(format!(
                "Track type {:?} not supported by the test rig",
                other
            ))),
        }
    }
}

/// One track's kinematic chain and compliance model.
///
/// Generalized coordinates start with the running gear (sprocket angle,
/// idler travel, one vertical travel per road wheel) followed by the belt
/// coordinates the variant defines.
pub trait TrackAssembly {
    const VARIANT: TrackVariant;

    fn name(&self) -> &str;

    fn running_gear(&self) -> &RunningGear;

    /// Total coordinates, running gear included.
    fn dof(&self) -> usize;

    fn num_shoes(&self) -> usize;

    /// Lumped mass (or inertia) of every coordinate.
    fn mass_diagonal(&self) -> DVector<f64>;

    /// Running gear springs, belt elements and gravity.
    fn add_internal_forces(
        &self,
        q: &DVector<f64>,
        v: &DVector<f64>,
        gravity: f64,
        out: &mut ForceAssembler,
    );

    /// Map a boundary load onto the track's coordinates.
    fn apply_load(&self, load: &TrackForce, out: &mut ForceAssembler);

    /// Mean tangential travel of the belt.
    fn belt_travel(&self, q: &DVector<f64>) -> f64;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SprocketSpec {
    pub mass: f64,
    pub inertia: f64,
    pub radius: f64,
    pub num_teeth: u32,
    pub location: Vector3<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdlerSpec {
    pub mass: f64,
    pub radius: f64,
    pub location: Vector3<f64>,
    /// Unit direction of idler travel, chassis frame.
    pub travel_axis: Vector3<f64>,
    pub tensioner: ElementLaw,
    /// Tensioner spring is relaxed at this travel.
    pub tensioner_free_travel: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoadWheelSpec {
    pub mass: f64,
    pub radius: f64,
    pub location: Vector3<f64>,
}

/// Sprocket, idler and road wheels shared by every track variant.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningGear {
    pub sprocket: SprocketSpec,
    pub idler: IdlerSpec,
    pub road_wheels: Vec<RoadWheelSpec>,
    pub suspension: ElementLaw,
    /// Sprocket teeth to belt engagement.
    pub mesh: ElementLaw,
    /// Loop length lost per unit of upward road wheel travel.
    pub wrap_gain: f64,
}

impl RunningGear {
    pub fn num_road_wheels(&self) -> usize {
        self.road_wheels.len()
    }

    pub fn wheel_dof(&self, wheel: usize) -> usize {
        FIRST_WHEEL_DOF + wheel
    }

    /// First belt coordinate.
    pub fn belt_offset(&self) -> usize {
        FIRST_WHEEL_DOF + self.road_wheels.len()
    }

    fn span(&self) -> f64 {
        (self.idler.location - self.sprocket.location).norm()
    }

    /// Reference length of the belt loop.
    pub fn belt_length(&self) -> f64 {
        2.0 * self.span() + std::f64::consts::PI * (self.sprocket.radius + self.idler.radius)
    }

    /// Arc position of each road wheel's contact on the lower run, measured
    /// along the belt from the top of the sprocket.
    pub fn wheel_arc_positions(&self) -> Vec<f64> {
        let span = self.span();
        let lower_run_start = span + std::f64::consts::PI * self.idler.radius;
        self.road_wheels
            .iter()
            .map(|w| {
                let from_sprocket = (w.location.x - self.sprocket.location.x).abs();
                lower_run_start + (span - from_sprocket).clamp(0.0, span)
            })
            .collect()
    }

    pub fn fill_mass(&self, mass: &mut DVector<f64>) {
        mass[SPROCKET_DOF] = self.sprocket.inertia;
        mass[IDLER_DOF] = self.idler.mass;
        for (k, wheel) in self.road_wheels.iter().enumerate() {
            mass[self.wheel_dof(k)] = wheel.mass;
        }
    }

    /// Tensioner, suspension and gravity on the road wheels.
    pub fn add_forces(
        &self,
        q: &DVector<f64>,
        v: &DVector<f64>,
        gravity: f64,
        out: &mut ForceAssembler,
    ) {
        let tensioner = Strain::linear(&[(IDLER_DOF, 1.0)], q, v)
            .with_offset(-self.idler.tensioner_free_travel, 0.0);
        out.add_element(&tensioner, &self.idler.tensioner, v);

        for (k, wheel) in self.road_wheels.iter().enumerate() {
            let dof = self.wheel_dof(k);
            let travel = Strain::linear(&[(dof, 1.0)], q, v);
            out.add_element(&travel, &self.suspension, v);
            out.add_force(dof, -wheel.mass * gravity);
        }
    }

    /// Running gear share of the stretch of one of `count` belt elements:
    /// idler travel lengthens the loop by twice its value, road wheel lift
    /// shortens it.
    pub fn push_loop_terms(
        &self,
        count: usize,
        strain: &mut Strain,
        q: &DVector<f64>,
        v: &DVector<f64>,
    ) {
        let n = count as f64;
        strain.push_linear(IDLER_DOF, 2.0 / n, q, v);
        for k in 0..self.road_wheels.len() {
            strain.push_linear(self.wheel_dof(k), -self.wrap_gain / n, q, v);
        }
    }

    /// Sprocket rim against the mean travel of the given belt coordinates.
    pub fn add_mesh(
        &self,
        belt: &[usize],
        q: &DVector<f64>,
        v: &DVector<f64>,
        out: &mut ForceAssembler,
    ) {
        let share = -1.0 / belt.len() as f64;
        let mut strain = Strain::linear(&[(SPROCKET_DOF, self.sprocket.radius)], q, v);
        for &j in belt {
            strain.push_linear(j, share, q, v);
        }
        out.add_element(&strain, &self.mesh, v);
    }

    /// `force.x` is spread over the belt's tangential coordinates,
    /// `force.z` over the road wheels, `moment.y` acts on the sprocket.
    pub fn apply_load(&self, load: &TrackForce, belt: &[usize], out: &mut ForceAssembler) {
        if !belt.is_empty() {
            let share = load.force.x / belt.len() as f64;
            for &j in belt {
                out.add_force(j, share);
            }
        }
        if !self.road_wheels.is_empty() {
            let share = load.force.z / self.road_wheels.len() as f64;
            for k in 0..self.road_wheels.len() {
                out.add_force(self.wheel_dof(k), share);
            }
        }
        out.add_force(SPROCKET_DOF, load.moment.y);
    }

    /// Chassis-frame poses of the sprocket, idler and road wheels.
    pub fn poses(
        &self,
        q: &DVector<f64>,
        belt_travel: f64,
        attach: &Vector3<f64>,
        chassis: &Isometry3<f64>,
    ) -> RunningGearPoses {
        let sprocket = BodyPose::new(
            chassis,
            attach + self.sprocket.location,
            q[SPROCKET_DOF],
        );
        let idler = BodyPose::new(
            chassis,
            attach + self.idler.location + self.idler.travel_axis * q[IDLER_DOF],
            belt_travel / self.idler.radius,
        );
        let road_wheels = self
            .road_wheels
            .iter()
            .enumerate()
            .map(|(k, w)| {
                BodyPose::new(
                    chassis,
                    attach + w.location + Vector3::z() * q[self.wheel_dof(k)],
                    belt_travel / w.radius,
                )
            })
            .collect();
        RunningGearPoses {
            sprocket,
            idler,
            road_wheels,
        }
    }

    /// Mirror the layout for the other side of the vehicle.
    pub fn mirrored(mut self) -> Self {
        let flip = |v: &mut Vector3<f64>| v.y = -v.y;
        flip(&mut self.sprocket.location);
        flip(&mut self.idler.location);
        flip(&mut self.idler.travel_axis);
        for w in &mut self.road_wheels {
            flip(&mut w.location);
        }
        self
    }
}

/// Pose of a rotating body; spin is about the chassis y axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BodyPose {
    pub position: Vector3<f64>,
    pub local_position: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
    pub angle: f64,
}

impl BodyPose {
    fn new(chassis: &Isometry3<f64>, local: Vector3<f64>, angle: f64) -> Self {
        let position = chassis.transform_point(&Point3::from(local)).coords;
        let spin = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), angle);
        Self {
            position,
            local_position: local,
            rotation: chassis.rotation * spin,
            angle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunningGearPoses {
    pub sprocket: BodyPose,
    pub idler: BodyPose,
    pub road_wheels: Vec<BodyPose>,
}
