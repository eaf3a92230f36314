// TrackRig - Track Test Rig Co-Simulation
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! M113 running gear and belt parameters.

use super::{
    BandTrack, BushingTrack, IdlerSpec, RoadWheelSpec, RunningGear, SprocketSpec, VehicleSide,
};
use crate::dynamics::ElementLaw;
use nalgebra::Vector3;

pub const SPROCKET_MASS: f64 = 436.7;
pub const SPROCKET_INERTIA: f64 = 13.87;
pub const SPROCKET_RADIUS: f64 = 0.2307;
pub const SPROCKET_TEETH: u32 = 17;

pub const IDLER_MASS: f64 = 429.44;
pub const IDLER_RADIUS: f64 = 0.255;
pub const IDLER_LOCATION: [f64; 3] = [-3.93, 0.0, -0.12];

pub const TENSIONER_STIFFNESS: f64 = 5e5;
pub const TENSIONER_DAMPING: f64 = 1e4;
pub const TENSIONER_FREE_TRAVEL: f64 = 0.05;

pub const NUM_ROAD_WHEELS: usize = 5;
pub const ROAD_WHEEL_MASS: f64 = 561.1;
pub const ROAD_WHEEL_RADIUS: f64 = 0.305;
pub const ROAD_WHEEL_PITCH: f64 = 0.65;
pub const ROAD_WHEEL_HEIGHT: f64 = -0.44;

pub const SUSPENSION_STIFFNESS: f64 = 2.5e5;
pub const SUSPENSION_DAMPING: f64 = 5e3;
pub const WRAP_GAIN: f64 = 0.5;

pub const MESH_STIFFNESS: f64 = 5e6;
pub const MESH_DAMPING: f64 = 2e4;

pub const BELT_MASS: f64 = 1134.0;
pub const NUM_SHOES: usize = 12;
pub const SEGMENT_STIFFNESS: f64 = 3e6;
pub const SEGMENT_DAMPING: f64 = 5e3;

pub const NUM_BAND_NODES: usize = 24;
pub const BAND_CUBIC_STIFFNESS: f64 = 2e10;
pub const BAND_BENDING_RIGIDITY: f64 = 5e3;
pub const BAND_BENDING_DAMPING: f64 = 50.0;
pub const BAND_NORMAL_STIFFNESS: f64 = 2e5;
pub const BAND_NORMAL_DAMPING: f64 = 2e3;
pub const WHEEL_CONTACT_STIFFNESS: f64 = 1e6;
pub const WHEEL_CONTACT_DAMPING: f64 = 5e3;

pub fn running_gear(side: VehicleSide) -> RunningGear {
    let road_wheels = (1..=NUM_ROAD_WHEELS)
        .map(|k| RoadWheelSpec {
            mass: ROAD_WHEEL_MASS,
            radius: ROAD_WHEEL_RADIUS,
            location: Vector3::new(-ROAD_WHEEL_PITCH * k as f64, 0.0, ROAD_WHEEL_HEIGHT),
        })
        .collect();

    let gear = RunningGear {
        sprocket: SprocketSpec {
            mass: SPROCKET_MASS,
            inertia: SPROCKET_INERTIA,
            radius: SPROCKET_RADIUS,
            num_teeth: SPROCKET_TEETH,
            location: Vector3::zeros(),
        },
        idler: IdlerSpec {
            mass: IDLER_MASS,
            radius: IDLER_RADIUS,
            location: Vector3::from(IDLER_LOCATION),
            travel_axis: -Vector3::x(),
            tensioner: ElementLaw::linear(TENSIONER_STIFFNESS, TENSIONER_DAMPING),
            tensioner_free_travel: TENSIONER_FREE_TRAVEL,
        },
        road_wheels,
        suspension: ElementLaw::linear(SUSPENSION_STIFFNESS, SUSPENSION_DAMPING),
        mesh: ElementLaw::linear(MESH_STIFFNESS, MESH_DAMPING),
        wrap_gain: WRAP_GAIN,
    };

    match side {
        VehicleSide::Left => gear,
        VehicleSide::Right => gear.mirrored(),
    }
}

pub fn bushing_track(side: VehicleSide) -> BushingTrack {
    BushingTrack::new(
        format!("M113_{}_bushing", side_tag(side)),
        running_gear(side),
        NUM_SHOES,
        BELT_MASS,
        ElementLaw::linear(SEGMENT_STIFFNESS, SEGMENT_DAMPING),
    )
}

pub fn band_track(side: VehicleSide) -> BandTrack {
    // Same belt compliance as the bushing chain, spread over more elements.
    let scale = NUM_BAND_NODES as f64 / NUM_SHOES as f64;
    BandTrack::new(
        format!("M113_{}_band", side_tag(side)),
        running_gear(side),
        NUM_BAND_NODES,
        BELT_MASS,
        ElementLaw {
            stiffness: SEGMENT_STIFFNESS * scale,
            cubic_stiffness: BAND_CUBIC_STIFFNESS,
            damping: SEGMENT_DAMPING * scale,
        },
        BAND_BENDING_RIGIDITY,
        BAND_BENDING_DAMPING,
        ElementLaw::linear(BAND_NORMAL_STIFFNESS, BAND_NORMAL_DAMPING),
        ElementLaw::linear(WHEEL_CONTACT_STIFFNESS, WHEEL_CONTACT_DAMPING),
    )
}

fn side_tag(side: VehicleSide) -> &'static str {
    match side {
        VehicleSide::Left => "left",
        VehicleSide::Right => "right",
    }
}
