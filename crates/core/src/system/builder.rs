// TrackRig - Track Test Rig Co-Simulation
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::config::LoopConfig;
use crate::cosim::CoSimulationLoop;
use crate::driver::{DriverKeyframe, DriverModel};
use crate::dynamics::integrator::IntegratorSettings;
use crate::rig::RigFixture;
use crate::track::{TrackAssembly, TrackVariant};
use crate::RigResult;
use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion, Vector3};
use tracing::info;
use trackrig_config::{RigConfig, RigPlacement};

/// Resolve the configured shoe type to a rig-supported variant. Must run
/// before any track is assembled.
pub fn track_variant(config: &RigConfig) -> RigResult<TrackVariant> {
    TrackVariant::try_from(config.track.variant)
}

/// Initial chassis frame. `rotation` is `[w, x, y, z]` and is normalized.
pub fn chassis_pose(placement: &RigPlacement) -> Isometry3<f64> {
    let [w, x, y, z] = placement.rotation;
    let rotation = UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z));
    Isometry3::from_parts(Translation3::from(Vector3::from(placement.location)), rotation)
}

pub fn build_driver(config: &RigConfig) -> DriverModel {
    let driver = &config.driver;
    let schedule = driver
        .schedule
        .iter()
        .map(|k| DriverKeyframe {
            time: k.time,
            throttle: k.throttle,
            displacement: k.displacement,
        })
        .collect();
    DriverModel::with_ramp_times(
        driver.post_limit,
        config.simulation.render_interval,
        driver.steering_time,
        driver.displacement_time,
    )
    .with_schedule(schedule)
}

/// Assemble and initialize the fixture around `track`.
pub fn build_rig<T: TrackAssembly>(config: &RigConfig, track: T) -> RigResult<RigFixture<T>> {
    info!("Assembling rig with track {}", track.name());
    let mut rig = RigFixture::new(track, IntegratorSettings::from(&config.integrator))?
        .with_attach_location(Vector3::from(config.rig.attach_location));
    rig.initialize(chassis_pose(&config.rig))?;
    Ok(rig)
}

pub fn build_loop<T: TrackAssembly>(
    config: &RigConfig,
    track: T,
) -> RigResult<CoSimulationLoop<T>> {
    let loop_config = LoopConfig::from(config);
    loop_config.validate()?;
    let rig = build_rig(config, track)?;
    CoSimulationLoop::new(loop_config, build_driver(config), rig)
}
