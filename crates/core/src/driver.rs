// TrackRig - Track Test Rig Co-Simulation
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::ControlSignal;
use serde::{Deserialize, Serialize};

/// A scripted change of driver targets at a given simulation time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriverKeyframe {
    pub time: f64,
    pub throttle: f64,
    pub displacement: f64,
}

/// Rate-limited operator model for the test rig.
///
/// Produces a throttle and a post displacement that chase latched targets by
/// at most one delta per `advance` call. Targets come either from
/// [`DriverModel::set_targets`] or from a keyframe schedule sampled in
/// [`DriverModel::synchronize`].
#[derive(Debug, Clone)]
pub struct DriverModel {
    throttle: f64,
    displacement: f64,
    target_throttle: f64,
    target_displacement: f64,
    throttle_delta: f64,
    displacement_delta: f64,
    post_limit: f64,
    schedule: Vec<DriverKeyframe>,
}

impl DriverModel {
    pub fn new(post_limit: f64, throttle_delta: f64, displacement_delta: f64) -> Self {
        Self {
            throttle: 0.0,
            displacement: 0.0,
            target_throttle: 0.0,
            target_displacement: 0.0,
            throttle_delta: finite_magnitude(throttle_delta),
            displacement_delta: finite_magnitude(displacement_delta),
            post_limit: finite_magnitude(post_limit),
            schedule: Vec::new(),
        }
    }

    /// Deltas derived from ramp times: full throttle is reached after
    /// `steering_time` and full post travel after `displacement_time`, counted
    /// in render intervals.
    pub fn with_ramp_times(
        post_limit: f64,
        render_interval: f64,
        steering_time: f64,
        displacement_time: f64,
    ) -> Self {
        Self::new(
            post_limit,
            render_interval / steering_time,
            render_interval / displacement_time * post_limit,
        )
    }

    pub fn with_schedule(mut self, mut schedule: Vec<DriverKeyframe>) -> Self {
        schedule.sort_by(|a, b| a.time.total_cmp(&b.time));
        self.schedule = schedule;
        self
    }

    pub fn initialize(&mut self) {
        self.throttle = 0.0;
        self.displacement = 0.0;
        self.target_throttle = 0.0;
        self.target_displacement = 0.0;
    }

    pub fn set_targets(&mut self, throttle: f64, displacement: f64) {
        self.target_throttle = clamp_or_zero(throttle, 0.0, 1.0);
        self.target_displacement = clamp_or_zero(displacement, -self.post_limit, self.post_limit);
    }

    pub fn synchronize(&mut self, time: f64) {
        let latest = self
            .schedule
            .iter()
            .take_while(|k| k.time <= time)
            .last()
            .copied();
        if let Some(k) = latest {
            self.set_targets(k.throttle, k.displacement);
        }
    }

    pub fn advance(&mut self, _step: f64) {
        self.throttle = approach(self.throttle, self.target_throttle, self.throttle_delta)
            .clamp(0.0, 1.0);
        self.displacement = approach(
            self.displacement,
            self.target_displacement,
            self.displacement_delta,
        )
        .clamp(-self.post_limit, self.post_limit);
    }

    pub fn throttle(&self) -> f64 {
        self.throttle
    }

    pub fn displacement(&self) -> f64 {
        self.displacement
    }

    pub fn controls(&self) -> ControlSignal {
        ControlSignal {
            throttle: self.throttle,
            post_displacement: self.displacement,
        }
    }

    pub fn targets(&self) -> (f64, f64) {
        (self.target_throttle, self.target_displacement)
    }

    pub fn throttle_delta(&self) -> f64 {
        self.throttle_delta
    }

    pub fn displacement_delta(&self) -> f64 {
        self.displacement_delta
    }

    pub fn post_limit(&self) -> f64 {
        self.post_limit
    }
}

/// Absolute value, with non-finite inputs treated as zero.
fn finite_magnitude(value: f64) -> f64 {
    if value.is_finite() {
        value.abs()
    } else {
        0.0
    }
}

fn approach(current: f64, target: f64, max_delta: f64) -> f64 {
    let diff = target - current;
    if diff.abs() <= max_delta {
        target
    } else {
        current + max_delta.copysign(diff)
    }
}

// NaN targets fall back to neutral.
fn clamp_or_zero(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(lo, hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_initialize_is_neutral() {
        let mut driver = DriverModel::new(0.2, 0.1, 0.1);
        driver.set_targets(1.0, 0.2);
        driver.advance(1e-3);
        driver.initialize();
        assert_eq!(driver.controls(), ControlSignal::default());
        assert_eq!(driver.targets(), (0.0, 0.0));
    }

    #[test]
    fn test_ramp_reaches_target_without_overshoot() {
        let mut driver = DriverModel::new(0.2, 0.3, 0.05);
        driver.set_targets(1.0, -0.2);
        let mut history = Vec::new();
        for _ in 0..6 {
            driver.advance(1e-3);
            history.push(driver.throttle());
        }
        assert!((history[0] - 0.3).abs() < 1e-12);
        assert!((history[2] - 0.9).abs() < 1e-12);
        assert_eq!(history[3], 1.0);
        assert_eq!(history[5], 1.0);
        assert!((driver.displacement() + 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_targets_are_clamped() {
        let mut driver = DriverModel::new(0.2, 1.0, 1.0);
        driver.set_targets(4.0, 9.0);
        assert_eq!(driver.targets(), (1.0, 0.2));
        driver.set_targets(-1.0, f64::NAN);
        assert_eq!(driver.targets(), (0.0, 0.0));
    }

    #[test]
    fn test_non_finite_limits_hold_neutral() {
        let mut driver = DriverModel::new(f64::NAN, f64::INFINITY, f64::NAN);
        driver.set_targets(1.0, 0.1);
        driver.advance(1e-3);
        assert_eq!(driver.post_limit(), 0.0);
        assert_eq!(driver.throttle(), 0.0);
        assert_eq!(driver.displacement(), 0.0);

        // Zero ramp time gives an infinite delta.
        let mut driver = DriverModel::with_ramp_times(0.2, 1e-3, 0.0, 1.0);
        driver.set_targets(1.0, 0.1);
        driver.advance(1e-3);
        assert_eq!(driver.throttle(), 0.0);
        assert!(driver.displacement() > 0.0);
    }

    #[test]
    fn test_ramp_time_deltas() {
        let driver = DriverModel::with_ramp_times(0.2, 1e-5, 1.0, 2.0);
        assert!((driver.throttle_delta() - 1e-5).abs() < 1e-18);
        assert!((driver.displacement_delta() - 1e-6).abs() < 1e-18);
    }

    #[test]
    fn test_schedule_latches_last_passed_keyframe() {
        let mut driver = DriverModel::new(0.2, 1.0, 1.0).with_schedule(vec![
            DriverKeyframe {
                time: 0.5,
                throttle: 1.0,
                displacement: 0.1,
            },
            DriverKeyframe {
                time: 0.0,
                throttle: 0.2,
                displacement: 0.0,
            },
        ]);
        driver.synchronize(0.1);
        assert_eq!(driver.targets(), (0.2, 0.0));
        driver.synchronize(0.75);
        assert_eq!(driver.targets(), (1.0, 0.1));
    }

    #[test]
    fn test_synchronize_without_schedule_keeps_targets() {
        let mut driver = DriverModel::new(0.2, 1.0, 1.0);
        driver.set_targets(0.5, 0.1);
        driver.synchronize(10.0);
        assert_eq!(driver.targets(), (0.5, 0.1));
    }

    #[test]
    fn test_one_second_throttle_ramp() {
        // 1e-5 s steps, 1.0 s ramp: full throttle after 100_000 advances.
        let mut driver = DriverModel::with_ramp_times(0.2, 1e-5, 1.0, 2.0);
        driver.initialize();
        driver.set_targets(1.0, 0.0);
        for _ in 0..100_000 {
            driver.synchronize(0.0);
            driver.advance(1e-5);
        }
        assert!((driver.throttle() - 1.0).abs() <= driver.throttle_delta());
    }

    proptest! {
        #[test]
        fn prop_advance_is_rate_limited_and_bounded(
            throttle_target in -0.5f64..1.5,
            disp_target in -0.5f64..0.5,
            throttle_delta in 1e-4f64..0.5,
            disp_delta in 1e-4f64..0.5,
            steps in 1usize..50,
        ) {
            let limit = 0.2;
            let mut driver = DriverModel::new(limit, throttle_delta, disp_delta);
            driver.set_targets(throttle_target, disp_target);
            for _ in 0..steps {
                let before = driver.controls();
                driver.advance(1e-3);
                let after = driver.controls();
                prop_assert!((after.throttle - before.throttle).abs() <= throttle_delta + 1e-12);
                prop_assert!(
                    (after.post_displacement - before.post_displacement).abs() <= disp_delta + 1e-12
                );
                prop_assert!((0.0..=1.0).contains(&after.throttle));
                prop_assert!((-limit..=limit).contains(&after.post_displacement));
            }
        }
    }
}
