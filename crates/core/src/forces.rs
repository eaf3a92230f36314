// TrackRig - Track Test Rig Co-Simulation
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use nalgebra::Vector3;
use serde::Serialize;

/// Externally supplied load on one track, expressed in the chassis frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackForce {
    pub point: Vector3<f64>,
    pub force: Vector3<f64>,
    pub moment: Vector3<f64>,
}

impl Default for TrackForce {
    fn default() -> Self {
        Self {
            point: Vector3::zeros(),
            force: Vector3::zeros(),
            moment: Vector3::zeros(),
        }
    }
}

impl TrackForce {
    pub fn is_zero(&self) -> bool {
        self.force == Vector3::zeros() && self.moment == Vector3::zeros()
    }
}

/// Per-track boundary loads exchanged at each synchronization point.
#[derive(Debug, Clone, PartialEq)]
pub struct ForceExchangeBuffer {
    entries: Vec<TrackForce>,
}

impl ForceExchangeBuffer {
    pub fn new(num_tracks: usize) -> Self {
        Self {
            entries: vec![TrackForce::default(); num_tracks],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, track: usize) -> Option<&TrackForce> {
        self.entries.get(track)
    }

    pub fn set(&mut self, track: usize, load: TrackForce) -> bool {
        match self.entries.get_mut(track) {
            Some(slot) => {
                *slot = load;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.fill(TrackForce::default());
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackForce> {
        self.entries.iter()
    }
}

/// Source of boundary loads, polled once per macro-step before synchronization.
pub trait LoadSource {
    fn fill(&mut self, time: f64, buffer: &mut ForceExchangeBuffer);
}

/// No live source: every track sees zero load.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroLoad;

impl LoadSource for ZeroLoad {
    fn fill(&mut self, _time: f64, buffer: &mut ForceExchangeBuffer) {
        buffer.clear();
    }
}

/// The same load on every track, switched on at `start_time`.
#[derive(Debug, Clone, Copy)]
pub struct ConstantLoad {
    pub load: TrackForce,
    pub start_time: f64,
}

impl LoadSource for ConstantLoad {
    fn fill(&mut self, time: f64, buffer: &mut ForceExchangeBuffer) {
        let load = if time >= self.start_time {
            self.load
        } else {
            TrackForce::default()
        };
        for track in 0..buffer.len() {
            buffer.set(track, load);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_defaults_to_zero() {
        let buffer = ForceExchangeBuffer::new(1);
        assert_eq!(buffer.len(), 1);
        assert!(buffer.get(0).unwrap().is_zero());
        assert!(buffer.get(1).is_none());
    }

    #[test]
    fn test_set_out_of_range() {
        let mut buffer = ForceExchangeBuffer::new(1);
        let load = TrackForce {
            force: Vector3::new(0.0, 0.0, 100.0),
            ..Default::default()
        };
        assert!(buffer.set(0, load));
        assert!(!buffer.set(3, load));
        assert_eq!(buffer.get(0).unwrap().force.z, 100.0);
    }

    #[test]
    fn test_zero_load_clears_previous_values() {
        let mut buffer = ForceExchangeBuffer::new(2);
        buffer.set(
            1,
            TrackForce {
                moment: Vector3::new(0.0, 5.0, 0.0),
                ..Default::default()
            },
        );
        ZeroLoad.fill(0.0, &mut buffer);
        assert!(buffer.iter().all(TrackForce::is_zero));
    }

    #[test]
    fn test_constant_load_switches_on() {
        let mut source = ConstantLoad {
            load: TrackForce {
                force: Vector3::new(-200.0, 0.0, 0.0),
                ..Default::default()
            },
            start_time: 0.5,
        };
        let mut buffer = ForceExchangeBuffer::new(1);
        source.fill(0.25, &mut buffer);
        assert!(buffer.get(0).unwrap().is_zero());
        source.fill(0.5, &mut buffer);
        assert_eq!(buffer.get(0).unwrap().force.x, -200.0);
    }
}
