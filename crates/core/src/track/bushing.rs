// TrackRig - Track Test Rig Co-Simulation
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::{RunningGear, TrackAssembly, TrackVariant};
use crate::dynamics::{ElementLaw, ForceAssembler, Strain};
use crate::forces::TrackForce;
use nalgebra::DVector;

/// Rigid shoes joined by compliant bushings.
///
/// Each shoe carries one tangential coordinate. Segment `j` joins shoe `j`
/// to shoe `j + 1` and closes the loop back to shoe 0.
#[derive(Debug, Clone)]
pub struct BushingTrack {
    name: String,
    gear: RunningGear,
    num_shoes: usize,
    shoe_mass: f64,
    segment: ElementLaw,
    belt: Vec<usize>,
}

impl BushingTrack {
    pub fn new(
        name: impl Into<String>,
        gear: RunningGear,
        num_shoes: usize,
        belt_mass: f64,
        segment: ElementLaw,
    ) -> Self {
        let num_shoes = num_shoes.max(2);
        let offset = gear.belt_offset();
        Self {
            name: name.into(),
            num_shoes,
            shoe_mass: belt_mass / num_shoes as f64,
            segment,
            belt: (offset..offset + num_shoes).collect(),
            gear,
        }
    }

    pub fn shoe_dof(&self, shoe: usize) -> usize {
        self.belt[shoe % self.num_shoes]
    }
}

impl TrackAssembly for BushingTrack {
    const VARIANT: TrackVariant = TrackVariant::Bushing;

    fn name(&self) -> &str {
        &self.name
    }

    fn running_gear(&self) -> &RunningGear {
        &self.gear
    }

    fn dof(&self) -> usize {
        self.gear.belt_offset() + self.num_shoes
    }

    fn num_shoes(&self) -> usize {
        self.num_shoes
    }

    fn mass_diagonal(&self) -> DVector<f64> {
        let mut mass = DVector::zeros(self.dof());
        self.gear.fill_mass(&mut mass);
        for &j in &self.belt {
            mass[j] = self.shoe_mass;
        }
        mass
    }

    fn add_internal_forces(
        &self,
        q: &DVector<f64>,
        v: &DVector<f64>,
        gravity: f64,
        out: &mut ForceAssembler,
    ) {
        self.gear.add_forces(q, v, gravity, out);

        for j in 0..self.num_shoes {
            let mut strain = Strain::linear(
                &[(self.shoe_dof(j + 1), 1.0), (self.shoe_dof(j), -1.0)],
                q,
                v,
            );
            self.gear.push_loop_terms(self.num_shoes, &mut strain, q, v);
            out.add_element(&strain, &self.segment, v);
        }

        self.gear.add_mesh(&self.belt, q, v, out);
    }

    fn apply_load(&self, load: &TrackForce, out: &mut ForceAssembler) {
        self.gear.apply_load(load, &self.belt, out);
    }

    fn belt_travel(&self, q: &DVector<f64>) -> f64 {
        self.belt.iter().map(|&j| q[j]).sum::<f64>() / self.num_shoes as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{m113, VehicleSide, IDLER_DOF};

    #[test]
    fn test_layout() {
        let track = m113::bushing_track(VehicleSide::Left);
        assert_eq!(track.num_shoes(), m113::NUM_SHOES);
        assert_eq!(track.dof(), 2 + m113::NUM_ROAD_WHEELS + m113::NUM_SHOES);
        assert_eq!(track.shoe_dof(m113::NUM_SHOES), track.shoe_dof(0));

        let mass = track.mass_diagonal();
        let belt: f64 = (0..track.num_shoes()).map(|j| mass[track.shoe_dof(j)]).sum();
        assert!((belt - m113::BELT_MASS).abs() < 1e-9);
        assert_eq!(mass[IDLER_DOF], m113::IDLER_MASS);
    }

    #[test]
    fn test_uniform_belt_travel_is_stress_free() {
        let track = m113::bushing_track(VehicleSide::Left);
        let dof = track.dof();
        let mut q = DVector::zeros(dof);
        let v = DVector::zeros(dof);
        for j in 0..track.num_shoes() {
            q[track.shoe_dof(j)] = 0.3;
        }
        q[0] = 0.3 / m113::SPROCKET_RADIUS;

        let mut out = ForceAssembler::new(dof);
        out.reset(true);
        track.add_internal_forces(&q, &v, 0.0, &mut out);
        for j in 0..track.num_shoes() {
            assert!(out.f[track.shoe_dof(j)].abs() < 1e-6);
        }
        assert!(out.f[0].abs() < 1e-6);
        assert!((track.belt_travel(&q) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_idler_travel_tensions_every_segment() {
        let track = m113::bushing_track(VehicleSide::Left);
        let dof = track.dof();
        let mut q = DVector::zeros(dof);
        let v = DVector::zeros(dof);
        q[IDLER_DOF] = m113::TENSIONER_FREE_TRAVEL;

        let mut out = ForceAssembler::new(dof);
        out.reset(false);
        track.add_internal_forces(&q, &v, 0.0, &mut out);
        // Tensioner is relaxed; only the belt pulls the idler back.
        let expected = -4.0 * m113::SEGMENT_STIFFNESS * m113::TENSIONER_FREE_TRAVEL
            / m113::NUM_SHOES as f64;
        assert!((out.f[IDLER_DOF] - expected).abs() < 1e-6 * expected.abs());
    }
}
