// TrackRig - Track Test Rig Co-Simulation
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::{RunningGear, TrackAssembly, TrackVariant};
use crate::dynamics::{ElementLaw, ForceAssembler, Strain};
use crate::forces::TrackForce;
use nalgebra::DVector;

/// Continuous band discretized into nodes with a tangential (`u`) and a
/// normal (`w`) coordinate each.
///
/// Elements stretch with the nonlinear axial strain
/// `u' + (w')^2 / 2`, resist bending through the second difference of `w`,
/// and are held near the reference path by a normal direction constraint.
/// Road wheels press on the nearest lower-run node.
#[derive(Debug, Clone)]
pub struct BandTrack {
    name: String,
    gear: RunningGear,
    num_nodes: usize,
    node_mass: f64,
    element_length: f64,
    axial: ElementLaw,
    bending: ElementLaw,
    normal: ElementLaw,
    wheel_contact: ElementLaw,
    contact_nodes: Vec<usize>,
    tangential: Vec<usize>,
}

impl BandTrack {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        gear: RunningGear,
        num_nodes: usize,
        belt_mass: f64,
        axial: ElementLaw,
        bending_rigidity: f64,
        bending_damping: f64,
        normal: ElementLaw,
        wheel_contact: ElementLaw,
    ) -> Self {
        let num_nodes = num_nodes.max(3);
        let element_length = gear.belt_length() / num_nodes as f64;
        let bending = ElementLaw::linear(
            bending_rigidity / element_length.powi(3),
            bending_damping,
        );
        let contact_nodes = gear
            .wheel_arc_positions()
            .iter()
            .map(|s| ((s / element_length).round() as usize) % num_nodes)
            .collect();
        let offset = gear.belt_offset();
        Self {
            name: name.into(),
            num_nodes,
            node_mass: belt_mass / num_nodes as f64,
            element_length,
            axial,
            bending,
            normal,
            wheel_contact,
            contact_nodes,
            tangential: (0..num_nodes).map(|j| offset + 2 * j).collect(),
            gear,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn element_length(&self) -> f64 {
        self.element_length
    }

    pub fn tangential_dof(&self, node: usize) -> usize {
        self.tangential[node % self.num_nodes]
    }

    pub fn normal_dof(&self, node: usize) -> usize {
        self.tangential_dof(node) + 1
    }

    /// Belt node each road wheel bears on.
    pub fn contact_nodes(&self) -> &[usize] {
        &self.contact_nodes
    }
}

impl TrackAssembly for BandTrack {
    const VARIANT: TrackVariant = TrackVariant::FiniteElementBand;

    fn name(&self) -> &str {
        &self.name
    }

    fn running_gear(&self) -> &RunningGear {
        &self.gear
    }

    fn dof(&self) -> usize {
        self.gear.belt_offset() + 2 * self.num_nodes
    }

    fn num_shoes(&self) -> usize {
        self.num_nodes
    }

    fn mass_diagonal(&self) -> DVector<f64> {
        let mut mass = DVector::zeros(self.dof());
        self.gear.fill_mass(&mut mass);
        for j in 0..self.num_nodes {
            mass[self.tangential_dof(j)] = self.node_mass;
            mass[self.normal_dof(j)] = self.node_mass;
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
        let n = self.num_nodes;

        for j in 0..n {
            let mut axial = Strain::linear(
                &[(self.tangential_dof(j + 1), 1.0), (self.tangential_dof(j), -1.0)],
                q,
                v,
            );
            axial.push_half_square_difference(
                self.normal_dof(j),
                self.normal_dof(j + 1),
                self.element_length,
                q,
                v,
            );
            self.gear.push_loop_terms(n, &mut axial, q, v);
            out.add_element(&axial, &self.axial, v);

            let curvature = Strain::linear(
                &[
                    (self.normal_dof(j + n - 1), 1.0),
                    (self.normal_dof(j), -2.0),
                    (self.normal_dof(j + 1), 1.0),
                ],
                q,
                v,
            );
            out.add_element(&curvature, &self.bending, v);

            let offset = Strain::linear(&[(self.normal_dof(j), 1.0)], q, v);
            out.add_element(&offset, &self.normal, v);
        }

        // Wheel moving down pushes the belt outward.
        for (k, &node) in self.contact_nodes.iter().enumerate() {
            let contact = Strain::linear(
                &[(self.normal_dof(node), 1.0), (self.gear.wheel_dof(k), 1.0)],
                q,
                v,
            );
            out.add_element(&contact, &self.wheel_contact, v);
        }

        self.gear.add_mesh(&self.tangential, q, v, out);
    }

    fn apply_load(&self, load: &TrackForce, out: &mut ForceAssembler) {
        self.gear.apply_load(load, &self.tangential, out);
    }

    fn belt_travel(&self, q: &DVector<f64>) -> f64 {
        self.tangential.iter().map(|&j| q[j]).sum::<f64>() / self.num_nodes as f64
    }
}
