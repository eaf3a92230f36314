// TrackRig - Track Test Rig Co-Simulation
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Assembled second-order system `M a = f(t, q, v)` and the element helpers
//! used to build `f` together with its tangent matrices.

pub mod integrator;

use nalgebra::{DMatrix, DVector};

/// Positions, velocities and accelerations of every generalized coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralizedState {
    pub q: DVector<f64>,
    pub v: DVector<f64>,
    pub a: DVector<f64>,
}

impl GeneralizedState {
    pub fn zeros(dof: usize) -> Self {
        Self {
            q: DVector::zeros(dof),
            v: DVector::zeros(dof),
            a: DVector::zeros(dof),
        }
    }

    pub fn dof(&self) -> usize {
        self.q.len()
    }
}

/// Boundary to whatever assembles mass, forces and tangents.
pub trait DynamicSystem {
    fn dof(&self) -> usize;

    fn mass_matrix(&self) -> &DMatrix<f64>;

    /// Accumulate generalized forces at `(t, q, v)` into `out`, plus the
    /// tangents `K = -df/dq` and `C = -df/dv` when `out` requests them.
    fn evaluate(&self, time: f64, q: &DVector<f64>, v: &DVector<f64>, out: &mut ForceAssembler);
}

/// Scratch storage for one force evaluation.
#[derive(Debug, Clone)]
pub struct ForceAssembler {
    pub f: DVector<f64>,
    pub k: DMatrix<f64>,
    pub c: DMatrix<f64>,
    jacobians: bool,
}

impl ForceAssembler {
    pub fn new(dof: usize) -> Self {
        Self {
            f: DVector::zeros(dof),
            k: DMatrix::zeros(dof, dof),
            c: DMatrix::zeros(dof, dof),
            jacobians: true,
        }
    }

    pub fn reset(&mut self, jacobians: bool) {
        self.f.fill(0.0);
        self.jacobians = jacobians;
        if jacobians {
            self.k.fill(0.0);
            self.c.fill(0.0);
        }
    }

    pub fn add_force(&mut self, i: usize, value: f64) {
        self.f[i] += value;
    }

    pub fn add_stiffness(&mut self, i: usize, j: usize, value: f64) {
        if self.jacobians {
            self.k[(i, j)] += value;
        }
    }

    pub fn add_damping(&mut self, i: usize, j: usize, value: f64) {
        if self.jacobians {
            self.c[(i, j)] += value;
        }
    }

    /// Apply an element whose generalized force is `-T(e, de/dt) * grad(e)`.
    pub fn add_element(&mut self, strain: &Strain, law: &ElementLaw, v: &DVector<f64>) {
        let (tension, de, drate) = law.evaluate(strain.value, strain.rate);
        for &(m, gm) in &strain.grad {
            self.f[m] -= tension * gm;
        }
        if !self.jacobians {
            return;
        }

        // d(rate)/dq through the curvature of e.
        let mut hv: Vec<(usize, f64)> = Vec::new();
        for &(m, n, h) in &strain.hess {
            hv.push((n, h * v[m]));
        }

        for &(m, gm) in &strain.grad {
            for &(n, gn) in &strain.grad {
                self.k[(m, n)] += de * gm * gn;
                self.c[(m, n)] += drate * gm * gn;
            }
            for &(n, hvn) in &hv {
                self.k[(m, n)] += drate * gm * hvn;
            }
        }
        for &(m, n, h) in &strain.hess {
            self.k[(m, n)] += tension * h;
        }
    }
}

/// A scalar generalized strain `e(q)` with its rate, gradient and Hessian.
///
/// The Hessian is stored as full `(row, col, value)` entries, symmetric pairs
/// included.
#[derive(Debug, Clone, Default)]
pub struct Strain {
    pub value: f64,
    pub rate: f64,
    pub grad: Vec<(usize, f64)>,
    pub hess: Vec<(usize, usize, f64)>,
}

impl Strain {
    /// `e = sum(c_i * q_i)`.
    pub fn linear(terms: &[(usize, f64)], q: &DVector<f64>, v: &DVector<f64>) -> Self {
        let mut strain = Self::default();
        for &(i, c) in terms {
            strain.push_linear(i, c, q, v);
        }
        strain
    }

    pub fn push_linear(&mut self, i: usize, c: f64, q: &DVector<f64>, v: &DVector<f64>) {
        self.value += c * q[i];
        self.rate += c * v[i];
        self.grad.push((i, c));
    }

    /// Add `(q_j - q_i)^2 / (2 * length)`.
    pub fn push_half_square_difference(
        &mut self,
        i: usize,
        j: usize,
        length: f64,
        q: &DVector<f64>,
        v: &DVector<f64>,
    ) {
        let d = q[j] - q[i];
        let dd = v[j] - v[i];
        let s = d / length;
        self.value += 0.5 * d * s;
        self.rate += s * dd;
        self.grad.push((j, s));
        self.grad.push((i, -s));
        let h = 1.0 / length;
        self.hess.push((i, i, h));
        self.hess.push((j, j, h));
        self.hess.push((i, j, -h));
        self.hess.push((j, i, -h));
    }

    pub fn with_offset(mut self, value: f64, rate: f64) -> Self {
        self.value += value;
        self.rate += rate;
        self
    }
}

/// Tension law `T = k1 e + k3 e^3 + c de/dt`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementLaw {
    pub stiffness: f64,
    pub cubic_stiffness: f64,
    pub damping: f64,
}

impl ElementLaw {
    pub fn linear(stiffness: f64, damping: f64) -> Self {
        Self {
            stiffness,
            cubic_stiffness: 0.0,
            damping,
        }
    }

    /// Returns `(T, dT/de, dT/d(rate))`.
    pub fn evaluate(&self, e: f64, rate: f64) -> (f64, f64, f64) {
        let tension = self.stiffness * e + self.cubic_stiffness * e * e * e + self.damping * rate;
        let de = self.stiffness + 3.0 * self.cubic_stiffness * e * e;
        (tension, de, self.damping)
    }
}
