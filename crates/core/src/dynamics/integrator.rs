// TrackRig - Track Test Rig Co-Simulation
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! HHT-alpha time stepper in acceleration form.
//!
//! For a step `h` from `(q_n, v_n, a_n)` the unknown is `a_{n+1}`:
//!
//! ```text
//! q_{n+1} = q_n + h v_n + h^2 ((1/2 - beta) a_n + beta a_{n+1})
//! v_{n+1} = v_n + h ((1 - gamma) a_n + gamma a_{n+1})
//! R(a_{n+1}) = M a_{n+1} - (1 + alpha) f_{n+1} + alpha f_n = 0
//! ```
//!
//! with `gamma = 1/2 - alpha` and `beta = (1 - alpha)^2 / 4`. Newton
//! corrections use `J = M + (1 + alpha) (gamma h C + beta h^2 K)`.

use super::{DynamicSystem, ForceAssembler, GeneralizedState};
use crate::{RigError, RigResult};
use nalgebra::linalg::LU;
use nalgebra::{DMatrix, DVector, Dyn};
use serde::Serialize;

/// Deepest step subdivision accepted; `h / 2^30` is below any useful step.
pub const MAX_BISECTIONS: u32 = trackrig_config::MAX_BISECTIONS;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IntegratorSettings {
    /// Numerical damping in `[-1/3, 0]`; more negative damps more.
    pub alpha: f64,
    pub max_iterations: u32,
    pub abs_tolerance: f64,
    /// Bisect the step and retry when Newton does not converge.
    pub step_control: bool,
    /// Test convergence on the Jacobian-diagonal scaled residual.
    pub scaling: bool,
    /// Keep the first Jacobian factorization for the whole step.
    pub modified_newton: bool,
    pub max_bisections: u32,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            alpha: -0.2,
            max_iterations: 200,
            abs_tolerance: 1e-2,
            step_control: true,
            scaling: true,
            modified_newton: false,
            max_bisections: 6,
        }
    }
}

impl IntegratorSettings {
    pub fn validate(&self) -> RigResult<()> {
        if !(-1.0 / 3.0..=0.0).contains(&self.alpha) {
            return Err(RigError::Configuration(format!(
                "HHT alpha {} outside [-1/3, 0]",
                self.alpha
            )));
        }
        if !(self.abs_tolerance.is_finite() && self.abs_tolerance > 0.0) {
            return Err(RigError::Configuration(format!(
                "absolute tolerance must be positive, got {}",
                self.abs_tolerance
            )));
        }
        if self.max_bisections > MAX_BISECTIONS {
            return Err(RigError::Configuration(format!(
                "max_bisections {} exceeds {}",
                self.max_bisections, MAX_BISECTIONS
            )));
        }
        Ok(())
    }

    fn gamma(&self) -> f64 {
        0.5 - self.alpha
    }

    fn beta(&self) -> f64 {
        (1.0 - self.alpha) * (1.0 - self.alpha) / 4.0
    }
}

/// Outcome of one call to [`HhtIntegrator::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct IntegratorDiagnostics {
    /// Newton iterations summed over all sub-steps.
    pub iterations: u32,
    /// Largest iteration count of a single sub-step.
    pub max_substep_iterations: u32,
    pub residual_norm: f64,
    pub bisections: u32,
    pub converged: bool,
    pub step_accepted: bool,
}

#[derive(Debug, Clone, Copy)]
struct SubstepOutcome {
    iterations: u32,
    residual_norm: f64,
    converged: bool,
}

#[derive(Debug, Clone)]
pub struct HhtIntegrator {
    settings: IntegratorSettings,
    num_iterations: u32,
    scratch: Option<ForceAssembler>,
}

impl HhtIntegrator {
    pub fn new(settings: IntegratorSettings) -> RigResult<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            num_iterations: 0,
            scratch: None,
        })
    }

    pub fn settings(&self) -> &IntegratorSettings {
        &self.settings
    }

    /// Iterations used by the last accepted step.
    pub fn num_iterations(&self) -> u32 {
        self.num_iterations
    }

    /// Make `state.a` consistent with `M a = f(t, q, v)`.
    pub fn initialize<S: DynamicSystem>(
        &mut self,
        system: &S,
        time: f64,
        state: &mut GeneralizedState,
    ) -> RigResult<()> {
        let mut scratch = ForceAssembler::new(system.dof());
        scratch.reset(false);
        system.evaluate(time, &state.q, &state.v, &mut scratch);
        state.a = system
            .mass_matrix()
            .clone()
            .lu()
            .solve(&scratch.f)
            .ok_or_else(|| RigError::Configuration("singular mass matrix".to_string()))?;
        self.scratch = Some(scratch);
        Ok(())
    }

    /// Advance `state` over `[time, time + step]`.
    ///
    /// `state` is only written when the step is accepted; on divergence it is
    /// left as it was and the diagnostics travel inside the error.
    pub fn advance<S: DynamicSystem>(
        &mut self,
        system: &S,
        time: f64,
        step: f64,
        state: &mut GeneralizedState,
    ) -> RigResult<IntegratorDiagnostics> {
        let mut scratch = self
            .scratch
            .take()
            .filter(|s| s.f.len() == system.dof())
            .unwrap_or_else(|| ForceAssembler::new(system.dof()));

        let mut trial = state.clone();
        let mut diagnostics = IntegratorDiagnostics::default();
        let result = self.advance_interval(
            system,
            time,
            step,
            0,
            &mut trial,
            &mut scratch,
            &mut diagnostics,
        );
        self.scratch = Some(scratch);

        match result {
            Ok(()) => {
                diagnostics.converged = true;
                diagnostics.step_accepted = true;
                self.num_iterations = diagnostics.max_substep_iterations;
                *state = trial;
                Ok(diagnostics)
            }
            Err(()) => Err(RigError::IntegratorDivergence {
                time,
                step,
                diagnostics,
            }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn advance_interval<S: DynamicSystem>(
        &self,
        system: &S,
        time: f64,
        step: f64,
        depth: u32,
        state: &mut GeneralizedState,
        scratch: &mut ForceAssembler,
        diagnostics: &mut IntegratorDiagnostics,
    ) -> Result<(), ()> {
        let outcome = self.solve_substep(system, time, step, state, scratch);
        diagnostics.iterations += outcome.iterations;
        diagnostics.residual_norm = outcome.residual_norm;
        diagnostics.max_substep_iterations =
            diagnostics.max_substep_iterations.max(outcome.iterations);
        if outcome.converged {
            return Ok(());
        }

        if !self.settings.step_control || depth >= self.settings.max_bisections {
            return Err(());
        }

        tracing::warn!(
            "Newton did not converge at t={:.6} (h={:e}, residual {:.3e}); bisecting",
            time,
            step,
            outcome.residual_norm
        );
        diagnostics.bisections += 1;
        let half = 0.5 * step;
        self.advance_interval(system, time, half, depth + 1, state, scratch, diagnostics)?;
        self.advance_interval(
            system,
            time + half,
            half,
            depth + 1,
            state,
            scratch,
            diagnostics,
        )
    }

    /// One HHT step of size `h`. `state` is replaced by the end state only
    /// when Newton converges.
    fn solve_substep<S: DynamicSystem>(
        &self,
        system: &S,
        time: f64,
        h: f64,
        state: &mut GeneralizedState,
        scratch: &mut ForceAssembler,
    ) -> SubstepOutcome {
        let alpha = self.settings.alpha;
        let gamma = self.settings.gamma();
        let beta = self.settings.beta();
        let mass = system.mass_matrix();

        scratch.reset(false);
        system.evaluate(time, &state.q, &state.v, scratch);
        let f_start = scratch.f.clone();

        let q_pred = &state.q + &state.v * h + &state.a * (h * h * (0.5 - beta));
        let v_pred = &state.v + &state.a * (h * (1.0 - gamma));
        // Start from a_{n+1} = a_n on the Newmark update itself.
        let mut a = state.a.clone();
        let mut q = &q_pred + &a * (beta * h * h);
        let mut v = &v_pred + &a * (gamma * h);

        let mut factorization: Option<(LU<f64, Dyn, Dyn>, DVector<f64>)> = None;
        let mut residual_norm = f64::INFINITY;
        let mut outcome = SubstepOutcome {
            iterations: 0,
            residual_norm,
            converged: false,
        };

        for iteration in 0..self.settings.max_iterations {
            outcome.iterations = iteration + 1;
            let refresh = factorization.is_none() || !self.settings.modified_newton;

            scratch.reset(refresh);
            system.evaluate(time + h, &q, &v, scratch);
            let residual: DVector<f64> =
                mass * &a - &scratch.f * (1.0 + alpha) + &f_start * alpha;

            if refresh {
                let jacobian: DMatrix<f64> =
                    mass + (&scratch.c * (gamma * h) + &scratch.k * (beta * h * h)) * (1.0 + alpha);
                let diagonal = jacobian.diagonal().map(|d| if d.abs() > 0.0 { d } else { 1.0 });
                factorization = Some((jacobian.lu(), diagonal));
            }
            let Some((lu, diagonal)) = factorization.as_ref() else {
                break;
            };

            residual_norm = if self.settings.scaling {
                residual.component_div(diagonal).amax()
            } else {
                residual.amax()
            };
            outcome.residual_norm = residual_norm;

            if !residual_norm.is_finite() {
                break;
            }
            if residual_norm <= self.settings.abs_tolerance {
                outcome.converged = true;
                break;
            }

            let Some(delta) = lu.solve(&(-residual)) else {
                break;
            };
            a += delta;
            q = &q_pred + &a * (beta * h * h);
            v = &v_pred + &a * (gamma * h);
        }

        outcome.residual_norm = residual_norm;
        if outcome.converged {
            state.q = q;
            state.v = v;
            state.a = a;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::{ElementLaw, Strain};

    /// Mass on a spring-damper, optionally with a hardening term.
    struct Oscillator {
        mass: DMatrix<f64>,
        law: ElementLaw,
        load: f64,
    }

    impl Oscillator {
        fn new(m: f64, k: f64, c: f64) -> Self {
            Self {
                mass: DMatrix::from_element(1, 1, m),
                law: ElementLaw::linear(k, c),
                load: 0.0,
            }
        }
    }

    impl DynamicSystem for Oscillator {
        fn dof(&self) -> usize {
            1
        }

        fn mass_matrix(&self) -> &DMatrix<f64> {
            &self.mass
        }

        fn evaluate(&self, _t: f64, q: &DVector<f64>, v: &DVector<f64>, out: &mut ForceAssembler) {
            let strain = Strain::linear(&[(0, 1.0)], q, v);
            out.add_element(&strain, &self.law, v);
            out.add_force(0, self.load);
        }
    }

    /// Linear spring that reports no stiffness tangent, so Newton runs on
    /// `J = M` and only converges for small steps.
    struct UntangentedSpring {
        mass: DMatrix<f64>,
        stiffness: f64,
    }

    impl DynamicSystem for UntangentedSpring {
        fn dof(&self) -> usize {
            1
        }

        fn mass_matrix(&self) -> &DMatrix<f64> {
            &self.mass
        }

        fn evaluate(&self, _t: f64, q: &DVector<f64>, _v: &DVector<f64>, out: &mut ForceAssembler) {
            out.add_force(0, -self.stiffness * q[0]);
        }
    }

    fn displaced(q0: f64) -> GeneralizedState {
        let mut state = GeneralizedState::zeros(1);
        state.q[0] = q0;
        state
    }

    #[test]
    fn test_free_vibration_tracks_analytic_solution() {
        let sys = Oscillator::new(1.0, 100.0, 0.0);
        let mut integ = HhtIntegrator::new(IntegratorSettings {
            alpha: 0.0,
            abs_tolerance: 1e-10,
            scaling: false,
            ..Default::default()
        })
        .unwrap();
        let mut state = displaced(0.1);
        integ.initialize(&sys, 0.0, &mut state).unwrap();
        assert!((state.a[0] + 10.0).abs() < 1e-12);

        let h = 1e-3;
        let steps = 500;
        for n in 0..steps {
            let d = integ.advance(&sys, n as f64 * h, h, &mut state).unwrap();
            assert!(d.converged && d.step_accepted);
        }
        let t = steps as f64 * h;
        let exact = 0.1 * (10.0 * t).cos();
        assert!((state.q[0] - exact).abs() < 1e-3, "{} vs {}", state.q[0], exact);
    }

    #[test]
    fn test_linear_problem_converges_in_two_iterations() {
        let sys = Oscillator::new(2.0, 500.0, 3.0);
        let mut integ = HhtIntegrator::new(IntegratorSettings {
            abs_tolerance: 1e-8,
            ..Default::default()
        })
        .unwrap();
        let mut state = displaced(0.05);
        integ.initialize(&sys, 0.0, &mut state).unwrap();
        let d = integ.advance(&sys, 0.0, 1e-3, &mut state).unwrap();
        assert_eq!(d.iterations, 2);
        assert_eq!(integ.num_iterations(), 2);
        assert_eq!(d.bisections, 0);
    }

    #[test]
    fn test_constant_force_integrates_exactly_with_defaults() {
        let mut sys = Oscillator::new(1.0, 0.0, 0.0);
        sys.load = -10.0;
        let mut integ = HhtIntegrator::new(IntegratorSettings::default()).unwrap();
        let mut state = GeneralizedState::zeros(1);
        integ.initialize(&sys, 0.0, &mut state).unwrap();

        let h = 1e-3;
        for n in 0..1000 {
            integ.advance(&sys, n as f64 * h, h, &mut state).unwrap();
        }
        assert!((state.q[0] + 5.0).abs() < 1e-9, "q = {}", state.q[0]);
        assert!((state.v[0] + 10.0).abs() < 1e-9, "v = {}", state.v[0]);
        assert!((state.a[0] + 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_accepted_state_satisfies_newmark_update() {
        let sys = Oscillator::new(1.0, 400.0, 2.0);
        let settings = IntegratorSettings::default();
        let mut integ = HhtIntegrator::new(settings).unwrap();
        let mut state = displaced(0.2);
        integ.initialize(&sys, 0.0, &mut state).unwrap();

        let h = 1e-3;
        let gamma = settings.gamma();
        let beta = settings.beta();
        for n in 0..200 {
            let prev = state.clone();
            integ.advance(&sys, n as f64 * h, h, &mut state).unwrap();
            let v = prev.v[0] + h * ((1.0 - gamma) * prev.a[0] + gamma * state.a[0]);
            let q = prev.q[0]
                + h * prev.v[0]
                + h * h * ((0.5 - beta) * prev.a[0] + beta * state.a[0]);
            assert!((state.v[0] - v).abs() < 1e-12);
            assert!((state.q[0] - q).abs() < 1e-12);
        }
    }

    #[test]
    fn test_numerical_damping_dissipates_energy() {
        let sys = Oscillator::new(1.0, 1e6, 0.0);
        let energy = |s: &GeneralizedState| 0.5 * s.v[0] * s.v[0] + 0.5 * 1e6 * s.q[0] * s.q[0];
        let run = |alpha: f64| {
            let mut integ = HhtIntegrator::new(IntegratorSettings {
                alpha,
                abs_tolerance: 1e-9,
                scaling: true,
                ..Default::default()
            })
            .unwrap();
            let mut state = displaced(1e-3);
            integ.initialize(&sys, 0.0, &mut state).unwrap();
            for n in 0..200 {
                integ.advance(&sys, n as f64 * 1e-2, 1e-2, &mut state).unwrap();
            }
            energy(&state)
        };
        let e0 = 0.5 * 1e6 * 1e-6;
        let undamped = run(0.0);
        let damped = run(-0.3);
        assert!((undamped - e0).abs() < 1e-3 * e0);
        assert!(damped < 0.1 * e0);
    }

    #[test]
    fn test_zero_iterations_diverges_without_touching_state() {
        let sys = Oscillator::new(1.0, 100.0, 1.0);
        let mut integ = HhtIntegrator::new(IntegratorSettings {
            max_iterations: 0,
            ..Default::default()
        })
        .unwrap();
        let mut state = displaced(0.1);
        integ.initialize(&sys, 0.0, &mut state).unwrap();
        let before = state.clone();

        let err = integ.advance(&sys, 0.0, 1e-3, &mut state).unwrap_err();
        match err {
            RigError::IntegratorDivergence { diagnostics, .. } => {
                assert!(!diagnostics.converged);
                assert!(!diagnostics.step_accepted);
                assert_eq!(diagnostics.iterations, 0);
                assert_eq!(diagnostics.bisections, 6);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(state, before);
    }

    #[test]
    fn test_step_control_bisects_on_failure() {
        // Newton on J = M contracts by k beta h^2 / m: 4 at h = 0.04,
        // 1 at h = 0.02, 0.25 at h = 0.01.
        let sys = UntangentedSpring {
            mass: DMatrix::from_element(1, 1, 1.0),
            stiffness: 1e4,
        };
        let settings = IntegratorSettings {
            alpha: 0.0,
            max_iterations: 50,
            step_control: false,
            ..Default::default()
        };
        let mut integ = HhtIntegrator::new(settings).unwrap();
        let mut state = displaced(1.0);
        integ.initialize(&sys, 0.0, &mut state).unwrap();
        let before = state.clone();
        let err = integ.advance(&sys, 0.0, 0.04, &mut state).unwrap_err();
        assert!(matches!(err, RigError::IntegratorDivergence { .. }));
        assert_eq!(state, before);

        let mut integ = HhtIntegrator::new(IntegratorSettings {
            step_control: true,
            max_bisections: 8,
            ..settings
        })
        .unwrap();
        let d = integ.advance(&sys, 0.0, 0.04, &mut state).unwrap();
        assert!(d.converged && d.step_accepted);
        // Full step, then both halves.
        assert_eq!(d.bisections, 3);
        assert!(state.q[0] < 1.0);
        let mut check = ForceAssembler::new(1);
        check.reset(false);
        sys.evaluate(0.04, &state.q, &state.v, &mut check);
        assert!((state.a[0] - check.f[0]).abs() <= settings.abs_tolerance);
    }

    #[test]
    fn test_rejects_unbounded_bisection_depth() {
        let err = HhtIntegrator::new(IntegratorSettings {
            max_bisections: MAX_BISECTIONS + 1,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, RigError::Configuration(_)));
        assert!(HhtIntegrator::new(IntegratorSettings {
            max_bisections: MAX_BISECTIONS,
            ..Default::default()
        })
        .is_ok());
    }

    #[test]
    fn test_constant_load_reaches_static_deflection() {
        let mut sys = Oscillator::new(10.0, 1e4, 400.0);
        sys.load = -100.0;
        let mut integ = HhtIntegrator::new(IntegratorSettings::default()).unwrap();
        let mut state = GeneralizedState::zeros(1);
        integ.initialize(&sys, 0.0, &mut state).unwrap();
        for n in 0..2000 {
            integ.advance(&sys, n as f64 * 1e-3, 1e-3, &mut state).unwrap();
        }
        assert!((state.q[0] + 0.01).abs() < 5e-5, "q = {}", state.q[0]);
    }

    #[test]
    fn test_rejects_alpha_out_of_range() {
        let err = HhtIntegrator::new(IntegratorSettings {
            alpha: -0.4,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, RigError::Configuration(_)));
    }
}
