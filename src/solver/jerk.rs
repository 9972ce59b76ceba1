use itertools::izip;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::algebra::{LinearSystem, SquareMatrix, Vector};
use crate::error::{Error, ErrorContext, Result};
use crate::solver::interpolate_load;

/// Integration coefficients of the jerk-augmented third-order scheme.
///
/// γ multiplies the new third-derivative order the same way β multiplies
/// the acceleration in the second-order family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepParameters {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub theta: f64,
    /// Time step Δt.
    pub h: f64,
}

impl StepParameters {
    /// Default third-order coefficients: α = 1/2, β = 1/6, γ = 1/24, θ = 1.
    pub fn standard(h: f64) -> Self {
        StepParameters {
            alpha: 0.5,
            beta: 1.0 / 6.0,
            gamma: 1.0 / 24.0,
            theta: 1.0,
            h,
        }
    }
}

/// Per-DOF kinematic state including the third derivative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub displacement: Vector,
    pub velocity: Vector,
    pub acceleration: Vector,
    pub jerk: Vector,
}

impl State {
    fn new(ndof: usize) -> Self {
        State {
            displacement: Vector::new(ndof),
            velocity: Vector::new(ndof),
            acceleration: Vector::new(ndof),
            jerk: Vector::new(ndof),
        }
    }
}

/// Third-order implicit time integrator.
///
/// Extends the second-order scheme by the jerk state and its conjugate
/// matrix G. With G identically zero and suitably chosen coefficients the
/// scheme degenerates to the second-order one.
pub struct JerkSolver {
    ndof: usize,
    stiffness: SquareMatrix,
    mass: SquareMatrix,
    damping: SquareMatrix,
    jerk_matrix: SquareMatrix,
    effective: Option<SquareMatrix>,
    params: StepParameters,
    fixed: Vec<usize>,
    load: Vector,
    state: State,
}

impl JerkSolver {
    pub fn new(
        stiffness: SquareMatrix,
        mass: SquareMatrix,
        damping: SquareMatrix,
        jerk_matrix: SquareMatrix,
        params: StepParameters,
    ) -> Result<Self> {
        let ndof = stiffness.dim();
        for (dim, what) in [
            (mass.dim(), "JerkSolver::new (mass)"),
            (damping.dim(), "JerkSolver::new (damping)"),
            (jerk_matrix.dim(), "JerkSolver::new (jerk matrix)"),
        ] {
            if dim != ndof {
                return Err(Error::DimensionMismatch {
                    op: what,
                    expected: ndof,
                    found: dim,
                });
            }
        }
        Ok(JerkSolver {
            ndof,
            stiffness,
            mass,
            damping,
            jerk_matrix,
            effective: None,
            params,
            fixed: Vec::new(),
            load: Vector::new(ndof),
            state: State::new(ndof),
        })
    }

    pub fn ndof(&self) -> usize {
        self.ndof
    }

    pub fn params(&self) -> StepParameters {
        self.params
    }

    /// Replaces the integration coefficients; requires a new start
    /// solution before the next step.
    pub fn set_params(&mut self, params: StepParameters) {
        self.params = params;
        self.effective = None;
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Imposes a homogeneous Dirichlet condition on DOF `index` across all
    /// four system matrices.
    pub fn set_fixed_index(&mut self, index: usize) {
        self.fixed.push(index);
        self.stiffness.force_unit_row(index);
        self.damping.force_unit_row(index);
        self.mass.force_unit_row(index);
        self.jerk_matrix.force_unit_row(index);
        self.effective = None;
    }

    pub fn set_displacement(&mut self, index: usize, value: f64) {
        self.state.displacement[index] = value;
    }

    pub fn set_velocity(&mut self, index: usize, value: f64) {
        self.state.velocity[index] = value;
    }

    pub fn set_acceleration(&mut self, index: usize, value: f64) {
        self.state.acceleration[index] = value;
    }

    pub fn set_jerk(&mut self, index: usize, value: f64) {
        self.state.jerk[index] = value;
    }

    /// Computes the start state: static displacement from K·u = load with
    /// velocity, acceleration and jerk reset to zero; then, unless M is
    /// structurally zero, the initial acceleration from M·a = −(K·u + D·v);
    /// then, unless G is structurally zero, the initial jerk from
    /// G·j = −(load + D·v + M·a + G·j_prev), where j_prev is the jerk as it
    /// stood before this solve. Assembles the effective matrix
    /// K + β/(γθh)·D + α/(γ(θh)²)·M + 1/(γ(θh)³)·G with fixed rows forced
    /// to identity.
    pub fn start_solution(&mut self, load: &Vector) -> Result<&State> {
        self.check_load(load, "JerkSolver::start_solution")?;

        // Fixed DOFs carry no load, in the start solves as in every step.
        let mut load = load.clone();
        for &i in &self.fixed {
            load[i] = 0.0;
        }

        self.state.displacement = LinearSystem::direct(&mut self.stiffness, &load)?
            .solve()
            .in_op("start_solution (static displacement)")?;
        self.state.velocity.fill(0.0);
        self.state.acceleration.fill(0.0);
        self.state.jerk.fill(0.0);

        self.load = load.clone();
        self.effective = Some(self.assemble_effective());

        let elastic = self.stiffness.mul_vec(&self.state.displacement)?;
        let viscous = self.damping.mul_vec(&self.state.velocity)?;
        let jerk_force = self.jerk_matrix.mul_vec(&self.state.jerk)?;

        if !self.mass.is_zero() {
            let rhs: Vector = izip!(elastic.iter(), viscous.iter())
                .map(|(&k, &d)| -k - d)
                .collect();
            self.state.acceleration = LinearSystem::direct(&mut self.mass, &rhs)?
                .solve()
                .in_op("start_solution (initial acceleration)")?;
        }
        let inertial = self.mass.mul_vec(&self.state.acceleration)?;

        if !self.jerk_matrix.is_zero() {
            let rhs: Vector = izip!(
                load.iter(),
                viscous.iter(),
                inertial.iter(),
                jerk_force.iter()
            )
            .map(|(&q, &d, &m, &g)| -(q + d + m + g))
            .collect();
            self.state.jerk = LinearSystem::direct(&mut self.jerk_matrix, &rhs)?
                .solve()
                .in_op("start_solution (initial jerk)")?;
        }
        for &i in &self.fixed {
            self.state.displacement[i] = 0.0;
            self.state.acceleration[i] = 0.0;
            self.state.jerk[i] = 0.0;
        }

        debug!(
            "start solution ready: {} DOFs, {} fixed, h = {}",
            self.ndof,
            self.fixed.len(),
            self.params.h
        );
        Ok(&self.state)
    }

    /// Advances one time step and returns the state at t + h; commits the
    /// result and the load only when `commit` is set, so a trial
    /// evaluation can be repeated.
    pub fn next_time_step(&mut self, load: &Vector, commit: bool) -> Result<State> {
        self.check_load(load, "JerkSolver::next_time_step")?;
        let effective = self.effective.as_mut().ok_or(Error::NotInitialized {
            what: "time step",
        })?;
        let StepParameters {
            alpha,
            beta,
            gamma,
            theta,
            h,
        } = self.params;
        let t = theta * h;

        let u0 = &self.state.displacement;
        let u1 = &self.state.velocity;
        let u2 = &self.state.acceleration;
        let u3 = &self.state.jerk;

        let g_hist: Vector = izip!(u0.iter(), u1.iter(), u2.iter(), u3.iter())
            .map(|(&u, &v, &a, &j)| {
                (1.0 - 1.0 / (6.0 * gamma)) * j
                    - a / (2.0 * gamma * t)
                    - v / (gamma * t * t)
                    - u / (gamma * t * t * t)
            })
            .collect();
        let m_hist: Vector = izip!(u0.iter(), u1.iter(), u2.iter(), u3.iter())
            .map(|(&u, &v, &a, &j)| {
                (1.0 - alpha / (6.0 * gamma)) * t * j + (1.0 - alpha / (2.0 * gamma)) * a
                    - alpha / (gamma * t) * v
                    - alpha / (gamma * t * t) * u
            })
            .collect();
        let d_hist: Vector = izip!(u0.iter(), u1.iter(), u2.iter(), u3.iter())
            .map(|(&u, &v, &a, &j)| {
                (0.5 - beta / (6.0 * gamma)) * t * t * j
                    + (1.0 - beta / (2.0 * gamma)) * t * a
                    + (1.0 - beta / gamma) * v
                    - beta / (gamma * t) * u
            })
            .collect();
        let jerk_force = self.jerk_matrix.mul_vec(&g_hist)?;
        let inertial = self.mass.mul_vec(&m_hist)?;
        let viscous = self.damping.mul_vec(&d_hist)?;

        let interpolated = interpolate_load(&self.load, load, theta);
        let mut rhs: Vector = izip!(
            interpolated.iter(),
            viscous.iter(),
            inertial.iter(),
            jerk_force.iter()
        )
        .map(|(&p, &d, &m, &g)| p - d - m - g)
        .collect();
        for &i in &self.fixed {
            rhs[i] = 0.0;
        }

        let mut trial = LinearSystem::direct(effective, &rhs)?
            .solve()
            .in_op("next_time_step")?;
        // Pin the constrained DOFs exactly; the unit rows only guarantee
        // them up to roundoff.
        for &i in &self.fixed {
            trial[i] = 0.0;
        }

        let th2 = theta * theta;
        let th3 = th2 * theta;
        let th4 = th3 * theta;
        let next = State {
            jerk: izip!(trial.iter(), u0.iter(), u1.iter(), u2.iter(), u3.iter())
                .map(|(&ut, &u, &v, &a, &j)| {
                    (1.0 - 1.0 / (6.0 * gamma * theta)) * j
                        - a / (2.0 * gamma * theta * t)
                        - v / (gamma * theta * t * t)
                        + (ut - u) / (gamma * theta * t * t * t)
                })
                .collect(),
            acceleration: izip!(trial.iter(), u0.iter(), u1.iter(), u2.iter(), u3.iter())
                .map(|(&ut, &u, &v, &a, &j)| {
                    (1.0 - 1.0 / (6.0 * gamma * theta)) * h * j
                        + (1.0 - alpha / (2.0 * gamma * th2)) * a
                        - alpha / (gamma * th2 * t) * v
                        + alpha / (gamma * th2 * t * t) * (ut - u)
                })
                .collect(),
            velocity: izip!(trial.iter(), u0.iter(), u1.iter(), u2.iter(), u3.iter())
                .map(|(&ut, &u, &v, &a, &j)| {
                    (1.0 - beta / (3.0 * gamma * theta)) * 0.5 * h * h * j
                        + (1.0 - beta / (2.0 * gamma * th2)) * h * a
                        + (1.0 - beta / (gamma * th3)) * v
                        + beta / (gamma * th3 * t) * (ut - u)
                })
                .collect(),
            displacement: izip!(trial.iter(), u0.iter(), u1.iter(), u2.iter(), u3.iter())
                .map(|(&ut, &u, &v, &a, &j)| {
                    (1.0 - 1.0 / theta) * h * h * h / 6.0 * j
                        + (1.0 - 1.0 / th2) * 0.5 * h * h * a
                        + (1.0 - 1.0 / th3) * h * v
                        + u
                        + (ut - u) / th4
                })
                .collect(),
        };

        if commit {
            self.load = load.clone();
            self.state = next.clone();
        }
        Ok(next)
    }

    fn assemble_effective(&self) -> SquareMatrix {
        let StepParameters {
            alpha,
            beta,
            gamma,
            theta,
            h,
        } = self.params;
        let t = theta * h;
        let cd = beta / (gamma * t);
        let cm = alpha / (gamma * t * t);
        let cg = 1.0 / (gamma * t * t * t);
        let n = self.ndof;
        let entries: Vec<f64> = (0..n * n)
            .map(|idx| {
                let (i, j) = (idx / n, idx % n);
                self.stiffness.get(i, j)
                    + cd * self.damping.get(i, j)
                    + cm * self.mass.get(i, j)
                    + cg * self.jerk_matrix.get(i, j)
            })
            .collect();
        let mut effective = SquareMatrix::from_row_slice(n, &entries);
        effective.set_label("effective");
        for &i in &self.fixed {
            effective.force_unit_row(i);
        }
        effective
    }

    fn check_load(&self, load: &Vector, op: &'static str) -> Result<()> {
        if load.len() != self.ndof {
            return Err(Error::DimensionMismatch {
                op,
                expected: self.ndof,
                found: load.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use approx::assert_relative_eq;

    fn single_dof(k: f64, m: f64, d: f64, g: f64, params: StepParameters) -> JerkSolver {
        let mut stiffness = SquareMatrix::labeled(1, "stiffness");
        stiffness.set(0, 0, k);
        let mut mass = SquareMatrix::labeled(1, "mass");
        mass.set(0, 0, m);
        let mut damping = SquareMatrix::labeled(1, "damping");
        damping.set(0, 0, d);
        let mut jerk_matrix = SquareMatrix::labeled(1, "jerk");
        jerk_matrix.set(0, 0, g);
        JerkSolver::new(stiffness, mass, damping, jerk_matrix, params).unwrap()
    }

    #[test]
    fn start_solution_with_consistent_jerk_is_zero() {
        // With zero initial velocity the acceleration solve gives
        // M a = -load, so the jerk right-hand side cancels exactly.
        let mut solver = single_dof(2000.0, 100.0, 10.0, 5.0, StepParameters::standard(0.01));
        let load = Vector::from_slice(&[500.0]);
        let state = solver.start_solution(&load).unwrap();
        assert_relative_eq!(state.displacement[0], 0.25, epsilon = 1e-12);
        assert_relative_eq!(state.velocity[0], 0.0);
        assert_relative_eq!(state.acceleration[0], -5.0, epsilon = 1e-12);
        assert_relative_eq!(state.jerk[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn zero_mass_and_jerk_matrices_skip_their_solves() {
        let mut solver = single_dof(2000.0, 0.0, 10.0, 0.0, StepParameters::standard(0.01));
        let load = Vector::from_slice(&[500.0]);
        let state = solver.start_solution(&load).unwrap();
        assert_relative_eq!(state.displacement[0], 0.25, epsilon = 1e-12);
        assert_relative_eq!(state.acceleration[0], 0.0);
        assert_relative_eq!(state.jerk[0], 0.0);
    }

    #[test]
    fn rest_state_stays_at_rest() {
        let mut solver = single_dof(2000.0, 100.0, 10.0, 5.0, StepParameters::standard(0.01));
        let zero = Vector::new(1);
        solver.start_solution(&zero).unwrap();
        for _ in 0..25 {
            let state = solver.next_time_step(&zero, true).unwrap();
            assert_relative_eq!(state.displacement[0], 0.0);
            assert_relative_eq!(state.velocity[0], 0.0);
            assert_relative_eq!(state.acceleration[0], 0.0);
            assert_relative_eq!(state.jerk[0], 0.0);
        }
    }

    #[test]
    fn trial_step_leaves_state_untouched() {
        let mut solver = single_dof(2000.0, 100.0, 10.0, 5.0, StepParameters::standard(0.01));
        let load = Vector::from_slice(&[100.0]);
        solver.start_solution(&load).unwrap();
        let before = solver.state().clone();

        let first = solver.next_time_step(&load, false).unwrap();
        let second = solver.next_time_step(&load, false).unwrap();
        assert_eq!(first, second);
        assert_eq!(solver.state(), &before);
    }

    #[test]
    fn fixed_rows_forced_on_all_four_matrices() {
        let stiffness = SquareMatrix::from_row_slice(2, &[4.0, -2.0, -2.0, 4.0]);
        let mass = SquareMatrix::identity(2);
        let damping = SquareMatrix::new(2);
        let jerk_matrix = SquareMatrix::new(2);
        let mut solver = JerkSolver::new(
            stiffness,
            mass,
            damping,
            jerk_matrix,
            StepParameters::standard(0.1),
        )
        .unwrap();
        solver.set_fixed_index(1);
        for matrix in [
            &solver.stiffness,
            &solver.mass,
            &solver.damping,
            &solver.jerk_matrix,
        ] {
            assert_eq!(matrix[(1, 0)], 0.0);
            assert_eq!(matrix[(1, 1)], 1.0);
        }
    }

    #[test]
    fn step_before_start_is_rejected() {
        let mut solver = single_dof(1.0, 1.0, 0.0, 0.0, StepParameters::standard(0.1));
        let load = Vector::new(1);
        let err = solver.next_time_step(&load, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotInitialized);
    }
}
