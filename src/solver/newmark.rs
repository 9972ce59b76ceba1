use itertools::izip;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::algebra::{LinearSystem, SquareMatrix, Vector};
use crate::error::{Error, ErrorContext, Result};
use crate::solver::interpolate_load;

/// Integration coefficients of the Newmark-β / Wilson-θ family.
///
/// θ = 1 gives plain Newmark; θ > 1 extrapolates each step to the
/// fictitious time t + θh before projecting back (Wilson).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepParameters {
    pub alpha: f64,
    pub beta: f64,
    pub theta: f64,
    /// Time step Δt.
    pub h: f64,
}

impl StepParameters {
    /// Newmark constant average acceleration: α = 1/2, β = 1/4, θ = 1.
    pub fn newmark(h: f64) -> Self {
        StepParameters {
            alpha: 0.5,
            beta: 0.25,
            theta: 1.0,
            h,
        }
    }

    /// Wilson-θ with linear acceleration: α = 1/2, β = 1/6, θ = 1.37.
    pub fn wilson(h: f64) -> Self {
        StepParameters {
            alpha: 0.5,
            beta: 1.0 / 6.0,
            theta: 1.37,
            h,
        }
    }
}

/// Per-DOF kinematic state at one time level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub displacement: Vector,
    pub velocity: Vector,
    pub acceleration: Vector,
}

impl State {
    fn new(ndof: usize) -> Self {
        State {
            displacement: Vector::new(ndof),
            velocity: Vector::new(ndof),
            acceleration: Vector::new(ndof),
        }
    }
}

/// Second-order implicit time integrator.
///
/// Owns the stiffness, mass and damping matrices, the effective matrix
/// assembled from them, the committed load and the current state. Stepping
/// is strictly sequential: [`NewmarkSolver::start_solution`] establishes the
/// static start state and the effective matrix, after which
/// [`NewmarkSolver::next_time_step`] advances one Δt per call.
pub struct NewmarkSolver {
    ndof: usize,
    stiffness: SquareMatrix,
    mass: SquareMatrix,
    damping: SquareMatrix,
    effective: Option<SquareMatrix>,
    params: StepParameters,
    fixed: Vec<usize>,
    load: Vector,
    state: State,
}

impl NewmarkSolver {
    pub fn new(
        stiffness: SquareMatrix,
        mass: SquareMatrix,
        damping: SquareMatrix,
        params: StepParameters,
    ) -> Result<Self> {
        let ndof = stiffness.dim();
        for (dim, what) in [
            (mass.dim(), "NewmarkSolver::new (mass)"),
            (damping.dim(), "NewmarkSolver::new (damping)"),
        ] {
            if dim != ndof {
                return Err(Error::DimensionMismatch {
                    op: what,
                    expected: ndof,
                    found: dim,
                });
            }
        }
        Ok(NewmarkSolver {
            ndof,
            stiffness,
            mass,
            damping,
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

    /// Replaces the integration coefficients. The effective matrix depends
    /// on them, so a new start solution is required afterwards.
    pub fn set_params(&mut self, params: StepParameters) {
        self.params = params;
        self.effective = None;
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Imposes a homogeneous Dirichlet condition on DOF `index`: row
    /// `index` of every system matrix becomes the unit row, and the load
    /// and history contributions at `index` are zeroed before each solve.
    pub fn set_fixed_index(&mut self, index: usize) {
        self.fixed.push(index);
        self.stiffness.force_unit_row(index);
        self.damping.force_unit_row(index);
        self.mass.force_unit_row(index);
        self.effective = None;
    }

    /// Overrides the current displacement at one DOF.
    pub fn set_displacement(&mut self, index: usize, value: f64) {
        self.state.displacement[index] = value;
    }

    /// Computes the start state for the given load: static displacement
    /// from K·u = load, zero velocity, acceleration from
    /// M·a = −(K·u + D·v). Assembles the effective matrix
    /// K + α/(βθh)·D + 1/(β(θh)²)·M with fixed rows re-forced to identity.
    pub fn start_solution(&mut self, load: &Vector) -> Result<&State> {
        self.check_load(load, "NewmarkSolver::start_solution")?;

        // Fixed DOFs carry no load, in the start solves as in every step.
        let mut load = load.clone();
        for &i in &self.fixed {
            load[i] = 0.0;
        }

        self.state.displacement = LinearSystem::direct(&mut self.stiffness, &load)?
            .solve()
            .in_op("start_solution (static displacement)")?;
        self.state.velocity.fill(0.0);

        let elastic = self.stiffness.mul_vec(&self.state.displacement)?;
        let viscous = self.damping.mul_vec(&self.state.velocity)?;
        let rhs: Vector = izip!(elastic.iter(), viscous.iter())
            .map(|(&k, &d)| -k - d)
            .collect();
        self.state.acceleration = LinearSystem::direct(&mut self.mass, &rhs)?
            .solve()
            .in_op("start_solution (initial acceleration)")?;
        for &i in &self.fixed {
            self.state.displacement[i] = 0.0;
            self.state.acceleration[i] = 0.0;
        }

        self.load = load;
        self.effective = Some(self.assemble_effective());
        debug!(
            "start solution ready: {} DOFs, {} fixed, h = {}",
            self.ndof,
            self.fixed.len(),
            self.params.h
        );
        Ok(&self.state)
    }

    /// Advances one time step for the given load and returns the state at
    /// t + h. With `commit` the result (and the load) become the new
    /// current state; without it the call is a pure trial evaluation and
    /// can be repeated.
    pub fn next_time_step(&mut self, load: &Vector, commit: bool) -> Result<State> {
        self.check_load(load, "NewmarkSolver::next_time_step")?;
        let effective = self.effective.as_mut().ok_or(Error::NotInitialized {
            what: "time step",
        })?;
        let StepParameters {
            alpha,
            beta,
            theta,
            h,
        } = self.params;
        let t = theta * h;

        let u0 = &self.state.displacement;
        let u1 = &self.state.velocity;
        let u2 = &self.state.acceleration;

        let m_hist: Vector = izip!(u0.iter(), u1.iter(), u2.iter())
            .map(|(&u, &v, &a)| {
                (1.0 - 1.0 / (2.0 * beta)) * a - v / (beta * t) - u / (beta * t * t)
            })
            .collect();
        let d_hist: Vector = izip!(u0.iter(), u1.iter(), u2.iter())
            .map(|(&u, &v, &a)| {
                (1.0 - alpha / (2.0 * beta)) * t * a + (1.0 - alpha / beta) * v
                    - alpha / (beta * t) * u
            })
            .collect();
        let inertial = self.mass.mul_vec(&m_hist)?;
        let viscous = self.damping.mul_vec(&d_hist)?;

        let interpolated = interpolate_load(&self.load, load, theta);
        let mut rhs: Vector = izip!(interpolated.iter(), viscous.iter(), inertial.iter())
            .map(|(&p, &d, &m)| p - d - m)
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
        let next = State {
            displacement: izip!(trial.iter(), u0.iter(), u1.iter(), u2.iter())
                .map(|(&ut, &u, &v, &a)| {
                    u + (ut - u) / th3
                        + (1.0 - 1.0 / th2) * h * v
                        + 0.5 * (1.0 - 1.0 / theta) * h * h * a
                })
                .collect(),
            velocity: izip!(trial.iter(), u0.iter(), u1.iter(), u2.iter())
                .map(|(&ut, &u, &v, &a)| {
                    alpha / (beta * th3 * h) * (ut - u)
                        + (1.0 - alpha / (beta * th2)) * v
                        + (1.0 - alpha / (2.0 * beta * theta)) * h * a
                })
                .collect(),
            acceleration: izip!(trial.iter(), u0.iter(), u1.iter(), u2.iter())
                .map(|(&ut, &u, &v, &a)| {
                    (ut - u) / (beta * th3 * h * h) - v / (beta * th2 * h)
                        + (1.0 - 1.0 / (2.0 * beta * theta)) * a
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
            theta,
            h,
        } = self.params;
        let t = theta * h;
        let cd = alpha / (beta * t);
        let cm = 1.0 / (beta * t * t);
        let n = self.ndof;
        let entries: Vec<f64> = (0..n * n)
            .map(|idx| {
                let (i, j) = (idx / n, idx % n);
                self.stiffness.get(i, j) + cd * self.damping.get(i, j) + cm * self.mass.get(i, j)
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
