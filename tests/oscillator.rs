#![allow(non_snake_case)]

use approx::assert_relative_eq;
use strudyn::prelude::*;
use strudyn::solver::{jerk, newmark};

fn matrix_1x1(value: f64) -> SquareMatrix {
    let mut m = SquareMatrix::new(1);
    m.set(0, 0, value);
    m
}

/// Single-DOF oscillator: M = 1e5, D = 1e5, K = 2e6, constant load 2e5.
/// Released from the undeformed configuration the displacement has to
/// settle at the static value load / K = 0.1.
fn run_to_rest(params: newmark::StepParameters) -> f64 {
    let mut solver = NewmarkSolver::new(
        matrix_1x1(2_000_000.0),
        matrix_1x1(100_000.0),
        matrix_1x1(100_000.0),
        params,
    )
    .unwrap();

    let load = Vector::from_slice(&[200_000.0]);
    let start = solver.start_solution(&load).unwrap();
    assert_relative_eq!(start.displacement[0], 0.1, epsilon = 1e-12);
    solver.set_displacement(0, 0.0);

    let mut last = 0.0;
    let mut peak = 0.0_f64;
    for _ in 1..=120 {
        let state = solver.next_time_step(&load, true).unwrap();
        last = state.displacement[0];
        peak = peak.max(last);
    }
    // The transient has to actually move before it settles.
    assert!(peak > 0.05, "no transient response, peak = {peak}");
    last
}

#[test]
fn oscillator_settles_at_static_displacement_newmark() {
    let last = run_to_rest(newmark::StepParameters::newmark(0.1));
    assert!((last - 0.1).abs() < 5e-3, "final displacement {last}");
}

#[test]
fn oscillator_settles_at_static_displacement_wilson() {
    let last = run_to_rest(newmark::StepParameters::wilson(0.1));
    assert!((last - 0.1).abs() < 5e-3, "final displacement {last}");
}

/// With G identically zero and the coefficient correspondence
/// α₃ = 6γ, β₃ = 3γ against the second-order pair (α₂, β₂) = (1/2, 1/6),
/// every jerk-dependent term of the third-order scheme drops out and the
/// two integrators have to produce the same trajectory.
#[test]
fn third_order_reduces_to_second_order_without_jerk_matrix() {
    let K = SquareMatrix::from_row_slice(2, &[400.0, -100.0, -100.0, 300.0]);
    let M = SquareMatrix::from_row_slice(2, &[100.0, 0.0, 0.0, 80.0]);
    let D = SquareMatrix::from_row_slice(2, &[50.0, -10.0, -10.0, 40.0]);
    let G = SquareMatrix::new(2);
    let h = 0.05;

    let mut second = NewmarkSolver::new(
        K.clone(),
        M.clone(),
        D.clone(),
        newmark::StepParameters {
            alpha: 0.5,
            beta: 1.0 / 6.0,
            theta: 1.0,
            h,
        },
    )
    .unwrap();
    let gamma = 1.0 / 6.0;
    let mut third = JerkSolver::new(
        K,
        M,
        D,
        G,
        jerk::StepParameters {
            alpha: 6.0 * gamma,
            beta: 3.0 * gamma,
            gamma,
            theta: 1.0,
            h,
        },
    )
    .unwrap();

    let load0 = Vector::from_slice(&[120.0, 60.0]);
    let s2 = second.start_solution(&load0).unwrap().clone();
    let s3 = third.start_solution(&load0).unwrap().clone();
    for i in 0..2 {
        assert_relative_eq!(s2.displacement[i], s3.displacement[i], epsilon = 1e-12);
        assert_relative_eq!(s2.acceleration[i], s3.acceleration[i], epsilon = 1e-12);
    }

    for step in 1..=40 {
        let time = step as f64 * h;
        let load = Vector::from_slice(&[
            120.0 * (0.3 * time).sin(),
            60.0 * (0.2 * time).cos(),
        ]);
        let n2 = second.next_time_step(&load, true).unwrap();
        let n3 = third.next_time_step(&load, true).unwrap();
        for i in 0..2 {
            assert_relative_eq!(n2.displacement[i], n3.displacement[i], epsilon = 1e-9);
            assert_relative_eq!(n2.velocity[i], n3.velocity[i], epsilon = 1e-9);
            assert_relative_eq!(n2.acceleration[i], n3.acceleration[i], epsilon = 1e-9);
        }
    }
}

/// The load component at a fixed DOF must not leak into any other DOF.
#[test]
fn fixed_dof_load_is_decoupled() {
    let K = SquareMatrix::from_row_slice(2, &[500.0, -200.0, -200.0, 400.0]);
    let M = SquareMatrix::from_row_slice(2, &[50.0, 10.0, 10.0, 60.0]);
    let D = SquareMatrix::from_row_slice(2, &[5.0, 0.0, 0.0, 5.0]);

    let build = |load_at_fixed: f64| -> Vec<f64> {
        let mut solver = NewmarkSolver::new(
            K.clone(),
            M.clone(),
            D.clone(),
            newmark::StepParameters::newmark(0.02),
        )
        .unwrap();
        solver.set_fixed_index(0);
        let load = Vector::from_slice(&[load_at_fixed, 75.0]);
        solver.start_solution(&load).unwrap();

        let mut trace = Vec::new();
        for _ in 0..30 {
            let state = solver.next_time_step(&load, true).unwrap();
            assert_eq!(state.displacement[0], 0.0);
            trace.push(state.displacement[1]);
            trace.push(state.velocity[1]);
            trace.push(state.acceleration[1]);
        }
        trace
    };

    let quiet = build(0.0);
    let loud = build(1.0e6);
    assert_eq!(quiet, loud);
}

/// A Wilson step extrapolates to t + θh; re-evaluating the same step
/// without committing must be free of side effects, and committing the
/// trial must reproduce it.
#[test]
fn wilson_trial_steps_are_repeatable() {
    let mut solver = NewmarkSolver::new(
        matrix_1x1(2_000_000.0),
        matrix_1x1(100_000.0),
        matrix_1x1(100_000.0),
        newmark::StepParameters::wilson(0.1),
    )
    .unwrap();
    let load = Vector::from_slice(&[200_000.0]);
    solver.start_solution(&load).unwrap();

    let ramped = Vector::from_slice(&[250_000.0]);
    let trial_a = solver.next_time_step(&ramped, false).unwrap();
    let trial_b = solver.next_time_step(&ramped, false).unwrap();
    assert_eq!(trial_a, trial_b);

    let committed = solver.next_time_step(&ramped, true).unwrap();
    assert_eq!(committed, trial_a);
    assert_eq!(solver.state(), &committed);
}
