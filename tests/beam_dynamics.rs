#![allow(non_snake_case)]

use approx::assert_relative_eq;
use strudyn::prelude::*;
use strudyn::solver::newmark;

/// Four-element cantilever, clamped at node 0.
fn cantilever() -> BeamChain {
    BeamChain::new(5, 1.0, 1.0, 1.0, 420.0, 0.0)
}

fn tip_load(ndof: usize, value: f64) -> Vector {
    let mut load = Vector::new(ndof);
    load[ndof - 2] = value;
    load
}

/// Hermite beam elements reproduce the exact nodal solution for a point
/// load, so the static tip deflection has to be P·L³/(3EI) and the tip
/// rotation magnitude P·L²/(2EI).
#[test]
fn static_cantilever_tip_deflection_is_exact() {
    let beam = cantilever();
    let mut K = beam.stiffness_matrix();
    K.force_unit_row(0);
    K.force_unit_row(1);

    let load = tip_load(beam.ndof(), 1.0);
    let u = LinearSystem::direct(&mut K, &load).unwrap().solve().unwrap();

    assert_relative_eq!(u[beam.ndof() - 2], 1.0 / 3.0, epsilon = 1e-9);
    assert_relative_eq!(u[beam.ndof() - 1].abs(), 0.5, epsilon = 1e-9);
    assert_relative_eq!(u[0], 0.0, epsilon = 1e-12);
    assert_relative_eq!(u[1], 0.0, epsilon = 1e-12);
}

#[test]
fn static_cantilever_matches_nalgebra() {
    let beam = cantilever();
    let mut K = beam.stiffness_matrix();
    K.force_unit_row(0);
    K.force_unit_row(1);
    let n = beam.ndof();

    let load = tip_load(n, 1.0);
    let u = LinearSystem::direct(&mut K, &load).unwrap().solve().unwrap();

    let mut entries = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            entries.push(K.get(i, j));
        }
    }
    let na = nalgebra::DMatrix::from_row_slice(n, n, &entries);
    let nb = nalgebra::DVector::from_row_slice(load.as_slice());
    let reference = na.lu().solve(&nb).unwrap();
    for i in 0..n {
        assert_relative_eq!(u[i], reference[i], epsilon = 1e-10);
    }
}

/// Prescribing the clamped DOFs through the separated solve has to agree
/// with forcing unit rows and solving directly.
#[test]
fn separated_solve_agrees_with_unit_row_clamping() {
    let beam = cantilever();
    let n = beam.ndof();
    let load = tip_load(n, 1.0);

    let mut clamped = beam.stiffness_matrix();
    clamped.force_unit_row(0);
    clamped.force_unit_row(1);
    let direct = LinearSystem::direct(&mut clamped, &load)
        .unwrap()
        .solve()
        .unwrap();

    // Same clamped matrix, but the fixed DOFs stay in the known-left set.
    let mut mask = vec![true; n];
    mask[0] = false;
    mask[1] = false;
    let known = Vector::new(n); // both prescribed displacements are zero
    let separated = LinearSystem::separated(&mut clamped, &known, &load, &mask)
        .unwrap()
        .solve()
        .unwrap();

    for i in 2..n {
        assert_relative_eq!(separated[i], direct[i], epsilon = 1e-10);
    }
    // Unknown right-hand entries: the reaction rows of the clamped matrix
    // are unit rows, so they echo the prescribed zeros.
    assert_relative_eq!(separated[0], 0.0);
    assert_relative_eq!(separated[1], 0.0);
}

/// The separated solve on the unclamped matrix recovers the clamp
/// reactions: with the support DOFs known-zero, the right-hand unknowns
/// are the forces the support must supply.
#[test]
fn separated_solve_recovers_support_reactions() {
    let beam = cantilever();
    let n = beam.ndof();
    let mut K = beam.stiffness_matrix();
    let load = tip_load(n, 1.0);

    let mut mask = vec![true; n];
    mask[0] = false;
    mask[1] = false;
    let known = Vector::new(n);
    let out = LinearSystem::separated(&mut K, &known, &load, &mask)
        .unwrap()
        .solve()
        .unwrap();

    // Residual check row by row against the unreduced matrix.
    let mut x = Vector::new(n);
    for i in 0..n {
        x[i] = if mask[i] { out[i] } else { known[i] };
    }
    let product = K.mul_vec(&x).unwrap();
    for i in 0..n {
        let rhs = if mask[i] { load[i] } else { out[i] };
        assert_relative_eq!(product[i], rhs, epsilon = 1e-9);
    }

    // Vertical equilibrium: the support reaction balances the tip load.
    assert_relative_eq!(out[0], -1.0, epsilon = 1e-9);
}

/// Zero load keeps the assembled beam at rest through both the start
/// solution and every subsequent step.
#[test]
fn beam_rest_state_is_stable() {
    let beam = cantilever();
    let (K, M, D) = beam.matrices();
    let mut solver =
        NewmarkSolver::new(K, M, D, newmark::StepParameters::newmark(0.5)).unwrap();
    solver.set_fixed_index(0);
    solver.set_fixed_index(1);

    let zero = Vector::new(beam.ndof());
    solver.start_solution(&zero).unwrap();
    for _ in 0..10 {
        let state = solver.next_time_step(&zero, true).unwrap();
        for i in 0..beam.ndof() {
            assert_eq!(state.displacement[i], 0.0);
            assert_eq!(state.velocity[i], 0.0);
            assert_eq!(state.acceleration[i], 0.0);
        }
    }
}

/// Damped cantilever under a constant tip load: the clamped DOFs stay
/// pinned at zero and the tip creeps to the static deflection.
#[test]
fn damped_cantilever_settles_at_static_deflection() {
    let beam = cantilever();
    let n = beam.ndof();
    let K = beam.stiffness_matrix();
    let M = beam.mass_matrix();
    // Mass-proportional damping; every mode decays at the same rate.
    let mut D = beam.mass_matrix();
    D.scale(0.17);
    D.set_label("damping");

    let mut solver =
        NewmarkSolver::new(K, M, D, newmark::StepParameters::newmark(1.0)).unwrap();
    solver.set_fixed_index(0);
    solver.set_fixed_index(1);

    let load = tip_load(n, 1.0);
    solver.start_solution(&load).unwrap();
    // Release from the undeformed configuration.
    for i in 0..n {
        solver.set_displacement(i, 0.0);
    }

    let mut tip = 0.0;
    for _ in 0..300 {
        let state = solver.next_time_step(&load, true).unwrap();
        assert_eq!(state.displacement[0], 0.0);
        assert_eq!(state.displacement[1], 0.0);
        tip = state.displacement[n - 2];
        assert!(tip.is_finite());
    }
    assert_relative_eq!(tip, 1.0 / 3.0, epsilon = 1e-4);
}
