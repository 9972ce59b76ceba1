//! Single-DOF mass oscillator driven by a constant load, integrated with
//! both time integrators. Writes a CSV time history and a JSON snapshot of
//! the final second-order state.

use std::io::Write;

use strudyn::prelude::*;
use strudyn::solver::{jerk, newmark};

fn main() {
    // Physical and numerical parameters.
    let mass = 100_000.0;
    let damping = 100_000.0;
    let stiffness = 2_000_000.0;
    let load_value = 200_000.0;
    let h = 0.1;
    let duration = 12.0;

    let matrix = |value: f64, label: &str| -> SquareMatrix {
        let mut m = SquareMatrix::labeled(1, label);
        m.set(0, 0, value);
        m
    };

    let mut standard = NewmarkSolver::new(
        matrix(stiffness, "stiffness"),
        matrix(mass, "mass"),
        matrix(damping, "damping"),
        newmark::StepParameters::newmark(h),
    )
    .expect("matrix dimensions agree");

    let mut extended = JerkSolver::new(
        matrix(stiffness, "stiffness"),
        matrix(mass, "mass"),
        matrix(damping, "damping"),
        matrix(mass * h, "jerk"),
        jerk::StepParameters::standard(h),
    )
    .expect("matrix dimensions agree");

    let load = Vector::from_slice(&[load_value]);
    let steps = (duration / h) as usize;

    let start2 = standard.start_solution(&load).expect("start solution").clone();
    let start3 = extended.start_solution(&load).expect("start solution").clone();
    println!(
        "start: u = {:.6}, v = {:.6}, a = {:.6} (second order)",
        start2.displacement[0], start2.velocity[0], start2.acceleration[0]
    );
    println!(
        "start: u = {:.6}, v = {:.6}, a = {:.6}, j = {:.6} (third order)",
        start3.displacement[0], start3.velocity[0], start3.acceleration[0], start3.jerk[0]
    );

    // Release from the undeformed configuration as the original driver does.
    standard.set_displacement(0, 0.0);
    extended.set_displacement(0, 0.0);
    extended.set_jerk(0, 0.0);

    let mut csv = std::fs::File::create("mass_oscillator.csv").expect("file failure");
    writeln!(csv, "t,u2nd,v2nd,a2nd,u3rd,v3rd,a3rd,j3rd").expect("write failure");

    let mut last2 = standard.state().clone();
    for i in 1..=steps {
        let t = i as f64 * h;
        last2 = standard.next_time_step(&load, true).expect("time step");
        let s3 = extended.next_time_step(&load, true).expect("time step");
        writeln!(
            csv,
            "{t:.3},{},{},{},{},{},{},{}",
            last2.displacement[0],
            last2.velocity[0],
            last2.acceleration[0],
            s3.displacement[0],
            s3.velocity[0],
            s3.acceleration[0],
            s3.jerk[0]
        )
        .expect("write failure");
    }

    println!(
        "end:   u = {:.6} (static value {:.6})",
        last2.displacement[0],
        load_value / stiffness
    );

    let snapshot = serde_json::to_string_pretty(&last2).expect("state serializes");
    std::fs::write("mass_oscillator_state.json", snapshot).expect("file failure");
}
