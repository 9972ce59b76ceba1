//! Implicit step-by-step integrators for the semi-discrete equations of
//! motion.
//!
//! [`newmark`] advances displacement, velocity and acceleration with the
//! classical Newmark-β / Wilson-θ family; [`jerk`] extends the scheme by a
//! third derivative order with its own conjugate system matrix. Both share
//! the same calling pattern: assemble or supply the system matrices, fix
//! the constrained degrees of freedom, compute a start solution, then step.

pub mod jerk;
pub mod newmark;

use itertools::izip;

use crate::algebra::Vector;

/// θ-interpolation between the last committed load and the incoming one.
/// θ = 1 reproduces the new load; θ > 1 (Wilson) extrapolates to the
/// fictitious time t + θΔt.
fn interpolate_load(committed: &Vector, incoming: &Vector, theta: f64) -> Vector {
    izip!(committed.iter(), incoming.iter())
        .map(|(&q, &qn)| q * (1.0 - theta) + qn * theta)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_interpolation_endpoints() {
        let q = Vector::from_slice(&[1.0, 2.0]);
        let qn = Vector::from_slice(&[3.0, 6.0]);
        let at_new = interpolate_load(&q, &qn, 1.0);
        assert_eq!(at_new.as_slice(), &[3.0, 6.0]);
        let extrapolated = interpolate_load(&q, &qn, 1.5);
        assert_eq!(extrapolated.as_slice(), &[4.0, 8.0]);
    }
}
