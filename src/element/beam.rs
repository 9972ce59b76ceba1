use serde::{Deserialize, Serialize};

use crate::algebra::SquareMatrix;

/// Bending-stiffness block of one Euler-Bernoulli element, in units of
/// E·I/ℓ. Node DOFs are (deflection, rotation) per node.
fn stiffness_block(l: f64) -> [[f64; 4]; 4] {
    [
        [12.0 / (l * l), -6.0 / l, -12.0 / (l * l), -6.0 / l],
        [-6.0 / l, 4.0, 6.0 / l, 2.0],
        [-12.0 / (l * l), 6.0 / l, 12.0 / (l * l), 6.0 / l],
        [-6.0 / l, 2.0, 6.0 / l, 4.0],
    ]
}

/// Consistent-mass block of one element, in units of m·ℓ.
fn mass_block(l: f64) -> [[f64; 4]; 4] {
    [
        [13.0 / 35.0, 11.0 / 210.0 * l, 9.0 / 70.0, -13.0 / 420.0 * l],
        [
            11.0 / 210.0 * l,
            1.0 / 105.0 * l * l,
            13.0 / 420.0 * l,
            -1.0 / 140.0 * l * l,
        ],
        [9.0 / 70.0, 13.0 / 420.0 * l, 13.0 / 35.0, -11.0 / 210.0 * l],
        [
            -13.0 / 420.0 * l,
            -1.0 / 140.0 * l * l,
            -11.0 / 210.0 * l,
            1.0 / 105.0 * l * l,
        ],
    ]
}

/// Chain of uniform Euler-Bernoulli beam elements with two DOFs
/// (deflection, rotation) per node.
///
/// `node_count` nodes form `node_count - 1` elements of equal length.
/// The assembler overlap-adds each element's 4×4 block into the global
/// matrix at consecutive node-pair offsets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeamChain {
    pub node_count: usize,
    /// Elastic modulus E.
    pub elastic_modulus: f64,
    /// Second moment of area I.
    pub inertia: f64,
    /// Total beam length.
    pub length: f64,
    /// Mass per unit length.
    pub mass_per_length: f64,
    /// Uniform damping coefficient. Not yet folded into the assembled
    /// matrix; [`BeamChain::damping_matrix`] is a zero placeholder.
    pub damping: f64,
}

impl BeamChain {
    pub fn new(
        node_count: usize,
        elastic_modulus: f64,
        inertia: f64,
        length: f64,
        mass_per_length: f64,
        damping: f64,
    ) -> Self {
        BeamChain {
            node_count,
            elastic_modulus,
            inertia,
            length,
            mass_per_length,
            damping,
        }
    }

    pub fn element_count(&self) -> usize {
        self.node_count - 1
    }

    pub fn element_length(&self) -> f64 {
        self.length / self.element_count() as f64
    }

    /// Degrees of freedom of the assembled system.
    pub fn ndof(&self) -> usize {
        2 * self.node_count
    }

    /// Global bending-stiffness matrix.
    pub fn stiffness_matrix(&self) -> SquareMatrix {
        let l = self.element_length();
        let k = self.elastic_modulus * self.inertia / l;
        self.assemble("stiffness", &stiffness_block(l), k)
    }

    /// Global consistent-mass matrix.
    pub fn mass_matrix(&self) -> SquareMatrix {
        let l = self.element_length();
        let me = self.mass_per_length * l;
        self.assemble("mass", &mass_block(l), me)
    }

    /// Damping placeholder: an all-zero matrix of matching size.
    pub fn damping_matrix(&self) -> SquareMatrix {
        SquareMatrix::labeled(self.ndof(), "damping")
    }

    /// All three system matrices at once.
    pub fn matrices(&self) -> (SquareMatrix, SquareMatrix, SquareMatrix) {
        (
            self.stiffness_matrix(),
            self.mass_matrix(),
            self.damping_matrix(),
        )
    }

    fn assemble(&self, label: &str, block: &[[f64; 4]; 4], factor: f64) -> SquareMatrix {
        let mut matrix = SquareMatrix::labeled(self.ndof(), label);
        for element in 0..self.element_count() {
            let offset = 2 * element;
            for i in 0..4 {
                for j in 0..4 {
                    matrix.add_to(offset + i, offset + j, factor * block[i][j]);
                }
            }
        }
        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn two_node_stiffness_matches_the_element_block() {
        let beam = BeamChain::new(2, 210e9, 1e-6, 2.0, 0.0, 0.0);
        let k = beam.stiffness_matrix();
        let scale = 210e9 * 1e-6 / 2.0;
        assert_eq!(k.dim(), 4);
        assert_relative_eq!(k[(0, 0)], scale * 12.0 / 4.0);
        assert_relative_eq!(k[(0, 1)], -scale * 6.0 / 2.0);
        assert_relative_eq!(k[(1, 1)], scale * 4.0);
        assert_relative_eq!(k[(1, 3)], scale * 2.0);
        assert_relative_eq!(k[(3, 3)], scale * 4.0);
    }

    #[test]
    fn assembled_matrices_are_symmetric() {
        let beam = BeamChain::new(5, 1.0e7, 2.0e-4, 4.0, 3.0, 0.5);
        let mut k = beam.stiffness_matrix();
        let mut m = beam.mass_matrix();
        assert!(k.is_symmetric());
        assert!(m.is_symmetric());
    }

    #[test]
    fn interior_nodes_accumulate_both_neighbours() {
        let beam = BeamChain::new(3, 1.0, 1.0, 2.0, 1.0, 0.0);
        let l = beam.element_length();
        let ei_over_l = beam.elastic_modulus * beam.inertia / l;
        let k = beam.stiffness_matrix();
        // Deflection DOF of the middle node sees 12/l^2 from both elements.
        assert_relative_eq!(k[(2, 2)], 2.0 * ei_over_l * 12.0 / (l * l));
        // Rotation DOF likewise accumulates 4 + 4.
        assert_relative_eq!(k[(3, 3)], 2.0 * ei_over_l * 4.0);

        let m = beam.mass_matrix();
        let me = 1.0 * l;
        assert_relative_eq!(m[(2, 2)], 2.0 * me * 13.0 / 35.0);
    }

    #[test]
    fn damping_placeholder_is_zero() {
        let beam = BeamChain::new(4, 1.0, 1.0, 3.0, 1.0, 0.0);
        let d = beam.damping_matrix();
        assert_eq!(d.dim(), 8);
        assert!(d.is_zero());
    }

    #[test]
    fn element_partition() {
        let beam = BeamChain::new(6, 1.0, 1.0, 10.0, 1.0, 0.0);
        assert_eq!(beam.element_count(), 5);
        assert_relative_eq!(beam.element_length(), 2.0);
        assert_eq!(beam.ndof(), 12);
    }
}
