use std::fmt;
use std::ops::Index;

use itertools::Itertools;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::algebra::{Vector, CLASSIFY_EPSILON, DEFAULT_SINGULAR_EPSILON};
use crate::error::{Error, Result};

/// Iteration budget for the implicit-shift QL sweeps (symmetric path).
const MAX_QL_SWEEPS: usize = 50;

/// Iteration budget per eigenvalue for the double-shift QR (general path).
const MAX_QR_SWEEPS: usize = 30;

/// Dense N×N real matrix with cached derived state.
///
/// The element storage is one contiguous row-major buffer. Factorizations
/// (full LU, partitioned LU), the eigensystem and the classification flags
/// are computed on demand and memoized; every mutating method funnels
/// through [`SquareMatrix::invalidate`], so a cached result can never be
/// observed after the elements changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquareMatrix {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    dim: usize,
    data: Vec<f64>,
    singular_epsilon: f64,
    strict_decomposition: bool,
    #[serde(skip)]
    cache: Cache,
}

#[derive(Debug, Clone, Default)]
struct Cache {
    lu: Option<LuFactors>,
    partition: Option<PartitionedLu>,
    eigen: Option<Box<EigenSystem>>,
    diagonal: Option<bool>,
    tridiagonal: Option<bool>,
    identity: Option<bool>,
    symmetric: Option<bool>,
}

#[derive(Debug, Clone)]
struct LuFactors {
    lu: Vec<f64>,
    perm: Vec<usize>,
    parity: f64,
    nearly_singular: bool,
}

/// Reduced factorization of the unknown-left subsystem, keyed to the mask
/// it was built for.
#[derive(Debug, Clone)]
struct PartitionedLu {
    mask: Vec<bool>,
    left: Vec<usize>,
    right: Vec<usize>,
    lu: Vec<f64>,
    perm: Vec<usize>,
}

/// Result of an eigendecomposition.
///
/// Symmetric matrices yield real eigenvalues in ascending order together
/// with the matching orthonormal eigenvectors as matrix columns. General
/// matrices yield the real and imaginary eigenvalue parts only.
#[derive(Debug, Clone)]
pub struct EigenSystem {
    values: Vector,
    values_imag: Option<Vector>,
    vectors: Option<SquareMatrix>,
}

impl EigenSystem {
    /// Real eigenvalue parts (sorted ascending in the symmetric case).
    pub fn values(&self) -> &Vector {
        &self.values
    }

    /// Imaginary eigenvalue parts; `None` for symmetric matrices.
    pub fn imaginary_values(&self) -> Option<&Vector> {
        self.values_imag.as_ref()
    }

    /// Eigenvectors as matrix columns; `None` for non-symmetric matrices.
    pub fn vectors(&self) -> Option<&SquareMatrix> {
        self.vectors.as_ref()
    }
}

impl SquareMatrix {
    pub fn new(dim: usize) -> Self {
        SquareMatrix {
            label: None,
            dim,
            data: vec![0.0; dim * dim],
            singular_epsilon: DEFAULT_SINGULAR_EPSILON,
            strict_decomposition: false,
            cache: Cache::default(),
        }
    }

    pub fn labeled(dim: usize, label: impl Into<String>) -> Self {
        let mut m = SquareMatrix::new(dim);
        m.label = Some(label.into());
        m
    }

    /// Builds a matrix from `dim * dim` entries in row-major order.
    ///
    /// # Panics
    ///
    /// Panics if the slice length does not equal `dim * dim`.
    pub fn from_row_slice(dim: usize, entries: &[f64]) -> Self {
        assert_eq!(entries.len(), dim * dim, "entry count must be dim^2");
        SquareMatrix {
            label: None,
            dim,
            data: entries.to_vec(),
            singular_epsilon: DEFAULT_SINGULAR_EPSILON,
            strict_decomposition: false,
            cache: Cache::default(),
        }
    }

    pub fn identity(dim: usize) -> Self {
        let mut m = SquareMatrix::new(dim);
        for i in 0..dim {
            m.data[i * dim + i] = 1.0;
        }
        m
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = Some(label.into());
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.dim + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.dim + col] = value;
        self.invalidate();
    }

    pub fn add_to(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.dim + col] += value;
        self.invalidate();
    }

    /// Multiplies every entry by a scalar.
    pub fn scale(&mut self, a: f64) {
        for x in &mut self.data {
            *x *= a;
        }
        self.invalidate();
    }

    /// Zeroes row `i` and sets its diagonal entry to one (a Dirichlet row).
    pub fn force_unit_row(&mut self, i: usize) {
        let n = self.dim;
        self.data[i * n..(i + 1) * n].fill(0.0);
        self.data[i * n + i] = 1.0;
        self.invalidate();
    }

    /// Pivot-magnitude threshold below which the factorization flags the
    /// matrix as nearly singular. Defaults to 1e-10.
    pub fn set_singular_epsilon(&mut self, epsilon: f64) {
        self.singular_epsilon = epsilon;
        self.invalidate();
    }

    pub fn singular_epsilon(&self) -> f64 {
        self.singular_epsilon
    }

    /// In strict mode a nearly singular matrix fails at decomposition;
    /// otherwise the solve proceeds with reduced accuracy and only exactly
    /// singular matrices fail.
    pub fn set_strict_decomposition(&mut self, strict: bool) {
        self.strict_decomposition = strict;
        self.invalidate();
    }

    /// True once a completed factorization met a pivot below the
    /// singularity epsilon. `None` while no factorization is cached.
    pub fn nearly_singular(&self) -> Option<bool> {
        self.cache.lu.as_ref().map(|f| f.nearly_singular)
    }

    /// True when every entry is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|&x| x == 0.0)
    }

    fn invalidate(&mut self) {
        self.cache = Cache::default();
    }

    //--------------------------------------------------------------------------
    // Arithmetic
    //--------------------------------------------------------------------------

    pub fn mul_vec(&self, v: &Vector) -> Result<Vector> {
        if v.len() != self.dim {
            return Err(Error::DimensionMismatch {
                op: "SquareMatrix::mul_vec",
                expected: self.dim,
                found: v.len(),
            });
        }
        let n = self.dim;
        Ok((0..n)
            .map(|i| (0..n).map(|k| self.data[i * n + k] * v[k]).sum())
            .collect())
    }

    pub fn mul_mat(&self, other: &SquareMatrix) -> Result<SquareMatrix> {
        if other.dim != self.dim {
            return Err(Error::DimensionMismatch {
                op: "SquareMatrix::mul_mat",
                expected: self.dim,
                found: other.dim,
            });
        }
        let n = self.dim;
        let mut out = SquareMatrix::new(n);
        for i in 0..n {
            for j in 0..n {
                let mut sum = 0.0;
                for k in 0..n {
                    sum += self.data[i * n + k] * other.data[k * n + j];
                }
                out.data[i * n + j] = sum;
            }
        }
        Ok(out)
    }

    pub fn transpose(&self) -> SquareMatrix {
        let n = self.dim;
        let mut out = SquareMatrix::new(n);
        for i in 0..n {
            for j in 0..n {
                out.data[j * n + i] = self.data[i * n + j];
            }
        }
        out
    }

    //--------------------------------------------------------------------------
    // Classification predicates (memoized, tolerance 1e-10)
    //--------------------------------------------------------------------------

    pub fn is_symmetric(&mut self) -> bool {
        if let Some(v) = self.cache.symmetric {
            return v;
        }
        let n = self.dim;
        let mut symmetric = true;
        'scan: for i in 0..n {
            for j in i + 1..n {
                if (self.data[i * n + j] - self.data[j * n + i]).abs() > CLASSIFY_EPSILON {
                    symmetric = false;
                    break 'scan;
                }
            }
        }
        self.cache.symmetric = Some(symmetric);
        symmetric
    }

    /// Diagonal in the symmetric sense: the matrix must be symmetric and
    /// every off-diagonal entry below the classification tolerance.
    pub fn is_diagonal(&mut self) -> bool {
        if let Some(v) = self.cache.diagonal {
            return v;
        }
        let n = self.dim;
        let diagonal = self.is_symmetric()
            && (0..n).all(|i| {
                (i + 1..n).all(|j| self.data[i * n + j].abs() <= CLASSIFY_EPSILON)
            });
        self.cache.diagonal = Some(diagonal);
        diagonal
    }

    pub fn is_tridiagonal(&mut self) -> bool {
        if let Some(v) = self.cache.tridiagonal {
            return v;
        }
        let n = self.dim;
        let tridiagonal = self.is_symmetric()
            && (0..n).all(|i| {
                (i + 2..n).all(|j| self.data[i * n + j].abs() <= CLASSIFY_EPSILON)
            });
        self.cache.tridiagonal = Some(tridiagonal);
        tridiagonal
    }

    pub fn is_identity(&mut self) -> bool {
        if let Some(v) = self.cache.identity {
            return v;
        }
        let n = self.dim;
        let identity = self.is_diagonal()
            && (0..n).all(|i| (self.data[i * n + i] - 1.0).abs() <= CLASSIFY_EPSILON);
        self.cache.identity = Some(identity);
        identity
    }

    pub fn is_antisymmetric(&mut self) -> Result<bool> {
        Err(Error::NotImplemented("antisymmetry check"))
    }

    pub fn is_orthogonal(&mut self) -> Result<bool> {
        Err(Error::NotImplemented("orthogonality check"))
    }

    //--------------------------------------------------------------------------
    // LU factorization and solves
    //--------------------------------------------------------------------------

    fn decompose_lu(&mut self) -> Result<()> {
        if self.cache.lu.is_some() {
            return Ok(());
        }
        let mut lu = self.data.clone();
        let (perm, parity, nearly_singular) =
            crout_lu(&mut lu, self.dim, self.singular_epsilon)?;
        if nearly_singular {
            if self.strict_decomposition {
                return Err(Error::NearlySingular {
                    epsilon: self.singular_epsilon,
                });
            }
            warn!(
                "matrix{} is nearly singular (pivot below {:e}); continuing with reduced accuracy",
                self.label.as_deref().map(|l| format!(" '{l}'")).unwrap_or_default(),
                self.singular_epsilon
            );
        }
        debug!("factored {0}x{0} matrix (parity {1})", self.dim, parity);
        self.cache.lu = Some(LuFactors {
            lu,
            perm,
            parity,
            nearly_singular,
        });
        Ok(())
    }

    /// Solves `A·x = b` against the cached LU factors, factoring first if
    /// necessary. O(n²) per right-hand side once the factors exist.
    pub fn solve(&mut self, rhs: &Vector) -> Result<Vector> {
        if rhs.len() != self.dim {
            return Err(Error::DimensionMismatch {
                op: "SquareMatrix::solve",
                expected: self.dim,
                found: rhs.len(),
            });
        }
        self.decompose_lu()?;
        let factors = self.lu_factors()?;
        Ok(Vector::from_vec(lu_back_substitute(
            &factors.lu,
            &factors.perm,
            self.dim,
            rhs.as_slice(),
        )))
    }

    /// Determinant from the LU diagonal and the interchange parity.
    /// A singular matrix surfaces as [`Error::Singular`] rather than 0.
    pub fn determinant(&mut self) -> Result<f64> {
        self.decompose_lu()?;
        let factors = self.lu_factors()?;
        let n = self.dim;
        let mut det = factors.parity;
        for i in 0..n {
            det *= factors.lu[i * n + i];
        }
        Ok(det)
    }

    /// Inverse via the LU factors, one back-substitution per unit column.
    pub fn inverse(&mut self) -> Result<SquareMatrix> {
        self.decompose_lu()?;
        let factors = self.lu_factors()?;
        let n = self.dim;
        let mut out = SquareMatrix::new(n);
        let mut e = vec![0.0; n];
        for i in 0..n {
            e.fill(0.0);
            e[i] = 1.0;
            let col = lu_back_substitute(&factors.lu, &factors.perm, n, &e);
            for j in 0..n {
                out.data[j * n + i] = col[j];
            }
        }
        Ok(out)
    }

    fn lu_factors(&self) -> Result<&LuFactors> {
        self.cache.lu.as_ref().ok_or(Error::NotInitialized {
            what: "LU factorization",
        })
    }

    //--------------------------------------------------------------------------
    // Partitioned (separated) solve
    //--------------------------------------------------------------------------

    /// Solves `A·x = b` where some entries of `x` and the complementary
    /// entries of `b` are known.
    ///
    /// A `true` entry of `unknown_left` marks an unknown on the left-hand
    /// side. `left` supplies the known x-entries (read at the `false`
    /// positions), `right` the known b-entries (read at the `true`
    /// positions). The reduced subsystem over the unknown-left indices is
    /// factored once and cached until the mask or the matrix changes; the
    /// unknown right-hand entries are then recovered by substituting the
    /// solved unknowns back into the unreduced matrix. The result carries
    /// every solved value at its original position.
    pub fn solve_partitioned(
        &mut self,
        left: &Vector,
        right: &Vector,
        unknown_left: &[bool],
    ) -> Result<Vector> {
        for (len, what) in [
            (left.len(), "SquareMatrix::solve_partitioned (left)"),
            (right.len(), "SquareMatrix::solve_partitioned (right)"),
            (unknown_left.len(), "SquareMatrix::solve_partitioned (mask)"),
        ] {
            if len != self.dim {
                return Err(Error::DimensionMismatch {
                    op: what,
                    expected: self.dim,
                    found: len,
                });
            }
        }

        self.prepare_partition(unknown_left)?;
        let part = self.cache.partition.as_ref().ok_or(Error::NotInitialized {
            what: "partitioned factorization",
        })?;
        let n = self.dim;
        let m = part.left.len();
        let mut out = vec![0.0; n];

        // Known left-hand contributions moved to the right-hand side.
        for &li in &part.left {
            let mut sum = 0.0;
            for &rj in &part.right {
                sum += self.data[li * n + rj] * left[rj];
            }
            out[li] = right[li] - sum;
        }

        // Permuted forward/backward substitution over the reduced system.
        let mut first_nonzero: Option<usize> = None;
        for i in 0..m {
            let p = part.left[part.perm[i]];
            let mut sum = out[p];
            out[p] = out[part.left[i]];
            if let Some(start) = first_nonzero {
                for j in start..i {
                    sum -= part.lu[i * m + j] * out[part.left[j]];
                }
            } else if sum != 0.0 {
                first_nonzero = Some(i);
            }
            out[part.left[i]] = sum;
        }
        for i in (0..m).rev() {
            let mut sum = out[part.left[i]];
            for j in i + 1..m {
                sum -= part.lu[i * m + j] * out[part.left[j]];
            }
            out[part.left[i]] = sum / part.lu[i * m + i];
        }

        // Unknown right-hand entries from the unreduced matrix.
        for &ri in &part.right {
            let mut sum = 0.0;
            for &lj in &part.left {
                sum += self.data[ri * n + lj] * out[lj];
            }
            for &rj in &part.right {
                sum += self.data[ri * n + rj] * left[rj];
            }
            out[ri] = sum;
        }

        Ok(Vector::from_vec(out))
    }

    fn prepare_partition(&mut self, mask: &[bool]) -> Result<()> {
        if let Some(part) = &self.cache.partition {
            if part.mask == mask {
                return Ok(());
            }
        }

        let left: Vec<usize> = mask.iter().positions(|&b| b).collect();
        let right: Vec<usize> = mask.iter().positions(|&b| !b).collect();
        let m = left.len();
        let n = self.dim;

        let mut lu = vec![0.0; m * m];
        for (i, &li) in left.iter().enumerate() {
            for (j, &lj) in left.iter().enumerate() {
                lu[i * m + j] = self.data[li * n + lj];
            }
        }
        let (perm, _parity, nearly_singular) = crout_lu(&mut lu, m, self.singular_epsilon)
            .map_err(|_| Error::Singular {
                detail: "unknown-left subsystem",
            })?;
        if nearly_singular {
            if self.strict_decomposition {
                return Err(Error::NearlySingular {
                    epsilon: self.singular_epsilon,
                });
            }
            warn!(
                "unknown-left subsystem ({m} of {n} rows) is nearly singular; continuing with reduced accuracy"
            );
        }
        debug!("factored partitioned subsystem: {m} unknown-left of {n} rows");
        self.cache.partition = Some(PartitionedLu {
            mask: mask.to_vec(),
            left,
            right,
            lu,
            perm,
        });
        Ok(())
    }

    //--------------------------------------------------------------------------
    // Eigendecomposition
    //--------------------------------------------------------------------------

    /// Computes (or returns the cached) eigendecomposition.
    ///
    /// Symmetric matrices go through Householder tridiagonalization (skipped
    /// when the matrix already is tridiagonal) and implicit-shift QL;
    /// eigenvalues come back ascending with eigenvectors as matching
    /// columns. Non-symmetric matrices go through balancing, Hessenberg
    /// reduction and Francis double-shift QR, yielding real/imaginary value
    /// pairs without vectors. On failure no partial state is retained.
    pub fn eigensystem(&mut self) -> Result<&EigenSystem> {
        if self.cache.eigen.is_none() {
            let eigen = self.compute_eigensystem()?;
            self.cache.eigen = Some(Box::new(eigen));
        }
        self.cache.eigen.as_deref().ok_or(Error::NotInitialized {
            what: "eigensystem",
        })
    }

    /// Real eigenvalue parts; see [`SquareMatrix::eigensystem`].
    pub fn eigenvalues(&mut self) -> Result<&Vector> {
        Ok(self.eigensystem()?.values())
    }

    fn compute_eigensystem(&mut self) -> Result<EigenSystem> {
        let n = self.dim;
        if n == 0 {
            return Ok(EigenSystem {
                values: Vector::new(0),
                values_imag: None,
                vectors: Some(SquareMatrix::new(0)),
            });
        }

        let symmetric = self.is_symmetric();
        let diagonal = self.is_diagonal();
        let tridiagonal = self.is_tridiagonal();

        if symmetric {
            let mut d: Vec<f64> = (0..n).map(|i| self.data[i * n + i]).collect();
            let mut v = SquareMatrix::identity(n).data;

            if !diagonal {
                let mut e = vec![0.0; n];
                if tridiagonal {
                    for i in 1..n {
                        e[i] = self.data[(i - 1) * n + i];
                    }
                } else {
                    let mut a = self.data.clone();
                    householder_tridiagonalize(&mut a, &mut d, &mut e, n);
                    v = a;
                }
                for i in 1..n {
                    e[i - 1] = e[i];
                }
                e[n - 1] = 0.0;
                ql_implicit_shift(&mut d, &mut e, &mut v, n)?;
            }

            sort_ascending_with_columns(&mut d, &mut v, n);
            Ok(EigenSystem {
                values: Vector::from_vec(d),
                values_imag: None,
                vectors: Some(SquareMatrix::from_row_slice(n, &v)),
            })
        } else {
            let mut a = self.data.clone();
            balance(&mut a, n);
            hessenberg(&mut a, n);
            let (wr, wi) = hqr(&mut a, n)?;
            Ok(EigenSystem {
                values: Vector::from_vec(wr),
                values_imag: Some(Vector::from_vec(wi)),
                vectors: None,
            })
        }
    }
}

impl Index<(usize, usize)> for SquareMatrix {
    type Output = f64;
    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        &self.data[row * self.dim + col]
    }
}

impl PartialEq for SquareMatrix {
    /// Element equality; labels, tolerances and caches are ignored.
    fn eq(&self, other: &Self) -> bool {
        self.dim == other.dim && self.data == other.data
    }
}

impl fmt::Display for SquareMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}]", self.label.as_deref().unwrap_or("matrix"))?;
        for i in 0..self.dim {
            for j in 0..self.dim {
                write!(f, " {}", self.data[i * self.dim + j])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

//--------------------------------------------------------------------------
// Factorization kernel
//--------------------------------------------------------------------------

/// Crout LU with partial pivoting and implicit row scaling, in place.
///
/// Returns the row permutation, the interchange parity and whether any
/// pivot fell below `epsilon`.
fn crout_lu(lu: &mut [f64], n: usize, epsilon: f64) -> Result<(Vec<usize>, f64, bool)> {
    let mut perm = vec![0usize; n];
    let mut parity = 1.0;
    let mut nearly_singular = false;
    let mut scale = vec![0.0; n];

    for i in 0..n {
        let big = (0..n).map(|j| lu[i * n + j].abs()).fold(0.0, f64::max);
        if big == 0.0 {
            return Err(Error::Singular {
                detail: "a row has no nonzero entry",
            });
        }
        if big < epsilon {
            nearly_singular = true;
        }
        scale[i] = 1.0 / big;
    }

    for j in 0..n {
        for i in 0..j {
            let mut sum = lu[i * n + j];
            for k in 0..i {
                sum -= lu[i * n + k] * lu[k * n + j];
            }
            lu[i * n + j] = sum;
        }
        let mut big = 0.0;
        let mut imax = j;
        for i in j..n {
            let mut sum = lu[i * n + j];
            for k in 0..j {
                sum -= lu[i * n + k] * lu[k * n + j];
            }
            lu[i * n + j] = sum;
            if scale[i] * sum.abs() >= big {
                big = scale[i] * sum.abs();
                imax = i;
            }
        }
        if j != imax {
            for k in 0..n {
                lu.swap(imax * n + k, j * n + k);
            }
            parity = -parity;
            scale[imax] = scale[j];
        }
        perm[j] = imax;
        let pivot = lu[j * n + j];
        if pivot == 0.0 {
            return Err(Error::Singular {
                detail: "zero pivot",
            });
        }
        if pivot.abs() < epsilon {
            nearly_singular = true;
        }
        let inv = 1.0 / pivot;
        for i in j + 1..n {
            lu[i * n + j] *= inv;
        }
    }

    Ok((perm, parity, nearly_singular))
}

/// Unscrambles the permutation, then forward/backward substitutes.
fn lu_back_substitute(lu: &[f64], perm: &[usize], n: usize, rhs: &[f64]) -> Vec<f64> {
    let mut x = rhs.to_vec();
    let mut first_nonzero: Option<usize> = None;
    for i in 0..n {
        let p = perm[i];
        let mut sum = x[p];
        x[p] = x[i];
        if let Some(start) = first_nonzero {
            for j in start..i {
                sum -= lu[i * n + j] * x[j];
            }
        } else if sum != 0.0 {
            first_nonzero = Some(i);
        }
        x[i] = sum;
    }
    for i in (0..n).rev() {
        let mut sum = x[i];
        for j in i + 1..n {
            sum -= lu[i * n + j] * x[j];
        }
        x[i] = sum / lu[i * n + i];
    }
    x
}

//--------------------------------------------------------------------------
// Symmetric eigen path
//--------------------------------------------------------------------------

fn pythag(a: f64, b: f64) -> f64 {
    let absa = a.abs();
    let absb = b.abs();
    if absa > absb {
        absa * (1.0 + (absb / absa).powi(2)).sqrt()
    } else if absb == 0.0 {
        0.0
    } else {
        absb * (1.0 + (absa / absb).powi(2)).sqrt()
    }
}

fn sign(a: f64, b: f64) -> f64 {
    if b >= 0.0 {
        a.abs()
    } else {
        -a.abs()
    }
}

/// Householder reduction to tridiagonal form, accumulating the transform
/// in `a` so the QL stage can return eigenvectors of the original matrix.
fn householder_tridiagonalize(a: &mut [f64], d: &mut [f64], e: &mut [f64], n: usize) {
    for i in (1..n).rev() {
        let l = i - 1;
        let mut h = 0.0;
        if l > 0 {
            let mut scale = 0.0;
            for k in 0..=l {
                scale += a[i * n + k].abs();
            }
            if scale == 0.0 {
                e[i] = a[i * n + l];
            } else {
                for k in 0..=l {
                    a[i * n + k] /= scale;
                    h += a[i * n + k] * a[i * n + k];
                }
                let f = a[i * n + l];
                let g = if f >= 0.0 { -h.sqrt() } else { h.sqrt() };
                e[i] = scale * g;
                h -= f * g;
                a[i * n + l] = f - g;
                let mut f = 0.0;
                for j in 0..=l {
                    a[j * n + i] = a[i * n + j] / h;
                    let mut g = 0.0;
                    for k in 0..=j {
                        g += a[j * n + k] * a[i * n + k];
                    }
                    for k in j + 1..=l {
                        g += a[k * n + j] * a[i * n + k];
                    }
                    e[j] = g / h;
                    f += e[j] * a[i * n + j];
                }
                let hh = f / (h + h);
                for j in 0..=l {
                    let f = a[i * n + j];
                    let g = e[j] - hh * f;
                    e[j] = g;
                    for k in 0..=j {
                        a[j * n + k] -= f * e[k] + g * a[i * n + k];
                    }
                }
            }
        } else {
            e[i] = a[i * n + l];
        }
        d[i] = h;
    }
    d[0] = 0.0;
    e[0] = 0.0;
    for i in 0..n {
        if d[i] != 0.0 {
            for j in 0..i {
                let mut g = 0.0;
                for k in 0..i {
                    g += a[i * n + k] * a[k * n + j];
                }
                for k in 0..i {
                    a[k * n + j] -= g * a[k * n + i];
                }
            }
        }
        d[i] = a[i * n + i];
        a[i * n + i] = 1.0;
        for j in 0..i {
            a[j * n + i] = 0.0;
            a[i * n + j] = 0.0;
        }
    }
}

/// Implicit-shift QL iteration on a tridiagonal matrix, rotating the
/// eigenvector columns in `v` along.
fn ql_implicit_shift(d: &mut [f64], e: &mut [f64], v: &mut [f64], n: usize) -> Result<()> {
    for l in 0..n {
        let mut iter = 0;
        loop {
            let mut m = l;
            while m < n - 1 {
                let dd = d[m].abs() + d[m + 1].abs();
                if e[m].abs() + dd == dd {
                    break;
                }
                m += 1;
            }
            if m == l {
                break;
            }
            iter += 1;
            if iter > MAX_QL_SWEEPS {
                return Err(Error::EigenNonConvergence {
                    iterations: MAX_QL_SWEEPS,
                });
            }
            trace!("QL sweep {iter} for eigenvalue {l} (block end {m})");
            let mut g = (d[l + 1] - d[l]) / (2.0 * e[l]);
            let mut r = pythag(g, 1.0);
            g = d[m] - d[l] + e[l] / (g + sign(r, g));
            let mut s = 1.0;
            let mut c = 1.0;
            let mut p = 0.0;
            let mut underflow = false;
            for i in (l..m).rev() {
                let f = s * e[i];
                let b = c * e[i];
                r = pythag(f, g);
                e[i + 1] = r;
                if r == 0.0 {
                    d[i + 1] -= p;
                    e[m] = 0.0;
                    underflow = true;
                    break;
                }
                s = f / r;
                c = g / r;
                g = d[i + 1] - p;
                r = (d[i] - g) * s + 2.0 * c * b;
                p = s * r;
                d[i + 1] = g + p;
                g = c * r - b;
                for k in 0..n {
                    let f = v[k * n + i + 1];
                    v[k * n + i + 1] = s * v[k * n + i] + c * f;
                    v[k * n + i] = c * v[k * n + i] - s * f;
                }
            }
            if underflow {
                continue;
            }
            d[l] -= p;
            e[l] = g;
            e[m] = 0.0;
        }
    }
    Ok(())
}

/// Selection sort of the eigenvalues ascending, swapping eigenvector
/// columns in step.
fn sort_ascending_with_columns(d: &mut [f64], v: &mut [f64], n: usize) {
    for i in 0..n {
        let mut k = i;
        let mut p = d[i];
        for j in i + 1..n {
            if d[j] < p {
                k = j;
                p = d[j];
            }
        }
        if k != i {
            d[k] = d[i];
            d[i] = p;
            for j in 0..n {
                v.swap(j * n + i, j * n + k);
            }
        }
    }
}

//--------------------------------------------------------------------------
// General eigen path
//--------------------------------------------------------------------------

/// Row/column scaling that reduces the matrix norm before the Hessenberg
/// reduction.
fn balance(a: &mut [f64], n: usize) {
    const RADIX: f64 = 2.0;
    let sqrdx = RADIX * RADIX;
    let mut done = false;
    while !done {
        done = true;
        for i in 0..n {
            let mut r = 0.0;
            let mut c = 0.0;
            for j in 0..n {
                if j != i {
                    c += a[j * n + i].abs();
                    r += a[i * n + j].abs();
                }
            }
            if c != 0.0 && r != 0.0 {
                let mut g = r / RADIX;
                let mut f = 1.0;
                let s = c + r;
                while c < g {
                    f *= RADIX;
                    c *= sqrdx;
                }
                g = r * RADIX;
                while c > g {
                    f /= RADIX;
                    c /= sqrdx;
                }
                if (c + r) / f < 0.95 * s {
                    done = false;
                    let g = 1.0 / f;
                    for j in 0..n {
                        a[i * n + j] *= g;
                    }
                    for j in 0..n {
                        a[j * n + i] *= f;
                    }
                }
            }
        }
    }
}

/// Reduction to upper Hessenberg form by stabilized elimination.
fn hessenberg(a: &mut [f64], n: usize) {
    if n < 3 {
        return;
    }
    for m in 1..n - 1 {
        let mut x: f64 = 0.0;
        let mut i = m;
        for j in m..n {
            if a[j * n + m - 1].abs() > x.abs() {
                x = a[j * n + m - 1];
                i = j;
            }
        }
        if i != m {
            for j in m - 1..n {
                a.swap(i * n + j, m * n + j);
            }
            for j in 0..n {
                a.swap(j * n + i, j * n + m);
            }
        }
        if x != 0.0 {
            for i in m + 1..n {
                let mut y = a[i * n + m - 1];
                if y != 0.0 {
                    y /= x;
                    a[i * n + m - 1] = y;
                    for j in m..n {
                        a[i * n + j] -= y * a[m * n + j];
                    }
                    for j in 0..n {
                        a[j * n + m] += y * a[j * n + i];
                    }
                }
            }
        }
    }
}

/// Francis double-shift QR on an upper Hessenberg matrix. Returns the real
/// and imaginary eigenvalue parts.
fn hqr(a: &mut [f64], n: usize) -> Result<(Vec<f64>, Vec<f64>)> {
    let mut wr = vec![0.0; n];
    let mut wi = vec![0.0; n];

    let mut anorm = 0.0;
    for i in 0..n {
        for j in i.saturating_sub(1)..n {
            anorm += a[i * n + j].abs();
        }
    }

    let mut nn = n as isize - 1;
    let mut t = 0.0;
    while nn >= 0 {
        let mut its = 0;
        loop {
            let hi = nn as usize;
            let mut l = hi;
            while l > 0 {
                let mut s = a[(l - 1) * n + l - 1].abs() + a[l * n + l].abs();
                if s == 0.0 {
                    s = anorm;
                }
                if a[l * n + l - 1].abs() + s == s {
                    break;
                }
                l -= 1;
            }

            let mut x = a[hi * n + hi];
            if l == hi {
                // One real root found.
                wr[hi] = x + t;
                wi[hi] = 0.0;
                nn -= 1;
                break;
            }

            let mut y = a[(hi - 1) * n + hi - 1];
            let mut w = a[hi * n + hi - 1] * a[(hi - 1) * n + hi];
            if l == hi - 1 {
                // A 2x2 block: one real pair or one complex conjugate pair.
                let p = 0.5 * (y - x);
                let q = p * p + w;
                let mut z = q.abs().sqrt();
                x += t;
                if q >= 0.0 {
                    z = p + sign(z, p);
                    wr[hi - 1] = x + z;
                    wr[hi] = if z != 0.0 { x - w / z } else { x + z };
                    wi[hi - 1] = 0.0;
                    wi[hi] = 0.0;
                } else {
                    wr[hi - 1] = x + p;
                    wr[hi] = x + p;
                    wi[hi] = z;
                    wi[hi - 1] = -z;
                }
                nn -= 2;
                break;
            }

            if its == MAX_QR_SWEEPS {
                return Err(Error::EigenNonConvergence {
                    iterations: MAX_QR_SWEEPS,
                });
            }
            if its == 10 || its == 20 {
                // Exceptional shift to break limit cycles.
                t += x;
                for i in 0..=hi {
                    a[i * n + i] -= x;
                }
                let s = a[hi * n + hi - 1].abs() + a[(hi - 1) * n + hi - 2].abs();
                x = 0.75 * s;
                y = x;
                w = -0.4375 * s * s;
            }
            its += 1;
            trace!("QR sweep {its} on block {l}..={hi}");

            let mut m = hi - 2;
            let mut p = 0.0;
            let mut q = 0.0;
            let mut r = 0.0;
            loop {
                let z = a[m * n + m];
                let rr = x - z;
                let ss = y - z;
                p = (rr * ss - w) / a[(m + 1) * n + m] + a[m * n + m + 1];
                q = a[(m + 1) * n + m + 1] - z - rr - ss;
                r = a[(m + 2) * n + m + 1];
                let s = p.abs() + q.abs() + r.abs();
                p /= s;
                q /= s;
                r /= s;
                if m == l {
                    break;
                }
                let u = a[m * n + m - 1].abs() * (q.abs() + r.abs());
                let v = p.abs()
                    * (a[(m - 1) * n + m - 1].abs() + z.abs() + a[(m + 1) * n + m + 1].abs());
                if u + v == v {
                    break;
                }
                m -= 1;
            }

            for i in m + 2..=hi {
                a[i * n + i - 2] = 0.0;
                if i != m + 2 {
                    a[i * n + i - 3] = 0.0;
                }
            }

            for k in m..hi {
                if k != m {
                    p = a[k * n + k - 1];
                    q = a[(k + 1) * n + k - 1];
                    r = if k != hi - 1 { a[(k + 2) * n + k - 1] } else { 0.0 };
                    x = p.abs() + q.abs() + r.abs();
                    if x != 0.0 {
                        p /= x;
                        q /= x;
                        r /= x;
                    }
                }
                let s = sign((p * p + q * q + r * r).sqrt(), p);
                if s != 0.0 {
                    if k == m {
                        if l != m {
                            a[k * n + k - 1] = -a[k * n + k - 1];
                        }
                    } else {
                        a[k * n + k - 1] = -s * x;
                    }
                    p += s;
                    x = p / s;
                    y = q / s;
                    let z = r / s;
                    q /= p;
                    r /= p;
                    for j in k..=hi {
                        let mut f = a[k * n + j] + q * a[(k + 1) * n + j];
                        if k != hi - 1 {
                            f += r * a[(k + 2) * n + j];
                            a[(k + 2) * n + j] -= f * z;
                        }
                        a[(k + 1) * n + j] -= f * y;
                        a[k * n + j] -= f * x;
                    }
                    let mmin = if hi < k + 3 { hi } else { k + 3 };
                    for i in l..=mmin {
                        let mut f = x * a[i * n + k] + y * a[i * n + k + 1];
                        if k != hi - 1 {
                            f += z * a[i * n + k + 2];
                            a[i * n + k + 2] -= f * r;
                        }
                        a[i * n + k + 1] -= f * q;
                        a[i * n + k] -= f;
                    }
                }
            }
        }
    }

    Ok((wr, wi))
}
