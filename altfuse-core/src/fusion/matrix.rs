//! Dense linear algebra for the filter recursion
//!
//! Fixed-capacity matrices and vectors with runtime shapes. Storage lives
//! inline (no heap), shapes are checked on every operation and a mismatch is
//! returned as [`FusionError::DimensionMismatch`] instead of being truncated
//! or padded.
//!
//! All operations are pure: inputs are borrowed immutably and a fresh result
//! is returned.
//!
//! ## Inversion
//!
//! [`invert`] uses Gauss-Jordan elimination with partial pivoting. A pivot
//! smaller than `epsilon × max(1, max|aᵢⱼ|)` means the matrix is singular
//! for our purposes:
//!
//! ```text
//! threshold = ε · max(1, max|aᵢⱼ|)
//! |pivot| < threshold  →  SingularMatrix
//! ```
//!
//! The threshold scales with large matrices but never drops below `ε`, so a
//! uniformly tiny matrix (or a round-off sized 1 × 1) is not mistaken for a
//! usable inverse.

use core::ops::{Deref, DerefMut, Index, IndexMut};

use heapless::Vec;

use crate::errors::{FusionError, FusionResult};

/// Maximum rows, columns or vector length supported by the inline storage
pub const MAX_DIM: usize = 8;

fn check_capacity(requested: usize) -> FusionResult<()> {
    if requested > MAX_DIM {
        return Err(FusionError::CapacityExceeded {
            requested,
            max: MAX_DIM,
        });
    }
    Ok(())
}

/// Column vector of up to [`MAX_DIM`] entries
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Vector {
    data: Vec<f64, MAX_DIM>,
}

impl Vector {
    /// Vector of `len` zeros
    pub fn zeros(len: usize) -> FusionResult<Self> {
        check_capacity(len)?;
        let mut data = Vec::new();
        data.resize(len, 0.0).map_err(|_| FusionError::CapacityExceeded {
            requested: len,
            max: MAX_DIM,
        })?;
        Ok(Self { data })
    }

    /// Copy values into a new vector
    pub fn from_slice(values: &[f64]) -> FusionResult<Self> {
        let data = Vec::from_slice(values).map_err(|_| FusionError::CapacityExceeded {
            requested: values.len(),
            max: MAX_DIM,
        })?;
        Ok(Self { data })
    }

    /// Entries as a slice
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// True when every entry is finite
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Element-wise sum, lengths must agree
    pub fn checked_add(&self, other: &Vector) -> FusionResult<Vector> {
        self.zip_with(other, |a, b| a + b)
    }

    /// Element-wise difference `self − other`, lengths must agree
    pub fn checked_sub(&self, other: &Vector) -> FusionResult<Vector> {
        self.zip_with(other, |a, b| a - b)
    }

    fn zip_with(&self, other: &Vector, op: impl Fn(f64, f64) -> f64) -> FusionResult<Vector> {
        if self.len() != other.len() {
            return Err(FusionError::length(self.len(), other.len()));
        }
        let mut out = self.clone();
        for (o, &b) in out.data.iter_mut().zip(other.data.iter()) {
            *o = op(*o, b);
        }
        Ok(out)
    }
}

impl Deref for Vector {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.data
    }
}

impl DerefMut for Vector {
    fn deref_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

/// Dense row-major matrix of up to [`MAX_DIM`] × [`MAX_DIM`]
///
/// Entries outside `rows × cols` are always zero, so derived equality only
/// compares the live region in practice.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: [[f64; MAX_DIM]; MAX_DIM],
}

impl Matrix {
    /// `rows × cols` zero matrix
    pub fn zeros(rows: usize, cols: usize) -> FusionResult<Self> {
        check_capacity(rows)?;
        check_capacity(cols)?;
        Ok(Self {
            rows,
            cols,
            data: [[0.0; MAX_DIM]; MAX_DIM],
        })
    }

    /// `n × n` identity
    pub fn identity(n: usize) -> FusionResult<Self> {
        let mut m = Self::zeros(n, n)?;
        for i in 0..n {
            m.data[i][i] = 1.0;
        }
        Ok(m)
    }

    /// Build from row slices, every row must have the same length
    pub fn from_rows(rows: &[&[f64]]) -> FusionResult<Self> {
        let cols = rows.first().map_or(0, |r| r.len());
        let mut m = Self::zeros(rows.len(), cols)?;
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(FusionError::DimensionMismatch {
                    expected: (1, cols),
                    found: (1, row.len()),
                });
            }
            m.data[i][..cols].copy_from_slice(row);
        }
        Ok(m)
    }

    /// Square diagonal matrix
    pub fn from_diagonal(diagonal: &[f64]) -> FusionResult<Self> {
        let mut m = Self::zeros(diagonal.len(), diagonal.len())?;
        for (i, &d) in diagonal.iter().enumerate() {
            m.data[i][i] = d;
        }
        Ok(m)
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// True for square matrices
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Entry at (row, col), `None` outside the shape
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        (row < self.rows && col < self.cols).then(|| self.data[row][col])
    }

    /// Row as a slice
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row][..self.cols]
    }

    /// Main diagonal
    pub fn diagonal(&self) -> Vector {
        let n = self.rows.min(self.cols);
        let mut data = Vec::new();
        for i in 0..n {
            // n <= MAX_DIM
            let _ = data.push(self.data[i][i]);
        }
        Vector { data }
    }

    /// True when every entry is finite
    pub fn is_finite(&self) -> bool {
        (0..self.rows).all(|i| self.row(i).iter().all(|v| v.is_finite()))
    }

    /// Largest absolute entry
    pub fn max_abs(&self) -> f64 {
        let mut max = 0.0f64;
        for i in 0..self.rows {
            for &v in self.row(i) {
                max = max.max(libm::fabs(v));
            }
        }
        max
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        assert!(
            row < self.rows && col < self.cols,
            "index ({row}, {col}) out of bounds for {}x{} matrix",
            self.rows,
            self.cols
        );
        &self.data[row][col]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut f64 {
        assert!(
            row < self.rows && col < self.cols,
            "index ({row}, {col}) out of bounds for {}x{} matrix",
            self.rows,
            self.cols
        );
        &mut self.data[row][col]
    }
}

/// Matrix multiplication: C = A × B
///
/// Dimensions: A[R×K] × B[K×C] = C[R×C]
pub fn multiply(a: &Matrix, b: &Matrix) -> FusionResult<Matrix> {
    if a.cols != b.rows {
        return Err(FusionError::DimensionMismatch {
            expected: (a.cols, b.cols),
            found: b.shape(),
        });
    }
    let mut c = Matrix::zeros(a.rows, b.cols)?;
    for i in 0..a.rows {
        for j in 0..b.cols {
            let mut sum = 0.0;
            for k in 0..a.cols {
                sum += a.data[i][k] * b.data[k][j];
            }
            c.data[i][j] = sum;
        }
    }
    Ok(c)
}

/// Matrix transpose: B = Aᵀ
pub fn transpose(a: &Matrix) -> Matrix {
    let mut t = Matrix {
        rows: a.cols,
        cols: a.rows,
        data: [[0.0; MAX_DIM]; MAX_DIM],
    };
    for i in 0..a.rows {
        for j in 0..a.cols {
            t.data[j][i] = a.data[i][j];
        }
    }
    t
}

fn elementwise(a: &Matrix, b: &Matrix, op: impl Fn(f64, f64) -> f64) -> FusionResult<Matrix> {
    if a.shape() != b.shape() {
        return Err(FusionError::DimensionMismatch {
            expected: a.shape(),
            found: b.shape(),
        });
    }
    let mut c = *a;
    for i in 0..a.rows {
        for j in 0..a.cols {
            c.data[i][j] = op(a.data[i][j], b.data[i][j]);
        }
    }
    Ok(c)
}

/// Matrix addition: C = A + B
pub fn add(a: &Matrix, b: &Matrix) -> FusionResult<Matrix> {
    elementwise(a, b, |x, y| x + y)
}

/// Matrix subtraction: C = A − B
pub fn subtract(a: &Matrix, b: &Matrix) -> FusionResult<Matrix> {
    elementwise(a, b, |x, y| x - y)
}

/// Matrix-vector multiplication: y = A × x
pub fn matvec(a: &Matrix, x: &Vector) -> FusionResult<Vector> {
    if a.cols != x.len() {
        return Err(FusionError::length(a.cols, x.len()));
    }
    let mut y = Vector::zeros(a.rows)?;
    for (i, out) in y.iter_mut().enumerate() {
        *out = a.row(i).iter().zip(x.iter()).map(|(m, v)| m * v).sum();
    }
    Ok(y)
}

/// Make matrix symmetric: A = (A + Aᵀ) / 2
///
/// Keeps covariance matrices from drifting apart through round-off
pub fn make_symmetric(m: &mut Matrix) {
    let n = m.rows.min(m.cols);
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = (m.data[i][j] + m.data[j][i]) * 0.5;
            m.data[i][j] = avg;
            m.data[j][i] = avg;
        }
    }
}

/// Largest |A[i][j] − A[j][i]| over the square part of the matrix
pub fn max_asymmetry(m: &Matrix) -> f64 {
    worst_asymmetry(m).1
}

/// Row `i` (with `i < j`) of the most asymmetric pair and its magnitude
///
/// Returns `(0, 0.0)` for a symmetric matrix.
pub fn worst_asymmetry(m: &Matrix) -> (usize, f64) {
    let n = m.rows.min(m.cols);
    let mut worst = (0, 0.0f64);
    for i in 0..n {
        for j in (i + 1)..n {
            let gap = libm::fabs(m.data[i][j] - m.data[j][i]);
            if gap > worst.1 {
                worst = (i, gap);
            }
        }
    }
    worst
}

/// Matrix inversion using Gauss-Jordan elimination with partial pivoting
///
/// `epsilon` scales with the largest absolute entry of `a`, floored at one
/// so tiny matrices are still judged against `epsilon` itself. Fails with
/// `SingularMatrix` when a pivot falls below that threshold and with
/// `InvalidValue` when `a` holds NaN or infinity.
pub fn invert(a: &Matrix, epsilon: f64) -> FusionResult<Matrix> {
    if !a.is_square() {
        return Err(FusionError::DimensionMismatch {
            expected: (a.rows, a.rows),
            found: a.shape(),
        });
    }
    if !a.is_finite() {
        return Err(FusionError::InvalidValue);
    }

    let n = a.rows;
    let scale = a.max_abs();
    if scale == 0.0 {
        return Err(FusionError::SingularMatrix);
    }
    let threshold = epsilon * scale.max(1.0);

    let mut work = a.data;
    let mut inv = Matrix::identity(n)?;

    for k in 0..n {
        // Find pivot
        let mut pivot_row = k;
        let mut pivot_abs = libm::fabs(work[k][k]);
        for (i, row) in work.iter().enumerate().take(n).skip(k + 1) {
            let candidate = libm::fabs(row[k]);
            if candidate > pivot_abs {
                pivot_abs = candidate;
                pivot_row = i;
            }
        }

        if pivot_abs < threshold {
            return Err(FusionError::SingularMatrix);
        }

        if pivot_row != k {
            work.swap(k, pivot_row);
            inv.data.swap(k, pivot_row);
        }

        // Scale pivot row
        let pivot = work[k][k];
        for j in 0..n {
            work[k][j] /= pivot;
            inv.data[k][j] /= pivot;
        }

        // Eliminate column
        for i in 0..n {
            if i == k {
                continue;
            }
            let factor = work[i][k];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                work[i][j] -= factor * work[k][j];
                inv.data[i][j] -= factor * inv.data[k][j];
            }
        }
    }

    Ok(inv)
}
