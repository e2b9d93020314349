//! Estimation model contract
//!
//! An [`EstimationModel`] supplies the four functions the EKF linearizes
//! every cycle:
//!
//! ```text
//! transition(x)           x' = f(x)
//! transition_jacobian(x)  F  = ∂f/∂x   (n × n)
//! measurement(x)          ẑ  = h(x)
//! measurement_jacobian(x) H  = ∂h/∂x   (m × n)
//! ```
//!
//! The filter depends only on this trait. Keeping each Jacobian consistent
//! with its function is the implementer's job; [`check_jacobians`] compares
//! them against central finite differences for tests and bring-up.

use crate::errors::{FusionError, FusionResult};
use crate::fusion::matrix::{Matrix, Vector};

/// Nonlinear process and measurement model for the EKF
///
/// ## Implementation Guidelines
///
/// 1. Return vectors and matrices with the declared shapes; the filter
///    rejects anything else with `DimensionMismatch`.
/// 2. Jacobians are recomputed each cycle, so they must be evaluated at the
///    `x` passed in, never cached.
/// 3. Never panic, return errors instead.
pub trait EstimationModel {
    /// State dimension `n`
    fn state_dim(&self) -> usize;

    /// Measurement dimension `m`
    fn measurement_dim(&self) -> usize;

    /// Predict the next state from the current one
    fn transition(&self, x: &Vector) -> FusionResult<Vector>;

    /// `n × n` Jacobian of [`transition`](Self::transition) at `x`
    fn transition_jacobian(&self, x: &Vector) -> FusionResult<Matrix>;

    /// Map a state to the `m` predicted sensor readings
    fn measurement(&self, x: &Vector) -> FusionResult<Vector>;

    /// `m × n` Jacobian of [`measurement`](Self::measurement) at `x`
    fn measurement_jacobian(&self, x: &Vector) -> FusionResult<Matrix>;
}

impl<T: EstimationModel + ?Sized> EstimationModel for &T {
    fn state_dim(&self) -> usize {
        (**self).state_dim()
    }

    fn measurement_dim(&self) -> usize {
        (**self).measurement_dim()
    }

    fn transition(&self, x: &Vector) -> FusionResult<Vector> {
        (**self).transition(x)
    }

    fn transition_jacobian(&self, x: &Vector) -> FusionResult<Matrix> {
        (**self).transition_jacobian(x)
    }

    fn measurement(&self, x: &Vector) -> FusionResult<Vector> {
        (**self).measurement(x)
    }

    fn measurement_jacobian(&self, x: &Vector) -> FusionResult<Matrix> {
        (**self).measurement_jacobian(x)
    }
}

/// Jacobian of `f` at `x` by central finite differences
///
/// Column `j` is `(f(x + step·eⱼ) − f(x − step·eⱼ)) / (2·step)`. `step`
/// must be finite and non-zero.
pub fn numerical_jacobian<F>(f: F, x: &Vector, step: f64) -> FusionResult<Matrix>
where
    F: Fn(&Vector) -> FusionResult<Vector>,
{
    if !step.is_finite() || step == 0.0 || !x.is_finite() {
        return Err(FusionError::InvalidValue);
    }
    let rows = f(x)?.len();
    let mut jacobian = Matrix::zeros(rows, x.len())?;

    for j in 0..x.len() {
        let mut plus = x.clone();
        let mut minus = x.clone();
        plus[j] += step;
        minus[j] -= step;

        let f_plus = f(&plus)?;
        let f_minus = f(&minus)?;
        if f_plus.len() != rows || f_minus.len() != rows {
            return Err(FusionError::length(rows, f_plus.len().max(f_minus.len())));
        }

        for i in 0..rows {
            jacobian[(i, j)] = (f_plus[i] - f_minus[i]) / (2.0 * step);
        }
    }

    Ok(jacobian)
}

/// Outcome of comparing analytic Jacobians with finite differences
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JacobianCheck {
    /// Worst relative error of `F` against the numerical derivative
    pub transition_error: f64,
    /// Worst relative error of `H` against the numerical derivative
    pub measurement_error: f64,
    /// Tolerance the errors were compared with
    pub tolerance: f64,
}

impl JacobianCheck {
    /// Both Jacobians within tolerance
    pub fn passed(&self) -> bool {
        self.transition_error <= self.tolerance && self.measurement_error <= self.tolerance
    }
}

/// Worst relative error, with a small floor so exact zeros compare sanely
fn relative_error(analytic: &Matrix, numeric: &Matrix) -> FusionResult<f64> {
    if analytic.shape() != numeric.shape() {
        return Err(FusionError::DimensionMismatch {
            expected: numeric.shape(),
            found: analytic.shape(),
        });
    }
    let mut worst = 0.0f64;
    for i in 0..analytic.rows() {
        for j in 0..analytic.cols() {
            let a = analytic[(i, j)];
            let n = numeric[(i, j)];
            let scale = libm::fabs(n).max(libm::fabs(a)).max(1e-9);
            worst = worst.max(libm::fabs(a - n) / scale);
        }
    }
    Ok(worst)
}

/// Compare both analytic Jacobians of `model` at `x` with finite differences
///
/// The step is `1e-4 × max(1, max|xⱼ|)`, one scale for the whole state.
/// `x` must have the model's state dimension.
pub fn check_jacobians<Mdl: EstimationModel + ?Sized>(
    model: &Mdl,
    x: &Vector,
    tolerance: f64,
) -> FusionResult<JacobianCheck> {
    if x.len() != model.state_dim() {
        return Err(FusionError::length(model.state_dim(), x.len()));
    }
    if !x.is_finite() {
        return Err(FusionError::InvalidValue);
    }
    let magnitude = x.iter().fold(1.0f64, |acc, v| acc.max(libm::fabs(*v)));
    let step = 1e-4 * magnitude;

    let numeric_f = numerical_jacobian(|s| model.transition(s), x, step)?;
    let numeric_h = numerical_jacobian(|s| model.measurement(s), x, step)?;

    Ok(JacobianCheck {
        transition_error: relative_error(&model.transition_jacobian(x)?, &numeric_f)?,
        measurement_error: relative_error(&model.measurement_jacobian(x)?, &numeric_h)?,
        tolerance,
    })
}
