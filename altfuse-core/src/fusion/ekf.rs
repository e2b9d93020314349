//! Extended Kalman Filter
//!
//! ## Overview
//!
//! The filter owns the state estimate `x` and its covariance `P` and advances
//! them with a caller-supplied [`EstimationModel`]. Nonlinear functions move
//! the state; their Jacobians, re-evaluated every cycle, move the covariance.
//!
//! ### 1. Prediction Step
//! ```text
//! F  = ∂f/∂x evaluated at x (before transition)
//! x ← f(x)
//! P ← F·P·Fᵀ + Q
//! ```
//!
//! ### 2. Update Step
//! ```text
//! ẑ  = h(x)
//! H  = ∂h/∂x evaluated at x
//! y  = z − ẑ                    innovation
//! S  = H·P·Hᵀ + R               innovation covariance
//! K  = P·Hᵀ·S⁻¹                 Kalman gain
//! x ← x + K·y
//! P ← (I − K·H)·P·(I − K·H)ᵀ + K·R·Kᵀ    (Joseph form, default)
//! P ← (I − K·H)·P                         (CovarianceUpdate::Simple)
//! ```
//!
//! ## Numerical Stability
//! - Joseph form covariance update by default
//! - Symmetric covariance enforcement after each propagation
//! - Gauss-Jordan inversion of `S` with partial pivoting and a scale-relative
//!   singularity threshold
//! - Covariance diagnostic after each update (warning, not failure)
//!
//! ## Transactions
//!
//! Every operation computes into locals and commits `x` and `P` only once all
//! steps succeeded. A failed `predict` or `update` leaves the filter exactly
//! as it was. `step` commits the prediction before attempting the update, so a
//! failed correction leaves the predicted-only estimate in place.
//!
//! ## Usage Example
//!
//! ```rust
//! use altfuse_core::fusion::{ExtendedKalmanFilter, Matrix, Vector};
//! use altfuse_core::fusion::altitude::{AglModel, baro, sonar};
//!
//! let mut ekf = ExtendedKalmanFilter::new(
//!     AglModel::default(),
//!     Vector::from_slice(&[0.0]).unwrap(),
//!     Matrix::from_diagonal(&[1e6]).unwrap(),
//!     Matrix::from_diagonal(&[1e-3]).unwrap(),
//!     Matrix::from_diagonal(&[100.0, 0.04]).unwrap(),
//! )
//! .unwrap();
//!
//! let x = ekf.step(&[baro(500.0), sonar(500.0)]).unwrap();
//! assert!((x[0] - 500.0).abs() < 5.0);
//! ```

use crate::errors::{FusionError, FusionResult};
use crate::fusion::matrix::{
    add, invert, make_symmetric, matvec, multiply, subtract, transpose, worst_asymmetry, Matrix,
    Vector,
};
use crate::fusion::model::EstimationModel;
use crate::telemetry::Snapshot;

/// Covariance correction formula used by [`ExtendedKalmanFilter::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CovarianceUpdate {
    /// `P ← (I − K·H)·P·(I − K·H)ᵀ + K·R·Kᵀ`, keeps `P` symmetric and PSD
    #[default]
    Joseph,
    /// `P ← (I − K·H)·P`, cheaper, drifts under round-off
    Simple,
}

/// Filter tuning that is not part of the model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EkfConfig {
    /// Pivot threshold for inverting `S`, relative to its largest entry
    pub singular_epsilon: f64,
    /// Covariance correction formula
    pub covariance_update: CovarianceUpdate,
    /// Tolerance for the covariance diagnostic
    pub covariance_tolerance: f64,
}

impl Default for EkfConfig {
    fn default() -> Self {
        Self {
            singular_epsilon: 1e-12,
            covariance_update: CovarianceUpdate::Joseph,
            covariance_tolerance: 1e-9,
        }
    }
}

impl EkfConfig {
    /// Set the singularity threshold
    pub fn with_singular_epsilon(mut self, epsilon: f64) -> Self {
        self.singular_epsilon = epsilon;
        self
    }

    /// Select the covariance correction formula
    pub fn with_covariance_update(mut self, form: CovarianceUpdate) -> Self {
        self.covariance_update = form;
        self
    }

    /// Set the covariance diagnostic tolerance
    pub fn with_covariance_tolerance(mut self, tolerance: f64) -> Self {
        self.covariance_tolerance = tolerance;
        self
    }
}

/// Extended Kalman Filter over a pluggable [`EstimationModel`]
///
/// The filter is the sole owner of `x` and `P`. Readers get shared borrows or
/// an owned [`Snapshot`]; nothing outside can mutate the estimate.
///
/// Calls on one instance must be serialized by the owner. There is no
/// internal locking and intermediate state is never observable.
pub struct ExtendedKalmanFilter<Mdl: EstimationModel> {
    model: Mdl,
    /// Current state estimate
    state: Vector,
    /// Estimation error covariance
    covariance: Matrix,
    /// Process noise covariance (Q)
    process_noise: Matrix,
    /// Measurement noise covariance (R)
    measurement_noise: Matrix,
    initial_state: Vector,
    initial_covariance: Matrix,
    config: EkfConfig,
    update_count: u32,
    covariance_warnings: u32,
}

fn expect_shape(m: &Matrix, rows: usize, cols: usize) -> FusionResult<()> {
    if m.shape() != (rows, cols) {
        return Err(FusionError::DimensionMismatch {
            expected: (rows, cols),
            found: m.shape(),
        });
    }
    Ok(())
}

fn expect_len(v: &Vector, len: usize) -> FusionResult<()> {
    if v.len() != len {
        return Err(FusionError::length(len, v.len()));
    }
    Ok(())
}

impl<Mdl: EstimationModel> ExtendedKalmanFilter<Mdl> {
    /// Create a filter, checking every shape against the model
    ///
    /// `initial_state` has length `n`, `initial_covariance` and
    /// `process_noise` are `n × n`, `measurement_noise` is `m × m`.
    pub fn new(
        model: Mdl,
        initial_state: Vector,
        initial_covariance: Matrix,
        process_noise: Matrix,
        measurement_noise: Matrix,
    ) -> FusionResult<Self> {
        let n = model.state_dim();
        let m = model.measurement_dim();

        expect_len(&initial_state, n)?;
        expect_shape(&initial_covariance, n, n)?;
        expect_shape(&process_noise, n, n)?;
        expect_shape(&measurement_noise, m, m)?;

        if !initial_state.is_finite()
            || !initial_covariance.is_finite()
            || !process_noise.is_finite()
            || !measurement_noise.is_finite()
        {
            return Err(FusionError::InvalidValue);
        }

        Ok(Self {
            model,
            state: initial_state.clone(),
            covariance: initial_covariance,
            process_noise,
            measurement_noise,
            initial_state,
            initial_covariance,
            config: EkfConfig::default(),
            update_count: 0,
            covariance_warnings: 0,
        })
    }

    /// Replace the tuning configuration
    pub fn with_config(mut self, config: EkfConfig) -> Self {
        self.config = config;
        self
    }

    /// Prediction step: propagate `x` through `f` and `P` through `F`
    pub fn predict(&mut self) -> FusionResult<()> {
        let n = self.model.state_dim();

        // Jacobian at the pre-transition state
        let f = self.model.transition_jacobian(&self.state)?;
        expect_shape(&f, n, n)?;

        let predicted_state = self.model.transition(&self.state)?;
        expect_len(&predicted_state, n)?;

        // P = F·P·Fᵀ + Q
        let fp = multiply(&f, &self.covariance)?;
        let fpft = multiply(&fp, &transpose(&f))?;
        let mut predicted_cov = add(&fpft, &self.process_noise)?;
        make_symmetric(&mut predicted_cov);

        self.state = predicted_state;
        self.covariance = predicted_cov;
        Ok(())
    }

    /// Update step with the configured measurement noise
    ///
    /// Returns the corrected state. On error nothing is mutated.
    pub fn update(&mut self, measurement: &[f64]) -> FusionResult<Vector> {
        let r = self.measurement_noise;
        self.update_with_noise(measurement, &r)
    }

    /// Update step with a measurement noise `R` for this call only
    pub fn update_with_noise(&mut self, measurement: &[f64], noise: &Matrix) -> FusionResult<Vector> {
        let (state, covariance) = self.correction(&self.model, measurement, noise)?;
        Ok(self.commit(state, covariance))
    }

    /// Update step through a different measurement model for this cycle
    ///
    /// Used when a sensor channel is missing: pass a reduced-dimension model
    /// (same state, fewer channels) together with its own `R`. The model must
    /// share the filter's state dimension.
    pub fn update_with_model<O>(
        &mut self,
        model: &O,
        measurement: &[f64],
        noise: &Matrix,
    ) -> FusionResult<Vector>
    where
        O: EstimationModel + ?Sized,
    {
        let n = self.model.state_dim();
        if model.state_dim() != n {
            return Err(FusionError::length(n, model.state_dim()));
        }
        let (state, covariance) = self.correction(model, measurement, noise)?;
        Ok(self.commit(state, covariance))
    }

    /// Corrected (x, P) for one measurement, without touching the filter
    fn correction<O>(
        &self,
        model: &O,
        measurement: &[f64],
        noise: &Matrix,
    ) -> FusionResult<(Vector, Matrix)>
    where
        O: EstimationModel + ?Sized,
    {
        let n = self.model.state_dim();
        let m = model.measurement_dim();

        if measurement.len() != m {
            return Err(FusionError::length(m, measurement.len()));
        }
        expect_shape(noise, m, m)?;
        if measurement.iter().any(|v| !v.is_finite()) || !noise.is_finite() {
            return Err(FusionError::InvalidValue);
        }
        let z = Vector::from_slice(measurement)?;

        let predicted = model.measurement(&self.state)?;
        expect_len(&predicted, m)?;
        let h = model.measurement_jacobian(&self.state)?;
        expect_shape(&h, m, n)?;

        // Innovation: y = z − h(x)
        let innovation = z.checked_sub(&predicted)?;

        // S = H·P·Hᵀ + R
        let ht = transpose(&h);
        let pht = multiply(&self.covariance, &ht)?;
        let s = add(&multiply(&h, &pht)?, noise)?;

        // K = P·Hᵀ·S⁻¹
        let s_inv = invert(&s, self.config.singular_epsilon).map_err(|e| {
            if e == FusionError::SingularMatrix {
                log_debug!("innovation covariance singular, update rejected");
            }
            e
        })?;
        let gain = multiply(&pht, &s_inv)?;

        // x = x + K·y
        let correction = matvec(&gain, &innovation)?;
        let updated_state = self.state.checked_add(&correction)?;

        let updated_cov = self.corrected_covariance(&gain, &h, noise)?;

        if !updated_state.is_finite() || !updated_cov.is_finite() {
            return Err(FusionError::InvalidValue);
        }
        Ok((updated_state, updated_cov))
    }

    fn commit(&mut self, state: Vector, covariance: Matrix) -> Vector {
        self.state = state;
        self.covariance = covariance;
        self.update_count = self.update_count.saturating_add(1);

        if let Err(FusionError::InvalidCovariance { index, value }) = self.check_covariance() {
            self.covariance_warnings = self.covariance_warnings.saturating_add(1);
            log_warn!(
                "covariance diagnostic failed after update {}: index {} value {}",
                self.update_count,
                index,
                value
            );
        }

        self.state.clone()
    }

    /// `P` after the correction, in the configured form
    fn corrected_covariance(&self, gain: &Matrix, h: &Matrix, noise: &Matrix) -> FusionResult<Matrix> {
        let n = self.model.state_dim();

        // I − K·H
        let kh = multiply(gain, h)?;
        let i_kh = subtract(&Matrix::identity(n)?, &kh)?;
        let i_kh_p = multiply(&i_kh, &self.covariance)?;

        let mut updated = match self.config.covariance_update {
            CovarianceUpdate::Simple => i_kh_p,
            CovarianceUpdate::Joseph => {
                let left = multiply(&i_kh_p, &transpose(&i_kh))?;
                let krkt = multiply(&multiply(gain, noise)?, &transpose(gain))?;
                add(&left, &krkt)?
            }
        };
        make_symmetric(&mut updated);
        Ok(updated)
    }

    /// Predict then update, as one cycle
    ///
    /// The prediction is committed before the update runs. If the update
    /// fails the predicted state remains and the error is returned.
    pub fn step(&mut self, measurement: &[f64]) -> FusionResult<Vector> {
        let m = self.model.measurement_dim();
        if measurement.len() != m {
            return Err(FusionError::length(m, measurement.len()));
        }
        self.predict()?;
        self.update(measurement)
    }

    /// Check that `P` has a finite, non-negative diagonal and is symmetric
    ///
    /// Both checks use `covariance_tolerance`. The first offending diagonal
    /// entry is reported; an asymmetry is reported with the row of the worst
    /// pair and its magnitude.
    pub fn check_covariance(&self) -> FusionResult<()> {
        let tol = self.config.covariance_tolerance;
        for (index, &value) in self.covariance.diagonal().iter().enumerate() {
            if !value.is_finite() || value < -tol {
                return Err(FusionError::InvalidCovariance { index, value });
            }
        }
        let (row, asymmetry) = worst_asymmetry(&self.covariance);
        if asymmetry > tol * self.covariance.max_abs().max(1.0) {
            return Err(FusionError::InvalidCovariance {
                index: row,
                value: asymmetry,
            });
        }
        Ok(())
    }

    /// Current state estimate
    pub fn state(&self) -> &Vector {
        &self.state
    }

    /// Current covariance
    pub fn covariance(&self) -> &Matrix {
        &self.covariance
    }

    /// Diagonal of the covariance (variances)
    pub fn uncertainty(&self) -> Vector {
        self.covariance.diagonal()
    }

    /// Owned copy of the estimate for telemetry consumers
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state.clone(),
            covariance: self.covariance,
            update_count: self.update_count,
        }
    }

    /// Process noise covariance (Q)
    pub fn process_noise(&self) -> &Matrix {
        &self.process_noise
    }

    /// Measurement noise covariance (R)
    pub fn measurement_noise(&self) -> &Matrix {
        &self.measurement_noise
    }

    /// Replace Q, must be `n × n`
    pub fn set_process_noise(&mut self, q: Matrix) -> FusionResult<()> {
        let n = self.model.state_dim();
        expect_shape(&q, n, n)?;
        if !q.is_finite() {
            return Err(FusionError::InvalidValue);
        }
        self.process_noise = q;
        Ok(())
    }

    /// Replace R, must be `m × m`
    pub fn set_measurement_noise(&mut self, r: Matrix) -> FusionResult<()> {
        let m = self.model.measurement_dim();
        expect_shape(&r, m, m)?;
        if !r.is_finite() {
            return Err(FusionError::InvalidValue);
        }
        self.measurement_noise = r;
        Ok(())
    }

    /// Tuning configuration
    pub fn config(&self) -> &EkfConfig {
        &self.config
    }

    /// The model driving this filter
    pub fn model(&self) -> &Mdl {
        &self.model
    }

    /// Number of successful updates since construction or reset
    pub fn update_count(&self) -> u32 {
        self.update_count
    }

    /// Number of updates after which the covariance diagnostic failed
    pub fn covariance_warnings(&self) -> u32 {
        self.covariance_warnings
    }

    /// Restore the initial state and covariance
    pub fn reset(&mut self) {
        self.state = self.initial_state.clone();
        self.covariance = self.initial_covariance;
        self.update_count = 0;
        self.covariance_warnings = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scalar random walk observed directly: f(x) = x, h(x) = x
    struct Direct;

    impl EstimationModel for Direct {
        fn state_dim(&self) -> usize {
            1
        }

        fn measurement_dim(&self) -> usize {
            1
        }

        fn transition(&self, x: &Vector) -> FusionResult<Vector> {
            Ok(x.clone())
        }

        fn transition_jacobian(&self, _x: &Vector) -> FusionResult<Matrix> {
            Matrix::identity(1)
        }

        fn measurement(&self, x: &Vector) -> FusionResult<Vector> {
            Ok(x.clone())
        }

        fn measurement_jacobian(&self, _x: &Vector) -> FusionResult<Matrix> {
            Matrix::identity(1)
        }
    }

    /// Returns a Jacobian of the wrong shape
    struct Malformed;

    impl EstimationModel for Malformed {
        fn state_dim(&self) -> usize {
            1
        }

        fn measurement_dim(&self) -> usize {
            1
        }

        fn transition(&self, x: &Vector) -> FusionResult<Vector> {
            Ok(x.clone())
        }

        fn transition_jacobian(&self, _x: &Vector) -> FusionResult<Matrix> {
            Matrix::identity(2)
        }

        fn measurement(&self, x: &Vector) -> FusionResult<Vector> {
            Ok(x.clone())
        }

        fn measurement_jacobian(&self, _x: &Vector) -> FusionResult<Matrix> {
            Matrix::identity(1)
        }
    }

    /// Direct observation through a fixed gain: h(x) = g·x
    struct Faint(f64);

    impl EstimationModel for Faint {
        fn state_dim(&self) -> usize {
            1
        }

        fn measurement_dim(&self) -> usize {
            1
        }

        fn transition(&self, x: &Vector) -> FusionResult<Vector> {
            Ok(x.clone())
        }

        fn transition_jacobian(&self, _x: &Vector) -> FusionResult<Matrix> {
            Matrix::identity(1)
        }

        fn measurement(&self, x: &Vector) -> FusionResult<Vector> {
            Vector::from_slice(&[self.0 * x[0]])
        }

        fn measurement_jacobian(&self, _x: &Vector) -> FusionResult<Matrix> {
            Matrix::from_diagonal(&[self.0])
        }
    }

    /// Three independent random walks, first one observed
    struct Walks;

    impl EstimationModel for Walks {
        fn state_dim(&self) -> usize {
            3
        }

        fn measurement_dim(&self) -> usize {
            1
        }

        fn transition(&self, x: &Vector) -> FusionResult<Vector> {
            Ok(x.clone())
        }

        fn transition_jacobian(&self, _x: &Vector) -> FusionResult<Matrix> {
            Matrix::identity(3)
        }

        fn measurement(&self, x: &Vector) -> FusionResult<Vector> {
            Vector::from_slice(&[x[0]])
        }

        fn measurement_jacobian(&self, _x: &Vector) -> FusionResult<Matrix> {
            Matrix::from_rows(&[&[1.0, 0.0, 0.0]])
        }
    }

    fn faint_filter(gain: f64, config: EkfConfig) -> ExtendedKalmanFilter<Faint> {
        ExtendedKalmanFilter::new(
            Faint(gain),
            Vector::from_slice(&[5.0]).unwrap(),
            scalar(1.0),
            scalar(0.0),
            scalar(0.0),
        )
        .unwrap()
        .with_config(config)
    }

    fn scalar(v: f64) -> Matrix {
        Matrix::from_diagonal(&[v]).unwrap()
    }

    fn direct_filter() -> ExtendedKalmanFilter<Direct> {
        ExtendedKalmanFilter::new(
            Direct,
            Vector::from_slice(&[0.0]).unwrap(),
            scalar(1.0),
            scalar(0.01),
            scalar(0.1),
        )
        .unwrap()
    }

    #[test]
    fn scalar_update_matches_closed_form() {
        let mut kf = direct_filter();

        kf.predict().unwrap();
        assert!((kf.covariance()[(0, 0)] - 1.01).abs() < 1e-12);

        let x = kf.update(&[10.0]).unwrap();

        // K = P / (P + R)
        let k = 1.01 / (1.01 + 0.1);
        assert!((x[0] - 10.0 * k).abs() < 1e-12);
        assert!((kf.covariance()[(0, 0)] - (1.0 - k) * 1.01).abs() < 1e-12);
        assert_eq!(kf.update_count(), 1);
    }

    #[test]
    fn joseph_and_simple_agree_for_optimal_gain() {
        let mut joseph = direct_filter();
        let mut simple = direct_filter()
            .with_config(EkfConfig::default().with_covariance_update(CovarianceUpdate::Simple));

        for z in [1.0, 1.2, 0.9, 1.1] {
            joseph.step(&[z]).unwrap();
            simple.step(&[z]).unwrap();
        }

        assert!((joseph.state()[0] - simple.state()[0]).abs() < 1e-12);
        assert!((joseph.covariance()[(0, 0)] - simple.covariance()[(0, 0)]).abs() < 1e-12);
    }

    #[test]
    fn construction_rejects_mismatched_shapes() {
        let result = ExtendedKalmanFilter::new(
            Direct,
            Vector::from_slice(&[0.0, 0.0]).unwrap(),
            scalar(1.0),
            scalar(0.01),
            scalar(0.1),
        );
        assert_eq!(result.err(), Some(FusionError::length(1, 2)));

        let result = ExtendedKalmanFilter::new(
            Direct,
            Vector::from_slice(&[0.0]).unwrap(),
            scalar(1.0),
            scalar(0.01),
            Matrix::identity(2).unwrap(),
        );
        assert_eq!(
            result.err(),
            Some(FusionError::DimensionMismatch {
                expected: (1, 1),
                found: (2, 2),
            })
        );
    }

    #[test]
    fn construction_rejects_non_finite() {
        let result = ExtendedKalmanFilter::new(
            Direct,
            Vector::from_slice(&[f64::NAN]).unwrap(),
            scalar(1.0),
            scalar(0.01),
            scalar(0.1),
        );
        assert_eq!(result.err(), Some(FusionError::InvalidValue));
    }

    #[test]
    fn malformed_transition_jacobian_rejected_without_mutation() {
        let mut kf = ExtendedKalmanFilter::new(
            Malformed,
            Vector::from_slice(&[3.0]).unwrap(),
            scalar(1.0),
            scalar(0.01),
            scalar(0.1),
        )
        .unwrap();

        assert_eq!(
            kf.predict(),
            Err(FusionError::DimensionMismatch {
                expected: (1, 1),
                found: (2, 2),
            })
        );
        assert_eq!(kf.state().as_slice(), &[3.0]);
        assert_eq!(kf.covariance()[(0, 0)], 1.0);
    }

    #[test]
    fn per_call_noise_changes_weighting() {
        let mut trusting = direct_filter();
        let mut sceptical = direct_filter();

        let x_trust = trusting.update_with_noise(&[10.0], &scalar(0.001)).unwrap();
        let x_doubt = sceptical.update_with_noise(&[10.0], &scalar(100.0)).unwrap();

        assert!(x_trust[0] > 9.9);
        assert!(x_doubt[0] < 0.1);
        // Configured R untouched
        assert_eq!(trusting.measurement_noise()[(0, 0)], 0.1);
    }

    #[test]
    fn non_finite_measurement_rejected() {
        let mut kf = direct_filter();
        assert_eq!(kf.update(&[f64::INFINITY]), Err(FusionError::InvalidValue));
        assert_eq!(kf.update_count(), 0);
    }

    #[test]
    fn noise_reconfiguration_checks_shape() {
        let mut kf = direct_filter();

        assert!(kf.set_process_noise(Matrix::identity(2).unwrap()).is_err());
        assert!(kf.set_measurement_noise(Matrix::identity(3).unwrap()).is_err());

        kf.set_process_noise(scalar(0.5)).unwrap();
        kf.predict().unwrap();
        assert!((kf.covariance()[(0, 0)] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn reset_restores_initial_estimate() {
        let mut kf = direct_filter();
        for _ in 0..5 {
            kf.step(&[4.0]).unwrap();
        }
        assert_eq!(kf.update_count(), 5);

        kf.reset();

        assert_eq!(kf.state().as_slice(), &[0.0]);
        assert_eq!(kf.covariance()[(0, 0)], 1.0);
        assert_eq!(kf.update_count(), 0);
    }

    #[test]
    fn covariance_diagnostic_flags_negative_variance() {
        let kf = ExtendedKalmanFilter::new(
            Direct,
            Vector::from_slice(&[0.0]).unwrap(),
            scalar(-1.0),
            scalar(0.01),
            scalar(0.1),
        )
        .unwrap();

        assert_eq!(
            kf.check_covariance(),
            Err(FusionError::InvalidCovariance {
                index: 0,
                value: -1.0,
            })
        );
    }

    #[test]
    fn covariance_diagnostic_counts_warnings_without_failing() {
        // S = P + R = 0.5 is invertible, K = -1, posterior variance -1
        let mut kf = ExtendedKalmanFilter::new(
            Direct,
            Vector::from_slice(&[0.0]).unwrap(),
            scalar(-0.5),
            scalar(0.0),
            scalar(1.0),
        )
        .unwrap();

        assert!(kf.update(&[1.0]).is_ok());
        assert_eq!(kf.covariance_warnings(), 1);
        assert!(kf.check_covariance().is_err());
    }

    #[test]
    fn round_off_sized_innovation_covariance_rejected() {
        // S = g²·P + R = 1e-24
        let mut kf = faint_filter(1e-12, EkfConfig::default().with_singular_epsilon(1e-6));

        assert_eq!(kf.update(&[1.0]), Err(FusionError::SingularMatrix));
        assert_eq!(kf.state().as_slice(), &[5.0]);
        assert_eq!(kf.covariance()[(0, 0)], 1.0);
        assert_eq!(kf.update_count(), 0);

        let mut kf = faint_filter(1e-12, EkfConfig::default());
        assert_eq!(kf.update(&[1.0]), Err(FusionError::SingularMatrix));
    }

    #[test]
    fn singular_epsilon_decides_acceptance() {
        // S = 1e-8: above the default threshold, below a strict one
        let mut loose = faint_filter(1e-4, EkfConfig::default());
        let mut strict = faint_filter(1e-4, EkfConfig::default().with_singular_epsilon(1e-6));

        assert!(loose.update(&[1e-4]).is_ok());
        assert_eq!(loose.update_count(), 1);

        assert_eq!(strict.update(&[1e-4]), Err(FusionError::SingularMatrix));
        assert_eq!(strict.state().as_slice(), &[5.0]);
        assert_eq!(strict.config().singular_epsilon, 1e-6);
    }

    #[test]
    fn covariance_tolerance_is_configurable() {
        let build = |config: EkfConfig| {
            ExtendedKalmanFilter::new(
                Direct,
                Vector::from_slice(&[0.0]).unwrap(),
                scalar(-1e-6),
                scalar(0.01),
                scalar(0.1),
            )
            .unwrap()
            .with_config(config)
        };

        assert!(build(EkfConfig::default()).check_covariance().is_err());
        assert!(build(EkfConfig::default().with_covariance_tolerance(1e-3))
            .check_covariance()
            .is_ok());
    }

    #[test]
    fn asymmetry_reports_row_of_worst_pair() {
        let mut p = Matrix::identity(3).unwrap();
        p[(1, 2)] = 0.75;
        p[(2, 1)] = 0.25;
        let kf = ExtendedKalmanFilter::new(
            Walks,
            Vector::zeros(3).unwrap(),
            p,
            Matrix::identity(3).unwrap(),
            scalar(1.0),
        )
        .unwrap();

        assert_eq!(
            kf.check_covariance(),
            Err(FusionError::InvalidCovariance {
                index: 1,
                value: 0.5,
            })
        );
    }

    #[test]
    fn snapshot_is_detached_copy() {
        let mut kf = direct_filter();
        kf.step(&[2.0]).unwrap();

        let snap = kf.snapshot();
        kf.step(&[8.0]).unwrap();

        assert_eq!(snap.update_count, 1);
        assert_ne!(snap.state, *kf.state());
    }
}
