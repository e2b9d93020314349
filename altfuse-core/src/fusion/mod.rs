//! Sensor Fusion for Altitude Estimation
//!
//! ## Overview
//!
//! Two independent, noisy sensors observe the same hidden quantity through
//! different nonlinear curves. The Extended Kalman Filter blends them in
//! proportion to their uncertainty and keeps a covariance telling the caller
//! how much to trust the result.
//!
//! ```text
//! Barometer ──┐
//!             ├─→ EKF (predict / update) ─→ altitude estimate
//! Sonar ──────┘            ↓
//!                     covariance P
//! ```
//!
//! ## Architecture
//!
//! 1. **Matrix Operations** ([`matrix`]): fixed-capacity linear algebra with
//!    runtime shape checks
//! 2. **Model Contract** ([`model`]): the four functions a model supplies
//! 3. **Filter** ([`ekf`]): the predict/update recursion
//! 4. **Altitude Model** ([`altitude`]): the sonar/barometer calibration
//!
//! ## Memory Model
//!
//! All storage is inline and bounded by [`MAX_DIM`]:
//! ```text
//! Matrix:  8 × 8 × 8 bytes + shape  ≈ 528 bytes
//! Vector:  8 × 8 bytes + length     ≈ 72 bytes
//! ```
//! A filter holds five matrices and two vectors, well under 4 KB.

pub mod altitude;
pub mod ekf;
pub mod matrix;
pub mod model;

// Re-export main types
pub use ekf::{CovarianceUpdate, EkfConfig, ExtendedKalmanFilter};
pub use matrix::{Matrix, Vector, MAX_DIM};
pub use model::{check_jacobians, numerical_jacobian, EstimationModel, JacobianCheck};
