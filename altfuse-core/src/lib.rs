//! Altitude estimation core for AltFuse
//!
//! Fuses a sonar range reading and a barometric pressure reading into a
//! single altitude-above-ground estimate with quantified uncertainty, using
//! an Extended Kalman Filter.
//!
//! Key constraints:
//! - No heap allocation (fixed inline matrix storage)
//! - Constant cost per cycle, no I/O, no blocking
//! - Every failure is a structured error; nothing is silently patched
//!
//! ```rust
//! use altfuse_core::fusion::altitude::{AglModel, baro, sonar};
//!
//! let mut ekf = AglModel::default().filter(0.0, 10.0, 0.2).unwrap();
//!
//! for _ in 0..50 {
//!     ekf.step(&[baro(1000.0), sonar(1000.0)]).unwrap();
//! }
//!
//! assert!((ekf.state()[0] - 1000.0).abs() < 10.0);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

#[macro_use]
mod macros;

pub mod errors;
pub mod fusion;
pub mod telemetry;

// Public API
pub use errors::{FusionError, FusionResult};
pub use fusion::{
    CovarianceUpdate, EkfConfig, EstimationModel, ExtendedKalmanFilter, Matrix, Vector, MAX_DIM,
};
pub use telemetry::{FusionTask, Snapshot};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
