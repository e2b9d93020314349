//! Error Types for the Estimation Core
//!
//! ## Design
//!
//! Errors follow the same rules as the rest of the crate:
//!
//! 1. **Small Size**: every variant is a handful of machine words so it can be
//!    returned from the per-cycle hot path and stored in telemetry.
//! 2. **No Heap Allocation**: no `String` payloads, only plain numbers.
//! 3. **Copy Semantics**: errors are `Copy` and cheap to hand back to the
//!    driving loop.
//!
//! ## Error Categories
//!
//! ### Configuration / programming errors
//! - `DimensionMismatch`: a matrix or vector shape disagrees with the
//!   declared state (`n`) or measurement (`m`) dimension.
//! - `CapacityExceeded`: a shape larger than the fixed inline storage.
//! - `InvalidValue`: NaN or infinity handed in by the caller.
//!
//! ### Numerical failures
//! - `SingularMatrix`: an inversion (usually the innovation covariance `S`)
//!   has no stable solution within tolerance.
//! - `InvalidCovariance`: `P` lost positive semi-definiteness or symmetry.
//!   The filter only reports this as a diagnostic.
//!
//! ## Handling Strategy
//!
//! The filter never retries and never substitutes defaults. A typical driver:
//!
//! ```rust
//! use altfuse_core::{FusionError, fusion::altitude::{AglModel, baro, sonar}};
//!
//! let mut ekf = AglModel::default().filter(0.0, 10.0, 0.2).unwrap();
//! let reading = [baro(1000.0), sonar(1000.0)];
//!
//! match ekf.step(&reading) {
//!     Ok(_state) => {
//!         // publish estimate
//!     }
//!     Err(FusionError::SingularMatrix) => {
//!         // keep the predicted-only state, retune R next cycle
//!     }
//!     Err(FusionError::DimensionMismatch { .. }) => {
//!         // wiring bug, abort
//!     }
//!     Err(_) => {}
//! }
//! ```

use thiserror_no_std::Error;

/// Result type for estimation operations
pub type FusionResult<T> = Result<T, FusionError>;

/// Errors raised by the linear algebra layer and the filter
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum FusionError {
    /// Matrix or vector shape disagrees with what the operation requires
    #[error("Dimension mismatch: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        /// Required shape as (rows, cols); vectors use (len, 1)
        expected: (usize, usize),
        /// Shape that was actually supplied
        found: (usize, usize),
    },

    /// Matrix cannot be inverted within the configured tolerance
    #[error("Matrix is singular within tolerance")]
    SingularMatrix,

    /// Covariance lost positive semi-definiteness or symmetry
    #[error("Invalid covariance at index {index}: {value}")]
    InvalidCovariance {
        /// Offending diagonal index (or row of the asymmetric pair)
        index: usize,
        /// Offending diagonal value, or the asymmetry magnitude
        value: f64,
    },

    /// Requested dimension exceeds the fixed storage capacity
    #[error("Dimension {requested} exceeds capacity {max}")]
    CapacityExceeded {
        /// Requested rows, columns or length
        requested: usize,
        /// Maximum supported dimension
        max: usize,
    },

    /// Input contains NaN or infinity
    #[error("Invalid value: not a finite number")]
    InvalidValue,
}

impl FusionError {
    /// Shorthand for a vector length mismatch
    pub(crate) fn length(expected: usize, found: usize) -> Self {
        Self::DimensionMismatch {
            expected: (expected, 1),
            found: (found, 1),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for FusionError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::DimensionMismatch { expected, found } => defmt::write!(
                fmt,
                "Dimension mismatch: expected {}x{}, found {}x{}",
                expected.0,
                expected.1,
                found.0,
                found.1
            ),
            Self::SingularMatrix => defmt::write!(fmt, "Singular matrix"),
            Self::InvalidCovariance { index, value } => {
                defmt::write!(fmt, "Invalid covariance [{}]: {}", index, value)
            }
            Self::CapacityExceeded { requested, max } => {
                defmt::write!(fmt, "Dimension {} exceeds {}", requested, max)
            }
            Self::InvalidValue => defmt::write!(fmt, "Invalid value"),
        }
    }
}
