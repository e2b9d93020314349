//! Sonar / barometer altitude model
//!
//! Estimates altitude above ground level (AGL, centimetres) from two
//! empirically calibrated sensors:
//!
//! ```text
//! barometer:  p(x) = 101325 · (1 − 2.25577e-7 · x)^5.25588      Pa
//!             dp/dx = −0.120131 · (1 − 2.2577e-7 · x)^4.25588
//! sonar:      s(x) = 0.933 · x − 2.894                          cm
//!             ds/dx = 0.933
//! ```
//!
//! Altitude is assumed constant between cycles, so the transition is the
//! identity and `F = I`.
//!
//! ## Calibration constants
//!
//! The published barometer Jacobian uses a lapse constant of `2.2577e-7`
//! while the function uses `2.25577e-7`. The two are kept as separate fields
//! of [`BaroCalibration`] and [`AglModel::new`] logs the discrepancy instead
//! of reconciling it. [`BaroCalibration::consistent`] derives a Jacobian that
//! matches the function exactly.

use crate::errors::{FusionError, FusionResult};
use crate::fusion::ekf::ExtendedKalmanFilter;
use crate::fusion::matrix::{Matrix, Vector};
use crate::fusion::model::EstimationModel;

/// Measurement channel index of the barometer
pub const BARO_CHANNEL: usize = 0;
/// Measurement channel index of the sonar
pub const SONAR_CHANNEL: usize = 1;

/// Initial altitude variance used by [`AglModel::filter`] (cm²)
pub const INITIAL_VARIANCE: f64 = 1e6;
/// Process noise used by [`AglModel::filter`] (cm² per cycle)
pub const PROCESS_VARIANCE: f64 = 1e-3;

/// Barometric pressure as a function of altitude
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaroCalibration {
    /// Pressure at zero altitude (Pa)
    pub sea_level_pa: f64,
    /// Lapse constant used by the pressure function (1/cm)
    pub lapse: f64,
    /// Exponent of the pressure function
    pub exponent: f64,
    /// Leading coefficient of the hand-derived Jacobian (Pa/cm)
    pub jacobian_gain: f64,
    /// Lapse constant used by the hand-derived Jacobian (1/cm)
    pub jacobian_lapse: f64,
}

impl Default for BaroCalibration {
    fn default() -> Self {
        Self {
            sea_level_pa: 101_325.0,
            lapse: 2.25577e-7,
            exponent: 5.25588,
            jacobian_gain: -0.120131,
            jacobian_lapse: 2.2577e-7,
        }
    }
}

impl BaroCalibration {
    /// Default curve with the Jacobian derived from the function constants
    pub fn consistent() -> Self {
        let base = Self::default();
        Self {
            jacobian_gain: -base.sea_level_pa * base.exponent * base.lapse,
            jacobian_lapse: base.lapse,
            ..base
        }
    }

    /// Difference between the function and Jacobian lapse constants, if any
    pub fn lapse_mismatch(&self) -> Option<f64> {
        let diff = self.jacobian_lapse - self.lapse;
        (diff != 0.0).then_some(diff)
    }

    /// Pressure (Pa) at `agl` centimetres
    pub fn pressure(&self, agl: f64) -> f64 {
        self.sea_level_pa * libm::pow(1.0 - self.lapse * agl, self.exponent)
    }

    /// dp/dx at `agl` centimetres
    pub fn slope(&self, agl: f64) -> f64 {
        self.jacobian_gain * libm::pow(1.0 - self.jacobian_lapse * agl, self.exponent - 1.0)
    }
}

/// Linear sonar range calibration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SonarCalibration {
    /// Reading per centimetre of altitude
    pub gain: f64,
    /// Reading at zero altitude (cm)
    pub offset: f64,
}

impl Default for SonarCalibration {
    fn default() -> Self {
        Self {
            gain: 0.933,
            offset: -2.894,
        }
    }
}

impl SonarCalibration {
    /// Range reading (cm) at `agl` centimetres
    pub fn range(&self, agl: f64) -> f64 {
        self.gain * agl + self.offset
    }
}

/// Barometer reading for a ground-truth altitude, default calibration
pub fn baro(agl: f64) -> f64 {
    BaroCalibration::default().pressure(agl)
}

/// Sonar reading for a ground-truth altitude, default calibration
pub fn sonar(agl: f64) -> f64 {
    SonarCalibration::default().range(agl)
}

/// Which sensors take part in the measurement vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AglChannels {
    /// `[baro, sonar]`
    #[default]
    Both,
    /// `[baro]`, sonar out of range or dropped
    BaroOnly,
    /// `[sonar]`, barometer dropped
    SonarOnly,
}

impl AglChannels {
    /// Number of measurement channels
    pub fn count(self) -> usize {
        match self {
            Self::Both => 2,
            Self::BaroOnly | Self::SonarOnly => 1,
        }
    }
}

/// One-state altitude model with barometer and sonar channels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AglModel {
    baro: BaroCalibration,
    sonar: SonarCalibration,
    channels: AglChannels,
}

impl Default for AglModel {
    fn default() -> Self {
        Self::new(BaroCalibration::default(), SonarCalibration::default())
    }
}

impl AglModel {
    /// Model using both channels with the given calibrations
    pub fn new(baro: BaroCalibration, sonar: SonarCalibration) -> Self {
        if let Some(diff) = baro.lapse_mismatch() {
            log_warn!(
                "barometer Jacobian lapse differs from pressure lapse by {}",
                diff
            );
        }
        Self {
            baro,
            sonar,
            channels: AglChannels::Both,
        }
    }

    /// Same calibration, different channel set
    pub fn with_channels(mut self, channels: AglChannels) -> Self {
        self.channels = channels;
        self
    }

    /// Active channels
    pub fn channels(&self) -> AglChannels {
        self.channels
    }

    /// Barometer calibration
    pub fn baro(&self) -> &BaroCalibration {
        &self.baro
    }

    /// Sonar calibration
    pub fn sonar(&self) -> &SonarCalibration {
        &self.sonar
    }

    /// Diagonal R for the active channels from per-sensor standard deviations
    pub fn measurement_noise(&self, sigma_baro: f64, sigma_sonar: f64) -> FusionResult<Matrix> {
        let baro_var = sigma_baro * sigma_baro;
        let sonar_var = sigma_sonar * sigma_sonar;
        match self.channels {
            AglChannels::Both => Matrix::from_diagonal(&[baro_var, sonar_var]),
            AglChannels::BaroOnly => Matrix::from_diagonal(&[baro_var]),
            AglChannels::SonarOnly => Matrix::from_diagonal(&[sonar_var]),
        }
    }

    /// Ready filter starting at `initial_agl` with `P = 1e6`, `Q = 1e-3`
    pub fn filter(
        self,
        initial_agl: f64,
        sigma_baro: f64,
        sigma_sonar: f64,
    ) -> FusionResult<ExtendedKalmanFilter<Self>> {
        let r = self.measurement_noise(sigma_baro, sigma_sonar)?;
        ExtendedKalmanFilter::new(
            self,
            Vector::from_slice(&[initial_agl])?,
            Matrix::from_diagonal(&[INITIAL_VARIANCE])?,
            Matrix::from_diagonal(&[PROCESS_VARIANCE])?,
            r,
        )
    }
}

/// The single state component, or a length error
fn altitude_of(x: &Vector) -> FusionResult<f64> {
    match x.as_slice() {
        [agl] => Ok(*agl),
        other => Err(FusionError::length(1, other.len())),
    }
}

impl EstimationModel for AglModel {
    fn state_dim(&self) -> usize {
        1
    }

    fn measurement_dim(&self) -> usize {
        self.channels.count()
    }

    fn transition(&self, x: &Vector) -> FusionResult<Vector> {
        Ok(x.clone())
    }

    fn transition_jacobian(&self, _x: &Vector) -> FusionResult<Matrix> {
        Matrix::identity(1)
    }

    fn measurement(&self, x: &Vector) -> FusionResult<Vector> {
        let agl = altitude_of(x)?;
        match self.channels {
            AglChannels::Both => {
                Vector::from_slice(&[self.baro.pressure(agl), self.sonar.range(agl)])
            }
            AglChannels::BaroOnly => Vector::from_slice(&[self.baro.pressure(agl)]),
            AglChannels::SonarOnly => Vector::from_slice(&[self.sonar.range(agl)]),
        }
    }

    fn measurement_jacobian(&self, x: &Vector) -> FusionResult<Matrix> {
        let agl = altitude_of(x)?;
        match self.channels {
            AglChannels::Both => Matrix::from_rows(&[&[self.baro.slope(agl)], &[self.sonar.gain]]),
            AglChannels::BaroOnly => Matrix::from_rows(&[&[self.baro.slope(agl)]]),
            AglChannels::SonarOnly => Matrix::from_rows(&[&[self.sonar.gain]]),
        }
    }
}
