//! Common test utilities for integration tests
//!
//! This module provides:
//! - A deterministic noise source
//! - Sensor reading generators for the altitude model
//! - Small models used by the generic filter tests
//! - Assertion helpers

#![allow(dead_code)]

use altfuse_core::{
    fusion::altitude::{AglChannels, AglModel, baro, sonar},
    EstimationModel, ExtendedKalmanFilter, FusionResult, Matrix, Vector,
};

/// Barometer standard deviation used by the scenarios (Pa)
pub const SIGMA_BARO: f64 = 10.0;
/// Sonar standard deviation used by the scenarios (cm)
pub const SIGMA_SONAR: f64 = 0.2;

/// Deterministic xorshift generator
pub struct TestRng {
    state: u32,
}

impl TestRng {
    pub fn new(seed: u32) -> Self {
        Self { state: seed.max(1) }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 17;
        self.state ^= self.state << 5;
        self.state
    }

    pub fn next_f64(&mut self) -> f64 {
        (self.next_u32() >> 8) as f64 / 16_777_216.0
    }

    pub fn gen_range(&mut self, min: f64, max: f64) -> f64 {
        min + self.next_f64() * (max - min)
    }
}

/// Noise-free `[baro, sonar]` reading at `agl`
pub fn exact_reading(agl: f64) -> [f64; 2] {
    [baro(agl), sonar(agl)]
}

/// `[baro, sonar]` reading at `agl` with bounded uniform noise
pub fn noisy_reading(rng: &mut TestRng, agl: f64) -> [f64; 2] {
    [
        baro(agl) + rng.gen_range(-SIGMA_BARO, SIGMA_BARO),
        sonar(agl) + rng.gen_range(-SIGMA_SONAR, SIGMA_SONAR),
    ]
}

/// Default altitude filter starting at zero
pub fn agl_filter() -> ExtendedKalmanFilter<AglModel> {
    AglModel::default()
        .filter(0.0, SIGMA_BARO, SIGMA_SONAR)
        .unwrap()
}

/// Reduced model and its R for a single surviving channel
pub fn single_channel(channels: AglChannels) -> (AglModel, Matrix) {
    let model = AglModel::default().with_channels(channels);
    let r = model.measurement_noise(SIGMA_BARO, SIGMA_SONAR).unwrap();
    (model, r)
}

/// Constant-velocity model: x = [position, velocity], position observed
pub struct ConstantVelocity {
    pub dt: f64,
}

impl EstimationModel for ConstantVelocity {
    fn state_dim(&self) -> usize {
        2
    }

    fn measurement_dim(&self) -> usize {
        1
    }

    fn transition(&self, x: &Vector) -> FusionResult<Vector> {
        Vector::from_slice(&[x[0] + self.dt * x[1], x[1]])
    }

    fn transition_jacobian(&self, _x: &Vector) -> FusionResult<Matrix> {
        Matrix::from_rows(&[&[1.0, self.dt], &[0.0, 1.0]])
    }

    fn measurement(&self, x: &Vector) -> FusionResult<Vector> {
        Vector::from_slice(&[x[0]])
    }

    fn measurement_jacobian(&self, _x: &Vector) -> FusionResult<Matrix> {
        Matrix::from_rows(&[&[1.0, 0.0]])
    }
}

/// Measurement that carries no information about the state
pub struct Blind;

impl EstimationModel for Blind {
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

    fn measurement(&self, _x: &Vector) -> FusionResult<Vector> {
        Vector::from_slice(&[0.0])
    }

    fn measurement_jacobian(&self, _x: &Vector) -> FusionResult<Matrix> {
        Matrix::zeros(1, 1)
    }
}

/// Assert `|actual − expected| <= tolerance` with a readable message
#[track_caller]
pub fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected} ± {tolerance}, got {actual}"
    );
}
