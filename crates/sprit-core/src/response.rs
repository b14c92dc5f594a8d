//! Instrument response from poles and zeros.

use crate::error::{HvsrError, Result};
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Physical quantity the instrument output is proportional to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroundMotion {
    /// Seismometer (counts per m/s).
    #[default]
    Velocity,
    /// Accelerometer (counts per m/s²).
    Acceleration,
    /// Displacement sensor (counts per m).
    Displacement,
}

/// Poles/zeros description of one channel.
///
/// `H(s) = sensitivity * gain * Π(s - zᵢ) / Π(s - pᵢ)` with `s = i2πf`.
/// Poles and zeros are `[re, im]` pairs in rad/s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentResponse {
    /// Poles in rad/s.
    pub poles: Vec<[f64; 2]>,
    /// Zeros in rad/s.
    pub zeros: Vec<[f64; 2]>,
    /// Normalisation factor (A0).
    pub gain: f64,
    /// Overall sensitivity in counts per unit ground motion.
    pub sensitivity: f64,
    /// Quantity the response maps from.
    pub ground_motion: GroundMotion,
}

impl Default for InstrumentResponse {
    fn default() -> Self {
        Self::flat()
    }
}

impl InstrumentResponse {
    /// Unit response to acceleration: PSDs pass through unchanged.
    pub fn flat() -> Self {
        Self {
            poles: Vec::new(),
            zeros: Vec::new(),
            gain: 1.0,
            sensitivity: 1.0,
            ground_motion: GroundMotion::Acceleration,
        }
    }

    /// Velocity seismometer described by poles, zeros, A0 and sensitivity.
    pub fn velocity(
        poles: Vec<[f64; 2]>,
        zeros: Vec<[f64; 2]>,
        gain: f64,
        sensitivity: f64,
    ) -> Self {
        Self {
            poles,
            zeros,
            gain,
            sensitivity,
            ground_motion: GroundMotion::Velocity,
        }
    }

    /// Reject zero or non-finite scale factors.
    pub fn validate(&self) -> Result<()> {
        if !(self.gain.is_finite() && self.gain != 0.0) {
            return Err(HvsrError::invalid(
                "response.gain",
                format!("must be finite and non-zero, got {}", self.gain),
            ));
        }
        if !(self.sensitivity.is_finite() && self.sensitivity != 0.0) {
            return Err(HvsrError::invalid(
                "response.sensitivity",
                format!("must be finite and non-zero, got {}", self.sensitivity),
            ));
        }
        Ok(())
    }

    /// Complex response at `freq` Hz.
    pub fn evaluate(&self, freq: f64) -> Complex64 {
        let s = Complex64::new(0.0, 2.0 * PI * freq);
        let num = self
            .zeros
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, &[re, im]| acc * (s - Complex64::new(re, im)));
        let den = self
            .poles
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, &[re, im]| acc * (s - Complex64::new(re, im)));
        num / den * (self.gain * self.sensitivity)
    }

    /// `|H|²` referred to ground acceleration at `freq` Hz.
    ///
    /// Dividing a raw PSD in counts² by this gives acceleration PSD.
    pub fn acceleration_power(&self, freq: f64) -> f64 {
        let h2 = self.evaluate(freq).norm_sqr();
        let w2 = (2.0 * PI * freq).powi(2);
        match self.ground_motion {
            GroundMotion::Acceleration => h2,
            GroundMotion::Velocity => h2 / w2,
            GroundMotion::Displacement => h2 / (w2 * w2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_response_is_unity() {
        let r = InstrumentResponse::flat();
        assert!((r.acceleration_power(3.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn velocity_sensor_above_corner_is_flat_in_velocity() {
        // 1 Hz geophone: two poles at -4.44 ± 4.44i, two zeros at 0
        let r = InstrumentResponse::velocity(
            vec![[-4.44, 4.44], [-4.44, -4.44]],
            vec![[0.0, 0.0], [0.0, 0.0]],
            1.0,
            100.0,
        );
        let h = r.evaluate(50.0).norm();
        assert!((h - 100.0).abs() < 1.0, "got {h}");
        let w = 2.0 * PI * 50.0;
        let expected = h * h / (w * w);
        assert!((r.acceleration_power(50.0) - expected).abs() / expected < 1e-12);
    }

    #[test]
    fn zero_sensitivity_is_rejected() {
        let r = InstrumentResponse {
            sensitivity: 0.0,
            ..InstrumentResponse::flat()
        };
        assert!(r.validate().is_err());
    }
}
