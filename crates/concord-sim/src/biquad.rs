//! Lowpass frequency response of the simulated biquad filter.
//!
//! Coefficients follow the RBJ Audio EQ Cookbook lowpass.

use core::f32::consts::PI;
use libm::{atan2f, cosf, powf, sinf, sqrtf};

/// Normalized lowpass coefficients `(b0, b1, b2, a1, a2)`.
pub fn lowpass_coefficients(frequency: f32, q: f32, sample_rate: f32) -> (f32, f32, f32, f32, f32) {
    let omega = 2.0 * PI * frequency / sample_rate;
    let cos_omega = cosf(omega);
    let alpha = sinf(omega) / (2.0 * q.max(1e-4));

    let a0 = 1.0 + alpha;
    let b0 = (1.0 - cos_omega) / 2.0 / a0;
    let b1 = (1.0 - cos_omega) / a0;
    let b2 = b0;
    let a1 = -2.0 * cos_omega / a0;
    let a2 = (1.0 - alpha) / a0;
    (b0, b1, b2, a1, a2)
}

/// Cutoff after applying `detune` cents.
pub fn detuned(frequency: f32, detune: f32) -> f32 {
    frequency * powf(2.0, detune / 1200.0)
}

/// Magnitude and phase at `frequency` Hz. Frequencies outside
/// `0..=nyquist` yield NaN.
pub fn response(
    coefficients: (f32, f32, f32, f32, f32),
    frequency: f32,
    sample_rate: f32,
) -> (f32, f32) {
    if !(0.0..=sample_rate / 2.0).contains(&frequency) {
        return (f32::NAN, f32::NAN);
    }
    let (b0, b1, b2, a1, a2) = coefficients;
    let w = 2.0 * PI * frequency / sample_rate;
    let (c1, s1) = (cosf(w), sinf(w));
    let (c2, s2) = (cosf(2.0 * w), sinf(2.0 * w));

    // H(e^jw) = (b0 + b1 e^-jw + b2 e^-2jw) / (1 + a1 e^-jw + a2 e^-2jw)
    let num_re = b0 + b1 * c1 + b2 * c2;
    let num_im = -(b1 * s1 + b2 * s2);
    let den_re = 1.0 + a1 * c1 + a2 * c2;
    let den_im = -(a1 * s1 + a2 * s2);

    let magnitude = sqrtf(num_re * num_re + num_im * num_im) / sqrtf(den_re * den_re + den_im * den_im);
    let phase = atan2f(num_im, num_re) - atan2f(den_im, den_re);
    (magnitude, phase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unity_gain_at_dc() {
        let coefficients = lowpass_coefficients(1000.0, 0.707, 48000.0);
        let (magnitude, phase) = response(coefficients, 0.0, 48000.0);
        assert!((magnitude - 1.0).abs() < 1e-4, "DC magnitude {magnitude}");
        assert!(phase.abs() < 1e-4);
    }

    #[test]
    fn attenuates_above_cutoff() {
        let coefficients = lowpass_coefficients(1000.0, 0.707, 48000.0);
        let (low, _) = response(coefficients, 100.0, 48000.0);
        let (high, _) = response(coefficients, 10_000.0, 48000.0);
        assert!(high < low * 0.1, "{high} vs {low}");
    }

    #[test]
    fn out_of_range_frequency_is_nan() {
        let coefficients = lowpass_coefficients(1000.0, 0.707, 48000.0);
        assert!(response(coefficients, -1.0, 48000.0).0.is_nan());
        assert!(response(coefficients, 30_000.0, 48000.0).1.is_nan());
    }

    #[test]
    fn detune_octave() {
        assert!((detuned(440.0, 1200.0) - 880.0).abs() < 1e-2);
        assert!((detuned(440.0, 0.0) - 440.0).abs() < 1e-6);
    }
}
