//! Biquad Filter Design
//!
//! Coefficient design for the EQ band filters, based on the RBJ
//! (Robert Bristow-Johnson) Audio EQ Cookbook via the `biquad` crate, plus
//! analytic magnitude-response evaluation for plotting.

use biquad::{Coefficients, ToHertz, Type};
use rustfft::num_complex::Complex;

use crate::error::DspError;

/// Valid frequency range for a band (Hz)
pub const FREQUENCY_MIN: f32 = 20.0;
pub const FREQUENCY_MAX: f32 = 20_000.0;

/// Valid quality range for a band
pub const QUALITY_MIN: f32 = 0.1;
pub const QUALITY_MAX: f32 = 10.0;

/// Maximum linear gain factor for a band (10x ~ +20 dB); minimum is its inverse
pub const GAIN_MAX: f32 = 10.0;

/// Number of points in the log-spaced response plot grid
pub const PLOT_RESOLUTION: usize = 300;

/// Valid parameter ranges for band filters, passed to the equalizer at
/// construction so the clamping policy lives in one place
#[derive(Debug, Clone, Copy)]
pub struct FilterRanges {
    pub frequency: (f32, f32),
    pub quality: (f32, f32),
    pub gain: (f32, f32),
}

impl Default for FilterRanges {
    fn default() -> Self {
        Self {
            frequency: (FREQUENCY_MIN, FREQUENCY_MAX),
            quality: (QUALITY_MIN, QUALITY_MAX),
            gain: (1.0 / GAIN_MAX, GAIN_MAX),
        }
    }
}

impl FilterRanges {
    pub fn clamp_frequency(&self, value: f32) -> f32 {
        value.clamp(self.frequency.0, self.frequency.1)
    }

    pub fn clamp_quality(&self, value: f32) -> f32 {
        value.clamp(self.quality.0, self.quality.1)
    }

    pub fn clamp_gain(&self, value: f32) -> f32 {
        value.clamp(self.gain.0, self.gain.1)
    }
}

/// Filter type for one EQ band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    None,
    HighPass,
    LowShelf,
    BandPass,
    Peak,
    HighShelf,
    LowPass,
}

impl FilterKind {
    pub const ALL: [FilterKind; 7] = [
        FilterKind::None,
        FilterKind::HighPass,
        FilterKind::LowShelf,
        FilterKind::BandPass,
        FilterKind::Peak,
        FilterKind::HighShelf,
        FilterKind::LowPass,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|k| k == self).unwrap_or(0)
    }

    /// Display name for menus and parameter text
    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::None => "No Filter",
            FilterKind::HighPass => "High Pass",
            FilterKind::LowShelf => "Low Shelf",
            FilterKind::BandPass => "Band Pass",
            FilterKind::Peak => "Peak",
            FilterKind::HighShelf => "High Shelf",
            FilterKind::LowPass => "Low Pass",
        }
    }
}

/// Convert a linear gain factor to decibels
pub fn gain_to_db(gain: f32) -> f32 {
    20.0 * gain.max(1e-12).log10()
}

/// Convert decibels to a linear gain factor
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert a linear gain to decibels with a silence floor
pub fn gain_to_db_with_floor(gain: f32, floor_db: f32) -> f32 {
    gain_to_db(gain).max(floor_db)
}

/// Identity coefficients: the pass-through stage used for [`FilterKind::None`]
fn identity_coefficients() -> Coefficients<f32> {
    Coefficients {
        a1: 0.0,
        a2: 0.0,
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
    }
}

/// Design the biquad coefficients for one band configuration
///
/// `gain` is a linear factor; the shelving and peaking designs take it in
/// decibels internally. Inputs are expected pre-clamped to [`FilterRanges`];
/// a frequency at or above Nyquist is the only way this fails.
pub fn design_coefficients(
    kind: FilterKind,
    sample_rate: f32,
    frequency: f32,
    quality: f32,
    gain: f32,
) -> Result<Coefficients<f32>, DspError> {
    if sample_rate <= 0.0 {
        return Err(DspError::InvalidSampleRate(sample_rate));
    }
    if kind == FilterKind::None {
        return Ok(identity_coefficients());
    }

    let fs = sample_rate.hz();
    let f0 = frequency.hz();
    let gain_db = gain_to_db(gain);

    let design = match kind {
        FilterKind::None => unreachable!(),
        FilterKind::HighPass => Coefficients::<f32>::from_params(Type::HighPass, fs, f0, quality),
        FilterKind::LowShelf => {
            Coefficients::<f32>::from_params(Type::LowShelf(gain_db), fs, f0, quality)
        }
        FilterKind::BandPass => Coefficients::<f32>::from_params(Type::BandPass, fs, f0, quality),
        FilterKind::Peak => {
            Coefficients::<f32>::from_params(Type::PeakingEQ(gain_db), fs, f0, quality)
        }
        FilterKind::HighShelf => {
            Coefficients::<f32>::from_params(Type::HighShelf(gain_db), fs, f0, quality)
        }
        FilterKind::LowPass => Coefficients::<f32>::from_params(Type::LowPass, fs, f0, quality),
    };

    design.map_err(|_| DspError::InvalidCoefficients {
        frequency,
        sample_rate,
    })
}

/// The log-spaced frequency grid used for all response plots: octave
/// thirtieths upward from 20 Hz
pub fn frequency_grid() -> Vec<f32> {
    (0..PLOT_RESOLUTION)
        .map(|i| 20.0 * 2.0_f32.powf(i as f32 / 30.0))
        .collect()
}

/// Evaluate |H(e^jw)| of a biquad at each grid frequency
///
/// Evaluated in f64: the grid spans three decades and single precision
/// drifts visibly at the band edges.
pub fn magnitude_response(
    coefficients: &Coefficients<f32>,
    frequencies: &[f32],
    sample_rate: f32,
    out: &mut [f32],
) {
    debug_assert_eq!(frequencies.len(), out.len());

    let b0 = coefficients.b0 as f64;
    let b1 = coefficients.b1 as f64;
    let b2 = coefficients.b2 as f64;
    let a1 = coefficients.a1 as f64;
    let a2 = coefficients.a2 as f64;

    for (freq, mag) in frequencies.iter().zip(out.iter_mut()) {
        let w = std::f64::consts::TAU * *freq as f64 / sample_rate as f64;
        let z1 = Complex::from_polar(1.0, -w);
        let z2 = z1 * z1;
        let numerator = b0 + b1 * z1 + b2 * z2;
        let denominator = 1.0 + a1 * z1 + a2 * z2;
        *mag = (numerator / denominator).norm() as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 48_000.0;

    fn coefficient_bits(c: &Coefficients<f32>) -> [u32; 5] {
        [
            c.a1.to_bits(),
            c.a2.to_bits(),
            c.b0.to_bits(),
            c.b1.to_bits(),
            c.b2.to_bits(),
        ]
    }

    #[test]
    fn test_db_roundtrip_within_tolerance() {
        // Supported range is -40 dB to +20 dB
        let mut db = -40.0_f32;
        while db <= 20.0 {
            let linear = db_to_gain(db);
            let back = gain_to_db(linear);
            assert!(
                (back - db).abs() < 1e-4,
                "roundtrip failed at {} dB: got {}",
                db,
                back
            );
            db += 0.37;
        }
    }

    #[test]
    fn test_db_reference_points() {
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_gain(20.0) - 10.0).abs() < 1e-4);
        assert!((gain_to_db(0.5) - (-6.0206)).abs() < 1e-3);
    }

    #[test]
    fn test_gain_floor() {
        assert_eq!(gain_to_db_with_floor(0.0, -80.0), -80.0);
        assert!((gain_to_db_with_floor(1.0, -80.0) - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_design_is_deterministic() {
        // Same parameters must give bit-identical coefficients every time
        for kind in FilterKind::ALL {
            let a = design_coefficients(kind, SAMPLE_RATE, 750.0, 1.3, 2.0).unwrap();
            let b = design_coefficients(kind, SAMPLE_RATE, 750.0, 1.3, 2.0).unwrap();
            assert_eq!(
                coefficient_bits(&a),
                coefficient_bits(&b),
                "{:?} design not deterministic",
                kind
            );
        }
    }

    #[test]
    fn test_boundary_frequencies_produce_finite_coefficients() {
        for kind in FilterKind::ALL {
            for freq in [FREQUENCY_MIN, FREQUENCY_MAX] {
                let coeffs = design_coefficients(kind, SAMPLE_RATE, freq, 0.707, 1.0)
                    .unwrap_or_else(|e| panic!("{:?} at {}Hz failed: {}", kind, freq, e));
                for value in coefficient_bits(&coeffs).map(f32::from_bits) {
                    assert!(
                        value.is_finite(),
                        "{:?} at {}Hz produced non-finite coefficient",
                        kind,
                        freq
                    );
                }
            }
        }
    }

    #[test]
    fn test_none_kind_is_identity() {
        let coeffs = design_coefficients(FilterKind::None, SAMPLE_RATE, 1000.0, 1.0, 4.0).unwrap();
        let freqs = [100.0, 1000.0, 10_000.0];
        let mut mags = [0.0_f32; 3];
        magnitude_response(&coeffs, &freqs, SAMPLE_RATE, &mut mags);
        for mag in mags {
            assert!((mag - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_invalid_sample_rate_rejected() {
        let result = design_coefficients(FilterKind::Peak, 0.0, 1000.0, 1.0, 1.0);
        assert!(matches!(result, Err(DspError::InvalidSampleRate(_))));
    }

    #[test]
    fn test_lowpass_attenuates_above_cutoff() {
        let coeffs =
            design_coefficients(FilterKind::LowPass, SAMPLE_RATE, 1000.0, 0.707, 1.0).unwrap();
        let freqs = [100.0, 1000.0, 10_000.0];
        let mut mags = [0.0_f32; 3];
        magnitude_response(&coeffs, &freqs, SAMPLE_RATE, &mut mags);

        assert!((mags[0] - 1.0).abs() < 0.05, "passband should be ~unity");
        assert!(
            (mags[1] - 0.707).abs() < 0.05,
            "-3dB point at cutoff, got {}",
            mags[1]
        );
        assert!(mags[2] < 0.05, "stopband should attenuate strongly");
    }

    #[test]
    fn test_peak_boosts_at_centre() {
        let coeffs = design_coefficients(FilterKind::Peak, SAMPLE_RATE, 1000.0, 1.0, 2.0).unwrap();
        let freqs = [50.0, 1000.0, 15_000.0];
        let mut mags = [0.0_f32; 3];
        magnitude_response(&coeffs, &freqs, SAMPLE_RATE, &mut mags);

        assert!((mags[1] - 2.0).abs() < 0.05, "centre gain should be ~2x");
        assert!((mags[0] - 1.0).abs() < 0.05);
        assert!((mags[2] - 1.0).abs() < 0.1);
    }

    #[test]
    fn test_frequency_grid_shape() {
        let grid = frequency_grid();
        assert_eq!(grid.len(), PLOT_RESOLUTION);
        assert!((grid[0] - 20.0).abs() < 1e-3);
        // 30 points per octave
        assert!((grid[30] - 40.0).abs() < 1e-2);
        assert!(grid[PLOT_RESOLUTION - 1] > 19_000.0);
    }

    #[test]
    fn test_filter_kind_index_roundtrip() {
        for kind in FilterKind::ALL {
            assert_eq!(FilterKind::from_index(kind.index()), Some(kind));
        }
        assert_eq!(FilterKind::from_index(7), None);
    }
}
