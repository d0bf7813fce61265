//! DSP Error Types

use thiserror::Error;

/// Errors from filter design and analyzer lifecycle operations.
///
/// Nothing on the block-processing path returns these; real-time code
/// degrades (dropped write, stale coefficients) instead of erroring.
#[derive(Error, Debug)]
pub enum DspError {
    #[error("band index {0} out of range")]
    InvalidBandIndex(usize),

    #[error("no valid coefficients for {frequency} Hz at {sample_rate} Hz sample rate")]
    InvalidCoefficients { frequency: f32, sample_rate: f32 },

    #[error("sample rate must be positive, got {0}")]
    InvalidSampleRate(f32),

    #[error("failed to start analysis thread: {0}")]
    ThreadSpawn(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_inputs() {
        assert!(DspError::InvalidBandIndex(7).to_string().contains('7'));

        let err = DspError::InvalidCoefficients {
            frequency: 30_000.0,
            sample_rate: 44_100.0,
        };
        let text = err.to_string();
        assert!(text.contains("30000") && text.contains("44100"));

        assert!(DspError::InvalidSampleRate(-1.0).to_string().contains("-1"));
    }
}
