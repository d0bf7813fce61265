//! Engine Error Types

use osprey_dsp::DspError;
use thiserror::Error;

/// Errors that can occur in the effect engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid engine configuration: {0}")]
    ConfigError(String),

    #[error("Engine has not been prepared with a sample rate yet")]
    NotPrepared,

    #[error("DSP error: {0}")]
    Dsp(#[from] DspError),
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::ConfigError("sample rate".into());
        assert!(err.to_string().contains("sample rate"));

        let err = EngineError::NotPrepared;
        assert!(err.to_string().contains("prepared"));
    }

    #[test]
    fn test_error_from_dsp() {
        let dsp_err = DspError::InvalidBandIndex(7);
        let engine_err: EngineError = dsp_err.into();
        assert!(matches!(engine_err, EngineError::Dsp(_)));
    }
}
