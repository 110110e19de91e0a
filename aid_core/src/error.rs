use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AidError {
    #[error("insufficient data: need {needed} recent BG readings, found {found}")]
    InsufficientData { needed: usize, found: usize },
    #[error("unit mismatch: expected {expected}, found {found}")]
    UnitMismatch { expected: String, found: String },
    #[error("bad prediction time: {0} h is not on the prediction grid")]
    BadPredictionTime(f64),
    #[error("empty profile ({unit}): no records in range and no filler")]
    EmptyProfile { unit: String },
    #[error("unsupported DIA for the reference curve: {0} h")]
    UnsupportedDia(f64),
    #[error("mixed records: expected {expected}, found {found}")]
    MixedRecords {
        expected: &'static str,
        found: &'static str,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid profile: {0}")]
    InvalidProfile(&'static str),
}

impl AidError {
    /// Data errors that abort the current cycle only; the loop should retry
    /// on its next scheduled run.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientData { .. } | Self::UnitMismatch { .. } | Self::EmptyProfile { .. }
        )
    }
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
