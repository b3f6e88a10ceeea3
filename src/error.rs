// ❗ Error taxonomy for the analytics pipeline
//
// Schema errors halt normalization, data-insufficiency errors are
// recoverable by the caller, everything else is an unexpected failure.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalyticsError>;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    // ========================================================================
    // SCHEMA ERRORS (fatal to normalization)
    // ========================================================================
    #[error("no column containing 'date', 'time' or 'day' found")]
    NoDateColumnFound,

    #[error("no amount/debit/credit column found")]
    NoAmountColumnFound,

    // ========================================================================
    // DATA-INSUFFICIENCY ERRORS (caller may retry with other input)
    // ========================================================================
    #[error("no expense rows available for forecasting")]
    NoExpenseData,

    #[error("not enough monthly history to forecast: {months} month(s), need at least {required}")]
    InsufficientHistory { months: usize, required: usize },

    #[error("category model not found, train the categorizer first")]
    ModelNotTrained,

    // ========================================================================
    // CALLER ERRORS
    // ========================================================================
    #[error("forecast horizon must be between 1 and the configured maximum, got {0}")]
    InvalidHorizon(u32),

    #[error("interval width must be strictly between 0 and 1, got {0}")]
    InvalidIntervalWidth(f64),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // UNEXPECTED FAILURES
    // ========================================================================
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("malformed CSV record at line {line}: {source}")]
    MalformedCsv {
        line: usize,
        #[source]
        source: csv::Error,
    },

    #[error("model artifact is inconsistent: {0}")]
    CorruptModel(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AnalyticsError {
    /// Schema errors block the whole session: nothing downstream gets a table.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            AnalyticsError::NoDateColumnFound | AnalyticsError::NoAmountColumnFound
        )
    }

    /// The uploaded bytes could not be read as CSV at all.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            AnalyticsError::Csv(_) | AnalyticsError::MalformedCsv { .. }
        )
    }

    /// Errors the caller can fix by supplying different input or parameters.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AnalyticsError::NoExpenseData
                | AnalyticsError::InsufficientHistory { .. }
                | AnalyticsError::ModelNotTrained
                | AnalyticsError::InvalidHorizon(_)
                | AnalyticsError::InvalidIntervalWidth(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_errors_are_not_recoverable() {
        assert!(AnalyticsError::NoDateColumnFound.is_schema_error());
        assert!(!AnalyticsError::NoDateColumnFound.is_recoverable());
        assert!(AnalyticsError::NoAmountColumnFound.is_schema_error());
    }

    #[test]
    fn test_insufficiency_errors_are_recoverable() {
        let err = AnalyticsError::InsufficientHistory { months: 2, required: 3 };
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("2 month(s)"));
        assert!(AnalyticsError::ModelNotTrained.is_recoverable());
        assert!(AnalyticsError::NoExpenseData.is_recoverable());
    }

    #[test]
    fn test_io_error_is_unexpected() {
        let err: AnalyticsError =
            std::io::Error::new(std::io::ErrorKind::Other, "disk gone").into();
        assert!(!err.is_recoverable());
        assert!(!err.is_schema_error());
        assert!(!err.is_malformed_input());
    }

    #[test]
    fn test_malformed_csv_keeps_line() {
        let source = csv::Error::from(std::io::Error::new(std::io::ErrorKind::InvalidData, "bad"));
        let err = AnalyticsError::MalformedCsv { line: 7, source };

        assert!(err.is_malformed_input());
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("line 7"));
    }
}
