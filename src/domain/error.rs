//! Domain error types.

/// Top-level error type for fusetrader.
#[derive(Debug, thiserror::Error)]
pub enum TraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("missing column {column} in {source_name}")]
    MissingColumn { column: String, source_name: String },

    #[error("bars out of order at row {index}: {timestamp} is not after the previous bar")]
    UnorderedBars { index: usize, timestamp: String },

    #[error("no data in {source_name}")]
    NoData { source_name: String },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TraderError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        TraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&TraderError> for std::process::ExitCode {
    fn from(err: &TraderError) -> Self {
        let code: u8 = match err {
            TraderError::Io(_) => 1,
            TraderError::ConfigParse { .. }
            | TraderError::ConfigMissing { .. }
            | TraderError::ConfigInvalid { .. } => 2,
            TraderError::Data { .. }
            | TraderError::MissingColumn { .. }
            | TraderError::UnorderedBars { .. }
            | TraderError::NoData { .. }
            | TraderError::Csv(_) => 5,
        };
        std::process::ExitCode::from(code)
    }
}
