use thiserror::Error;

#[derive(Error, Debug)]
pub enum ObserveError {
    #[error("invalid time expression {input:?}: expected a relative duration (e.g. 3s, 4m, 1h43m) or one of: {}", .accepted.join(", "))]
    InvalidTimeExpression {
        input: String,
        accepted: Vec<String>,
    },

    #[error("{} are mutually exclusive", .flags.join(", "))]
    ConflictingSelectors { flags: Vec<&'static str> },

    #[error("invalid time range: --since {since} is after --until {until}")]
    InvalidTimeRange { since: String, until: String },

    #[error("invalid output format {input:?}, must be one of: {}", .accepted.join(", "))]
    InvalidOutputFormat {
        input: String,
        accepted: Vec<&'static str>,
    },

    #[error("invalid time format {input:?}, must be one of: {}", .accepted.join(", "))]
    InvalidTimeFormat {
        input: String,
        accepted: Vec<&'static str>,
    },

    #[error("invalid color mode {input:?}, must be one of: {}", .accepted.join(", "))]
    InvalidColorMode {
        input: String,
        accepted: Vec<&'static str>,
    },

    #[error("invalid filter {input:?}: {reason}")]
    InvalidFilter { input: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("invalid record on line {line}: {reason}")]
    InvalidRecord { line: u64, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ObserveError {
    /// Errors caused by the user's input, reported as usage errors.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            ObserveError::InvalidTimeExpression { .. }
                | ObserveError::ConflictingSelectors { .. }
                | ObserveError::InvalidTimeRange { .. }
                | ObserveError::InvalidOutputFormat { .. }
                | ObserveError::InvalidTimeFormat { .. }
                | ObserveError::InvalidColorMode { .. }
                | ObserveError::InvalidFilter { .. }
                | ObserveError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ObserveError>;
