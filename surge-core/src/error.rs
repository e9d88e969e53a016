pub type Result<T> = std::result::Result<T, Error>;

/// Setup errors. Any of these stops a run before the first virtual user starts.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("`scenario_name` must not be empty")]
    InvalidScenarioName,

    #[error("`max_vus` must be a positive integer")]
    InvalidMaxVus,

    #[error("`{0}` must be a positive duration")]
    InvalidInterval(&'static str),

    #[error("`{field}` must not exceed {max:?}")]
    DurationTooLong {
        field: &'static str,
        max: std::time::Duration,
    },

    #[error("invalid base url `{0}` (expected an absolute http:// or https:// URL)")]
    InvalidBaseUrl(String),

    #[error("invalid threshold `{expression}` for metric `{metric}`: {error}")]
    InvalidThreshold {
        metric: String,
        expression: String,
        error: String,
    },

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}
