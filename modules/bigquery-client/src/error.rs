use thiserror::Error;

pub type Result<T> = std::result::Result<T, BigQueryError>;

/// Job error reason BigQuery reports when a WRITE_EMPTY destination already holds data.
const REASON_DUPLICATE: &str = "duplicate";

#[derive(Debug, Error)]
pub enum BigQueryError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        reason: Option<String>,
        message: String,
    },

    #[error("Job {job_id} failed ({reason}): {message}")]
    Job {
        job_id: String,
        reason: String,
        message: String,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Auth error: {0}")]
    Auth(String),
}

impl BigQueryError {
    /// The reason code attached by BigQuery, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            BigQueryError::Api { reason, .. } => reason.as_deref(),
            BigQueryError::Job { reason, .. } => Some(reason.as_str()),
            _ => None,
        }
    }

    /// True for HTTP 409 or a job that failed with reason `duplicate`.
    pub fn is_conflict(&self) -> bool {
        match self {
            BigQueryError::Api { status: 409, .. } => true,
            _ => self.reason() == Some(REASON_DUPLICATE),
        }
    }

    /// True for HTTP 400 or a job that failed with an `invalid*` reason.
    pub fn is_bad_request(&self) -> bool {
        match self {
            BigQueryError::Api { status: 400, .. } => true,
            _ => matches!(self.reason(), Some("invalid" | "invalidQuery")),
        }
    }
}

impl From<reqwest::Error> for BigQueryError {
    fn from(err: reqwest::Error) -> Self {
        BigQueryError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for BigQueryError {
    fn from(err: serde_json::Error) -> Self {
        BigQueryError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for BigQueryError {
    fn from(err: std::io::Error) -> Self {
        BigQueryError::Io(err.to_string())
    }
}
