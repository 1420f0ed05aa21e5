use thiserror::Error;

pub type Result<T> = std::result::Result<T, OpenAlexError>;

#[derive(Debug, Error)]
pub enum OpenAlexError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

impl OpenAlexError {
    /// Rate-limit and server-side failures are worth retrying on a later invocation.
    pub fn is_transient(&self) -> bool {
        match self {
            OpenAlexError::Network(_) => true,
            OpenAlexError::Api { status, .. } => *status == 429 || *status >= 500,
            OpenAlexError::Parse(_) | OpenAlexError::InvalidQuery(_) => false,
        }
    }
}

impl From<reqwest::Error> for OpenAlexError {
    fn from(err: reqwest::Error) -> Self {
        OpenAlexError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for OpenAlexError {
    fn from(err: serde_json::Error) -> Self {
        OpenAlexError::Parse(err.to_string())
    }
}
