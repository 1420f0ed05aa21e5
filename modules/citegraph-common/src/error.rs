use thiserror::Error;

#[derive(Error, Debug)]
pub enum CiteGraphError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl CiteGraphError {
    pub fn is_config(&self) -> bool {
        matches!(self, CiteGraphError::Config(_))
    }
}
