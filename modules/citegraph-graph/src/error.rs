use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Neo4j error: {0}")]
    Neo4j(#[from] neo4rs::Error),

    /// The store refused the write as a whole; nothing from it was committed.
    #[error("Write rejected: {0}")]
    Rejected(String),
}
