use thiserror::Error;

/// Failure taxonomy for the retrieval core.
///
/// Only `Configuration` is meant to escape to an operator; everything else is
/// caught at the call site inside the pipeline and downgraded to "contributes
/// nothing".
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Lexical index rebuild failed, mutation not published: {0}")]
    IndexRebuild(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("LLM call failed: {0}")]
    Llm(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn retrieval<E: std::fmt::Display>(err: E) -> Self {
        Error::Retrieval(err.to_string())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
