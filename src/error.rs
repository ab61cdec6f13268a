use thiserror::Error;

/// Errors surfaced by the counting pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Raw detector output could not be decoded (wrong tensor shape).
    #[error("malformed detector output: {0}")]
    Decode(String),

    /// A component was constructed with invalid parameters.
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
