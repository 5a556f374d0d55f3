use thiserror::Error;

/// Errors raised by the analysis pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or unsupported geometry or raster input
    #[error("Format error: {0}")]
    Format(String),

    /// Imagery backend, raster source or municipality API unreachable or denied
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Reduction exceeded the pixel ceiling or could not be evaluated
    #[error("Computation error: {0}")]
    Computation(String),

    #[error("Invalid session state: expected {expected}, found {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    pub fn fetch(msg: impl Into<String>) -> Self {
        Error::Fetch(msg.into())
    }

    pub fn computation(msg: impl Into<String>) -> Self {
        Error::Computation(msg.into())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Fetch(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
