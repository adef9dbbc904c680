use thiserror::Error;

/// Top-level error type for the Hark system.
///
/// Variants map to the subsystems that can fail. The important split is
/// between `Decoder` (transient recognition problems, recovered locally by
/// treating them as "no result") and `Lifecycle` (utterance start/end
/// failures, after which the decoder's internal state is presumed corrupted
/// and the session loop must shut down — there is no known resynchronization
/// point).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HarkError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Decoder error: {0}")]
    Decoder(String),

    #[error("Utterance lifecycle error: {0}")]
    Lifecycle(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for HarkError {
    fn from(err: toml::de::Error) -> Self {
        HarkError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for HarkError {
    fn from(err: toml::ser::Error) -> Self {
        HarkError::Config(err.to_string())
    }
}

/// A specialized `Result` type for Hark operations.
pub type Result<T> = std::result::Result<T, HarkError>;
