/// Core error type for the relay.
///
/// Adapter crates map their transport errors into this type so the pipeline
/// can tell storage failures (fatal to a cycle) from per-call delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote error {code}: {description}")]
    Remote { code: i64, description: String },

    #[error("external error: {0}")]
    External(String),

    #[error("task error: {0}")]
    Task(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::StorageUnavailable(e.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Task(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
