use thiserror::Error;

/// Every failure is fatal to a run: nothing is retried and no partial timing is reported.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("bulk load task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("backend {0} not found in registry")]
    UnknownBackend(String),
    #[error("backend {0} used before prepare")]
    NotPrepared(&'static str),
    #[error("malformed backend reply: {0}")]
    Malformed(String),
}

impl From<figment::Error> for Error {
    fn from(e: figment::Error) -> Self {
        Error::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
