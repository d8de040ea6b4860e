use thiserror::Error;

/// Errors raised while reading the plugin's directive block
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("line {line}: wrong argument count or unexpected line ending after '{directive}'")]
    MissingArgument { directive: String, line: usize },

    #[error("line {line}: unknown property '{token}'")]
    UnknownProperty { token: String, line: usize },

    #[error("line {line}: unexpected token '{token}'")]
    UnexpectedToken { token: String, line: usize },

    #[error("unexpected end of input, block opened on line {line} is never closed")]
    UnterminatedBlock { line: usize },
}

/// Errors that abort plugin setup. None of these leave a registered plugin behind.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("sqlite3: {0}")]
    Config(#[from] ConfigError),

    #[error("sqlite3: failed to open database: {0}")]
    Connection(String),

    #[error("sqlite3: database is not reachable: {0}")]
    Connectivity(String),

    #[error("sqlite3: initial zone load failed: {0}")]
    Store(#[from] StoreError),

    #[error("sqlite3: metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Query-time storage failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("malformed row: {0}")]
    MalformedRow(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) => {
                StoreError::MalformedRow(err.to_string())
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

/// Errors surfaced by a handler in the chain
#[derive(Error, Debug, Clone)]
pub enum HandlerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, HandlerError>;
