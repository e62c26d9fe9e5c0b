use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorefrontError {
    #[error("invalid table name: {0}")]
    InvalidTable(String),

    #[error("item for table '{table}' is missing its '{field}' field")]
    MissingPartitionKey { table: String, field: String },

    #[error("store error: {0}")]
    Store(String),

    #[error("remote store returned {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("invalid config: {0}")]
    Config(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
