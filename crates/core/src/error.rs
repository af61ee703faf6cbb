use thiserror::Error;

#[derive(Error, Debug)]
pub enum LeadNavError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("gzip stream could not be decompressed: {0}")]
    Gzip(String),
    #[error("input is empty or has no header row")]
    EmptyInput,
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("ingest cancelled by owner")]
    Cancelled,
    #[error("unknown dataset kind: {0}")]
    UnknownKind(String),
    #[error("answering backend error: {0}")]
    Backend(String),
    #[error("other: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, LeadNavError>;

impl From<anyhow::Error> for LeadNavError {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(value.to_string())
    }
}
