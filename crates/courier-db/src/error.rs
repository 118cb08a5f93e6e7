use courier_types::error::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("channel is locked")]
    ChannelLocked,
    #[error("token has unread messages pending")]
    SequencingFailure,
    #[error("retention period has not expired")]
    RetentionNotExpired,
    #[error("invalid retention window")]
    RetentionInvalid,
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("payload of {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error("connection pool unavailable: {0}")]
    Pool(String),
    #[error("credential hashing failed: {0}")]
    Credential(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Catalog entry this error is reported as.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Forbidden => ErrorKind::Forbidden,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::ChannelLocked => ErrorKind::ChannelLocked,
            Self::SequencingFailure => ErrorKind::SequencingFailure,
            Self::RetentionNotExpired => ErrorKind::RetentionNotExpired,
            Self::RetentionInvalid => ErrorKind::RetentionInvalid,
            Self::Validation(_) => ErrorKind::Validation,
            Self::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            Self::Database(_) | Self::Pool(_) | Self::Credential(_) => ErrorKind::Internal,
        }
    }
}
