use serde::Serialize;

/// Closed catalog of every rejection the service can report.
///
/// Codes are aligned with HTTP status codes so the REST layer can use them
/// directly; callers should branch on the variant, not on the description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthorized,
    Forbidden,
    NotFound,
    ChannelLocked,
    SequencingFailure,
    RetentionNotExpired,
    RetentionInvalid,
    Validation,
    PayloadTooLarge,
    Internal,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 10] = [
        ErrorKind::Unauthorized,
        ErrorKind::Forbidden,
        ErrorKind::NotFound,
        ErrorKind::ChannelLocked,
        ErrorKind::SequencingFailure,
        ErrorKind::RetentionNotExpired,
        ErrorKind::RetentionInvalid,
        ErrorKind::Validation,
        ErrorKind::PayloadTooLarge,
        ErrorKind::Internal,
    ];

    pub fn code(self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::Forbidden | Self::ChannelLocked => 403,
            Self::NotFound => 404,
            Self::SequencingFailure => 409,
            Self::RetentionNotExpired | Self::RetentionInvalid | Self::Validation => 400,
            Self::PayloadTooLarge => 413,
            Self::Internal => 500,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Unauthorized => "The authorization header provided was not valid.",
            Self::Forbidden => {
                "The authorization header provided was valid, but the request was not authorized."
            }
            Self::NotFound => "The channel, API token, or other resource was not found.",
            Self::ChannelLocked => "Channel is locked.",
            Self::SequencingFailure => "Sequencing failure.",
            Self::RetentionNotExpired => "Retention period has not yet expired.",
            Self::RetentionInvalid => {
                "Invalid retention: max days should be greater than min days."
            }
            Self::Validation => "The request was not valid.",
            Self::PayloadTooLarge => "Payload too large.",
            Self::Internal => "Internal server error.",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}
