use thiserror::Error;

/// Failure reported by the storage service.
///
/// Carries an HTTP-like status code next to the message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ClientError {
    pub status: u16,
    pub message: String,
}

impl ClientError {
    pub const BAD_REQUEST: u16 = 400;

    pub const NOT_FOUND: u16 = 404;

    pub const INTERNAL: u16 = 500;

    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(Self::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Self::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Self::NOT_FOUND
    }
}
