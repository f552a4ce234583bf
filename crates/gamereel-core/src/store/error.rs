use std::fmt;

use crate::retry::{classify_io_error, ErrorKind, Retryable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    Timeout,
    Connection,
    Throttled,
    /// Retryable server-side failure (5xx).
    Server,
    /// Fewer bytes than requested came back.
    ShortRead,
    NotFound,
    /// The backend can't do this (e.g. upload to an HTTP source).
    Unsupported,
    Other,
}

impl StoreErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            StoreErrorKind::Timeout => "timeout",
            StoreErrorKind::Connection => "connection",
            StoreErrorKind::Throttled => "throttled",
            StoreErrorKind::Server => "server error",
            StoreErrorKind::ShortRead => "short read",
            StoreErrorKind::NotFound => "not found",
            StoreErrorKind::Unsupported => "unsupported",
            StoreErrorKind::Other => "store error",
        }
    }
}

/// A failed store call, classified for the retry layer.
#[derive(Debug, Clone)]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(key: &str) -> Self {
        Self::new(StoreErrorKind::NotFound, format!("no such object: {}", key))
    }

    pub fn unsupported(what: &str) -> Self {
        Self::new(StoreErrorKind::Unsupported, what.to_string())
    }

    pub fn from_io(context: &str, e: &std::io::Error) -> Self {
        let kind = match e.kind() {
            std::io::ErrorKind::NotFound => StoreErrorKind::NotFound,
            _ => match classify_io_error(e) {
                ErrorKind::Timeout => StoreErrorKind::Timeout,
                ErrorKind::Connection => StoreErrorKind::Connection,
                _ => StoreErrorKind::Other,
            },
        };
        Self::new(kind, format!("{}: {}", context, e))
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == StoreErrorKind::NotFound
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for StoreError {}

impl Retryable for StoreError {
    fn retry_kind(&self) -> ErrorKind {
        match self.kind {
            StoreErrorKind::Timeout => ErrorKind::Timeout,
            StoreErrorKind::Connection | StoreErrorKind::ShortRead => ErrorKind::Connection,
            StoreErrorKind::Throttled => ErrorKind::Throttled,
            StoreErrorKind::Server => ErrorKind::Http5xx(500),
            StoreErrorKind::NotFound | StoreErrorKind::Unsupported | StoreErrorKind::Other => {
                ErrorKind::Other
            }
        }
    }
}
