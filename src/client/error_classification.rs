//! Error classification logic
//!
//! Provider adapters report failures in whatever shape their transport produced them.
//! [`classify`] folds those shapes into the closed [`ErrorKind`] taxonomy and decides
//! whether the failure is worth another attempt. Rules are evaluated in order and the
//! first match wins; anything unrecognized is treated as a non-retryable network error.

use crate::error::{Error, ErrorContext, ErrorKind};
use std::fmt;

/// Connection-level failure modes (no HTTP exchange completed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionFailure {
    Timeout,
    Refused,
    Dns,
    Reset,
}

impl fmt::Display for ConnectionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionFailure::Timeout => "timeout",
            ConnectionFailure::Refused => "connection refused",
            ConnectionFailure::Dns => "dns resolution failed",
            ConnectionFailure::Reset => "connection reset",
        };
        f.write_str(s)
    }
}

/// An opaque failure as reported by a provider adapter, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The connection could not be established or was dropped.
    Connection {
        reason: ConnectionFailure,
        message: String,
    },
    /// The provider answered with a non-success HTTP status.
    Http { status: u16, message: String },
    /// The payload could not be decoded (JSON or structural mismatch).
    Decode { message: String },
    /// An error that has already been classified upstream.
    Classified(Error),
    /// Anything else.
    Other { message: String },
}

impl Failure {
    pub fn connection(reason: ConnectionFailure, message: impl Into<String>) -> Self {
        Failure::Connection {
            reason,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::connection(ConnectionFailure::Timeout, message)
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Failure::Http {
            status,
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Failure::Decode {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Failure::Other {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Failure::Connection { message, .. }
            | Failure::Http { message, .. }
            | Failure::Decode { message }
            | Failure::Other { message } => message,
            Failure::Classified(err) => err.message(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Failure::Http { status, .. } => Some(*status),
            Failure::Classified(err) => err.context().status_code,
            _ => None,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Connection { reason, message } => write!(f, "{}: {}", reason, message),
            Failure::Http { status, message } => write!(f, "HTTP {}: {}", status, message),
            Failure::Decode { message } => write!(f, "decode failure: {}", message),
            Failure::Classified(err) => write!(f, "{}", err),
            Failure::Other { message } => f.write_str(message),
        }
    }
}

impl std::error::Error for Failure {}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        Failure::Classified(err)
    }
}

impl From<serde_json::Error> for Failure {
    fn from(err: serde_json::Error) -> Self {
        Failure::decode(err.to_string())
    }
}

impl From<std::io::Error> for Failure {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;
        let reason = match err.kind() {
            Io::TimedOut => Some(ConnectionFailure::Timeout),
            Io::ConnectionRefused => Some(ConnectionFailure::Refused),
            Io::ConnectionReset | Io::ConnectionAborted | Io::BrokenPipe => {
                Some(ConnectionFailure::Reset)
            }
            _ => None,
        };
        match reason {
            Some(reason) => Failure::connection(reason, err.to_string()),
            None => Failure::other(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for Failure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Failure::timeout(err.to_string());
        }
        if err.is_connect() {
            // reqwest does not separate DNS failures from refused connections.
            let text = err.to_string();
            let reason = if text.to_lowercase().contains("dns") {
                ConnectionFailure::Dns
            } else {
                ConnectionFailure::Refused
            };
            return Failure::connection(reason, text);
        }
        if let Some(status) = err.status() {
            return Failure::http(status.as_u16(), err.to_string());
        }
        if err.is_decode() {
            return Failure::decode(err.to_string());
        }
        Failure::other(err.to_string())
    }
}

/// Result of classifying a [`Failure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    pub status: Option<u16>,
}

impl Classification {
    fn new(kind: ErrorKind, message: &str, retryable: bool, status: Option<u16>) -> Self {
        Self {
            kind,
            message: message.to_string(),
            retryable,
            status,
        }
    }

    pub fn into_error(self) -> Error {
        let mut context = ErrorContext::new().with_source("error_classifier");
        if let Some(status) = self.status {
            context = context.with_status_code(status);
        }
        Error::new(self.kind, self.message)
            .with_retryable(self.retryable)
            .with_context(context)
    }
}

/// Classify an adapter failure. Pure: no logging, no side effects.
pub fn classify(failure: &Failure) -> Classification {
    if let Failure::Classified(err) = failure {
        return Classification::new(
            err.kind(),
            err.message(),
            err.is_retryable(),
            err.context().status_code,
        );
    }

    let message = failure.message();
    let status = failure.status();
    let lowered = message.to_lowercase();

    if let Failure::Connection { .. } = failure {
        return Classification::new(ErrorKind::Network, message, true, None);
    }
    if status == Some(401) {
        return Classification::new(ErrorKind::Authentication, message, false, status);
    }
    if status == Some(429) || lowered.contains("rate limit") {
        return Classification::new(ErrorKind::Api, message, true, status);
    }
    if lowered.contains("timeout") {
        let kind = if status.is_some() {
            ErrorKind::Api
        } else {
            ErrorKind::Network
        };
        return Classification::new(kind, message, true, status);
    }
    if let Some(code) = status {
        let retryable = (500..=599).contains(&code);
        return Classification::new(ErrorKind::Api, message, retryable, status);
    }
    if let Failure::Decode { .. } = failure {
        return Classification::new(ErrorKind::Parse, message, false, None);
    }
    Classification::new(ErrorKind::Network, message, false, None)
}

/// Shorthand for `classify(failure).into_error()`.
pub fn classify_error(failure: &Failure) -> Error {
    classify(failure).into_error()
}
