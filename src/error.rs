//! 错误分类体系：封闭的错误种类集合与统一错误类型。
//!
//! Closed error taxonomy for the relay runtime.
//!
//! Every failure that leaves this crate carries exactly one [`ErrorKind`]. Provider-specific
//! failure shapes never reach the caller; they are normalized by
//! [`crate::client::error_classification::classify`] first.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The closed set of failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Api,
    Authentication,
    Configuration,
    Parse,
    Stream,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Api => "api",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Parse => "parse",
            ErrorKind::Stream => "stream",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// HTTP status reported by the provider, when there was one.
    pub status_code: Option<u16>,
    /// Component that produced the error (e.g. "retry_executor", "sse_decoder").
    pub source: Option<String>,
    /// Free-form details (provider name, attempt count, ...).
    pub details: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status_code(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(status) = ctx.status_code {
        parts.push(format!("status: {}", status));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

/// Unified error type for the relay runtime.
///
/// The kind is fixed at construction; there is no setter for it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}{}", format_context(.context))]
pub struct Error {
    kind: ErrorKind,
    message: String,
    retryable: bool,
    context: ErrorContext,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: false,
            context: ErrorContext::new(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Api, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn stream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Stream, message)
    }

    /// Fallback used wherever a failure cannot be attributed to anything known.
    pub fn unknown() -> Self {
        Self::network("Unknown error")
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = context;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// Re-tag an error with a different kind, keeping message and context.
    ///
    /// Used by the stream decoder, which reports every transport failure as `Stream`.
    pub(crate) fn into_kind(self, kind: ErrorKind) -> Self {
        Self { kind, ..self }
    }
}
