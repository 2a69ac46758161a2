//! # Domain Error Types
//!
//! The closed error taxonomy returned by every workflow operation.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::Location;

use serde_json::{json, Value};

/// Result type for workflow operations
pub type DomainResult<T> = std::result::Result<T, DomainError>;

/// Closed classification of workflow failures.
///
/// `Ok` is a soft success: the operation stopped early (for example on a lookup
/// miss) but must look successful to the caller so account existence does not
/// leak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidCredentials,
    Unauthorized,
    Internal,
    Validation,
    Conflict,
    NotFound,
    Ok,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidCredentials => "invalid_credentials",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Internal => "internal",
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Ok => "ok",
        }
    }

    /// Get the HTTP status code a transport should answer with for this kind
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::InvalidCredentials => 401,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Internal => 500,
            ErrorKind::Validation => 400,
            ErrorKind::Conflict => 409,
            ErrorKind::NotFound => 404,
            ErrorKind::Ok => 200,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const GENERIC_INTERNAL_MESSAGE: &str = "internal server error";

/// A classified workflow failure.
///
/// The kind is fixed at construction and never re-derived from the wrapped
/// cause. Metadata is for logs and diagnostics; only `Validation` details are
/// exposed through [`DomainError::public_body`].
#[derive(thiserror::Error, Debug)]
#[error("{kind}: {message}")]
pub struct DomainError {
    kind: ErrorKind,
    message: String,
    metadata: BTreeMap<String, Value>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
    location: &'static Location<'static>,
}

impl DomainError {
    /// Create an error of the given kind, recording the caller as capture site
    #[track_caller]
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
            metadata: BTreeMap::new(),
            source: None,
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub fn invalid_credentials<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::InvalidCredentials, message)
    }

    #[track_caller]
    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    #[track_caller]
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    #[track_caller]
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    #[track_caller]
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    #[track_caller]
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Soft success, see [`ErrorKind::Ok`]
    #[track_caller]
    pub fn ok<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Ok, message)
    }

    /// Attach a diagnostic key/value pair
    pub fn with_meta<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach the low-level cause (kept for logs only)
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Source file and line where this error was constructed
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn is_soft_success(&self) -> bool {
        self.kind == ErrorKind::Ok
    }

    /// Message safe to show an untrusted client
    pub fn public_message(&self) -> &str {
        match self.kind {
            ErrorKind::Internal => GENERIC_INTERNAL_MESSAGE,
            _ => &self.message,
        }
    }

    /// Body a transport can serialize verbatim
    pub fn public_body(&self) -> Value {
        let mut body = json!({
            "error": self.kind.as_str(),
            "message": self.public_message(),
        });
        if self.kind == ErrorKind::Validation && !self.metadata.is_empty() {
            body["details"] = json!(self.metadata);
        }
        body
    }
}

impl From<validator::ValidationErrors> for DomainError {
    #[track_caller]
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut err = DomainError::validation("request validation failed");
        for (field, field_errors) in errors.field_errors() {
            let messages: Vec<String> = field_errors
                .iter()
                .map(|e| {
                    e.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| e.code.to_string())
                })
                .collect();
            err = err.with_meta(field.to_string(), messages);
        }
        err
    }
}
