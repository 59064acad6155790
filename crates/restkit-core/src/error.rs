use std::fmt::{Display, Formatter};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::http_client::{HttpError, HttpErrorKind, HttpMethod};

/// One step in a field path: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(value: &str) -> Self {
        Self::Key(value.to_owned())
    }
}

impl From<String> for PathSegment {
    fn from(value: String) -> Self {
        Self::Key(value)
    }
}

impl From<usize> for PathSegment {
    fn from(value: usize) -> Self {
        Self::Index(value)
    }
}

/// Single field-level schema mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub path: Vec<PathSegment>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<String>,
}

impl ValidationIssue {
    pub fn new(path: Vec<PathSegment>, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
            expected: None,
            received: None,
        }
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn with_received(mut self, received: impl Into<String>) -> Self {
        self.received = Some(received.into());
        self
    }

    /// Dotted rendering of the path, e.g. `results[3].id`. The root renders as `$`.
    pub fn path_string(&self) -> String {
        if self.path.is_empty() {
            return String::from("$");
        }

        let mut rendered = String::new();
        for segment in &self.path {
            match segment {
                PathSegment::Key(key) => {
                    if !rendered.is_empty() {
                        rendered.push('.');
                    }
                    rendered.push_str(key);
                }
                PathSegment::Index(index) => {
                    rendered.push_str(&format!("[{index}]"));
                }
            }
        }
        rendered
    }
}

impl Display for ValidationIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path_string(), self.message)
    }
}

/// Identifies the operation whose response failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationMeta {
    pub operation: String,
    pub method: HttpMethod,
    pub path: String,
}

/// Response payload did not match the declared shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    issues: Vec<ValidationIssue>,
    operation: Option<OperationMeta>,
}

impl ValidationError {
    pub fn new(issues: Vec<ValidationIssue>) -> Self {
        Self {
            issues,
            operation: None,
        }
    }

    pub fn single(issue: ValidationIssue) -> Self {
        Self::new(vec![issue])
    }

    pub fn with_operation(mut self, operation: OperationMeta) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<ValidationIssue> {
        self.issues
    }

    pub fn operation(&self) -> Option<&OperationMeta> {
        self.operation.as_ref()
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "response failed validation with {} issue(s)", self.issues.len())?;
        if let Some(operation) = &self.operation {
            write!(
                f,
                " in '{}' ({} {})",
                operation.operation, operation.method, operation.path
            )?;
        }
        if let Some(first) = self.issues.first() {
            write!(f, "; first: {first}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Transport failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Status,
    Decode,
    Other,
}

/// Network failure, non-2xx status, undecodable body or timeout.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    status: Option<u16>,
    body: Option<String>,
    parsed_body: Option<Value>,
}

impl TransportError {
    fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            body: None,
            parsed_body: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }

    pub fn decode(status: u16, body: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            body: Some(body.into()),
            ..Self::new(TransportErrorKind::Decode, message)
        }
    }

    /// Non-2xx response. The body is kept verbatim and additionally parsed as
    /// JSON when possible.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let parsed_body = serde_json::from_str::<Value>(&body).ok();
        Self {
            status: Some(status),
            body: (!body.is_empty()).then_some(body),
            parsed_body,
            ..Self::new(
                TransportErrorKind::Status,
                format!("upstream returned status {status}"),
            )
        }
    }

    pub const fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn status_code(&self) -> Option<u16> {
        self.status
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn parsed_body(&self) -> Option<&Value> {
        self.parsed_body.as_ref()
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

impl From<HttpError> for TransportError {
    fn from(error: HttpError) -> Self {
        match error.kind() {
            HttpErrorKind::Timeout => Self::timeout(error.message()),
            HttpErrorKind::Connect => Self::connect(error.message()),
            HttpErrorKind::Other => Self::other(error.message()),
        }
    }
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)?;
        if let (TransportErrorKind::Status, Some(body)) = (self.kind, &self.body) {
            write!(f, ": {body}")?;
        }
        Ok(())
    }
}

impl std::error::Error for TransportError {}

/// Caller arguments could not be normalized into the declared parameter map.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("operation '{operation}' is not declared on resource '{resource}'")]
    UnknownOperation { resource: String, operation: String },

    #[error("operation '{operation}' accepts at most {expected} argument(s), received {received}")]
    TooManyArguments {
        operation: String,
        expected: usize,
        received: usize,
    },

    #[error("operation '{operation}' requires parameter '{name}'")]
    MissingParameter { operation: String, name: String },

    #[error("operation '{operation}' has no parameter named '{name}'")]
    UnknownParameter { operation: String, name: String },

    #[error("parameter '{name}' of '{operation}' is invalid: {detail}")]
    InvalidParameterType {
        operation: String,
        name: String,
        detail: String,
    },

    #[error("request body of '{operation}' failed validation with {} issue(s)", .issues.len())]
    InvalidBody {
        operation: String,
        issues: Vec<ValidationIssue>,
    },
}

/// Client configuration could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no API base URL configured; call configure() or set RESTKIT_BASE_URL")]
    MissingBaseUrl,

    #[error("base URL must start with http:// or https://: '{value}'")]
    InvalidBaseUrl { value: String },

    #[error("timeout must be a positive number of milliseconds: '{value}'")]
    InvalidTimeout { value: String },

    #[error("header name '{name}' is not a valid HTTP token")]
    InvalidHeader { name: String },
}

/// Coarse error classification for callers that branch on failure type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Validation,
    Argument,
    Config,
}

/// Every failure a fetcher or query handle can surface.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Argument(#[from] ArgumentError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ApiError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Transport,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Argument(_) => ErrorKind::Argument,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(error) => Some(error),
            _ => None,
        }
    }

    pub fn as_transport(&self) -> Option<&TransportError> {
        match self {
            Self::Transport(error) => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_string_renders_keys_and_indices() {
        let issue = ValidationIssue::new(
            vec!["results".into(), 3.into(), "id".into()],
            "field is required",
        );
        assert_eq!(issue.path_string(), "results[3].id");
        assert_eq!(ValidationIssue::new(Vec::new(), "x").path_string(), "$");
    }

    #[test]
    fn status_error_parses_json_body_best_effort() {
        let error = TransportError::status(422, r#"{"detail":"bad slug"}"#);
        assert_eq!(error.kind(), TransportErrorKind::Status);
        assert_eq!(error.status_code(), Some(422));
        assert_eq!(
            error.parsed_body().and_then(|body| body.get("detail")),
            Some(&serde_json::json!("bad slug"))
        );

        let plain = TransportError::status(502, "bad gateway");
        assert_eq!(plain.body(), Some("bad gateway"));
        assert!(plain.parsed_body().is_none());
    }

    #[test]
    fn validation_error_display_names_operation_and_first_issue() {
        let error = ValidationError::single(
            ValidationIssue::new(vec!["id".into()], "field is required"),
        )
        .with_operation(OperationMeta {
            operation: String::from("products.retrieve"),
            method: HttpMethod::Get,
            path: String::from("/shop/products/7/"),
        });

        let rendered = error.to_string();
        assert!(rendered.contains("products.retrieve"));
        assert!(rendered.contains("id: field is required"));
    }

    #[test]
    fn api_error_kind_tracks_variant() {
        let error = ApiError::from(ConfigError::MissingBaseUrl);
        assert_eq!(error.kind(), ErrorKind::Config);
        assert!(error.as_validation().is_none());
    }
}
