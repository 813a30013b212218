//! API error taxonomy and JSON error bodies

use crate::probe::ProbeError;
use crate::store::StoreError;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{Response, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};

/// Stable machine-readable error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorCode {
    /// Malformed or incomplete request
    InvalidRequest,
    /// `lang` is not a supported language
    InvalidLanguage,
    /// Submitted values failed form validation
    ValidationFailed,
    /// Record, page or route does not exist
    NotFound,
    /// Route exists but not for this method
    MethodNotAllowed,
    /// Domain + path pattern already taken
    Conflict,
    /// Hostname resolved to no addresses
    DnsResolutionFailed,
    /// Hostname lookup failed during a connection test
    HostNotFound,
    ConnectionRefused,
    HostUnreachable,
    ConnectionTimeout,
    /// Any other connect failure
    ConnectionFailed,
    InternalError,
}

impl ApiErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ApiErrorCode::InvalidLanguage => StatusCode::BAD_REQUEST,
            ApiErrorCode::ValidationFailed => StatusCode::BAD_REQUEST,
            ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiErrorCode::Conflict => StatusCode::CONFLICT,
            ApiErrorCode::DnsResolutionFailed => StatusCode::NOT_FOUND,
            ApiErrorCode::HostNotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::ConnectionRefused => StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorCode::HostUnreachable => StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorCode::ConnectionTimeout => StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorCode::ConnectionFailed => StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiErrorCode::InvalidRequest => "INVALID_REQUEST",
            ApiErrorCode::InvalidLanguage => "INVALID_LANGUAGE",
            ApiErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ApiErrorCode::NotFound => "NOT_FOUND",
            ApiErrorCode::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ApiErrorCode::Conflict => "CONFLICT",
            ApiErrorCode::DnsResolutionFailed => "DNS_RESOLUTION_FAILED",
            ApiErrorCode::HostNotFound => "HOST_NOT_FOUND",
            ApiErrorCode::ConnectionRefused => "CONNECTION_REFUSED",
            ApiErrorCode::HostUnreachable => "HOST_UNREACHABLE",
            ApiErrorCode::ConnectionTimeout => "CONNECTION_TIMEOUT",
            ApiErrorCode::ConnectionFailed => "CONNECTION_FAILED",
            ApiErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// Error raised by a request handler
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    BadRequest { code: ApiErrorCode, message: String },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    MethodNotAllowed(String),
    #[error("{0}")]
    Conflict(String),
    /// DNS or TCP probe failure
    #[error(transparent)]
    Downstream(ProbeError),
    #[error("{message}")]
    Internal { message: String, details: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            code: ApiErrorCode::InvalidRequest,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>, details: impl ToString) -> Self {
        ApiError::Internal {
            message: message.into(),
            details: details.to_string(),
        }
    }

    pub fn code(&self) -> ApiErrorCode {
        match self {
            ApiError::BadRequest { code, .. } => *code,
            ApiError::NotFound(_) => ApiErrorCode::NotFound,
            ApiError::MethodNotAllowed(_) => ApiErrorCode::MethodNotAllowed,
            ApiError::Conflict(_) => ApiErrorCode::Conflict,
            ApiError::Downstream(probe) => match probe {
                ProbeError::NoAddresses { .. } => ApiErrorCode::DnsResolutionFailed,
                ProbeError::HostNotFound { .. } => ApiErrorCode::HostNotFound,
                ProbeError::Refused { .. } => ApiErrorCode::ConnectionRefused,
                ProbeError::Unreachable { .. } => ApiErrorCode::HostUnreachable,
                ProbeError::Timeout { .. } => ApiErrorCode::ConnectionTimeout,
                ProbeError::Io { .. } => ApiErrorCode::ConnectionFailed,
                _ => ApiErrorCode::InvalidRequest,
            },
            ApiError::Internal { .. } => ApiErrorCode::InternalError,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.code().status_code()
    }

    /// Body for this error in the given envelope
    pub fn body(&self, envelope: Envelope) -> ErrorResponse {
        let mut context = Map::new();
        let details = match self {
            ApiError::Internal { details, .. } => Some(details.clone()),
            ApiError::Downstream(probe) => {
                match probe {
                    ProbeError::NoAddresses { hostname, elapsed_ms } => {
                        context.insert("hostname".to_string(), Value::from(hostname.clone()));
                        context.insert("responseTime".to_string(), Value::from(*elapsed_ms));
                    }
                    other => {
                        if let Some(ms) = other.elapsed_ms() {
                            context.insert("totalTime".to_string(), Value::from(ms));
                        }
                    }
                }
                probe.details()
            }
            _ => None,
        };

        ErrorResponse {
            success: match envelope {
                Envelope::Record => Some(false),
                Envelope::Plain => None,
            },
            error: self.to_string(),
            code: self.code(),
            details,
            context,
        }
    }

    pub fn to_response(&self, envelope: Envelope) -> Response<Full<Bytes>> {
        let body = self.body(envelope).to_json();
        Response::builder()
            .status(self.status_code())
            .header(CONTENT_TYPE, "application/json")
            .header("X-Console-Error", self.code().as_str())
            .body(Full::new(Bytes::from(body)))
            .expect("valid response with StatusCode enum and static headers")
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => ApiError::Conflict(err.to_string()),
            StoreError::NotFound => ApiError::NotFound(err.to_string()),
        }
    }
}

impl From<ProbeError> for ApiError {
    fn from(err: ProbeError) -> Self {
        if err.is_invalid_input() {
            ApiError::bad_request(err.to_string())
        } else {
            ApiError::Downstream(err)
        }
    }
}

/// Which error body shape a route family uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    /// `{success: false, error, ...}` for record routes
    Record,
    /// `{error, details?, ...}` for meta-info and probe routes
    Plain,
}

/// JSON error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    /// Stable user-facing message
    pub error: String,
    pub code: ApiErrorCode,
    /// Underlying cause, for diagnostics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(flatten)]
    pub context: Map<String, Value>,
}

impl ErrorResponse {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"{}","code":"{}"}}"#,
                self.error.replace('"', "\\\""),
                self.code.as_str()
            )
        })
    }
}
