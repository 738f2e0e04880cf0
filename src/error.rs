use serde::Serialize;
use serde_json::Value as JsonValue;

/// Failure carried by a [`ResponseEnvelope`](crate::ResponseEnvelope).
///
/// Serializes as an object tagged by `kind`, so callers forwarding the
/// envelope to a browser get a stable shape whichever provider failed.
#[derive(Clone, Debug, PartialEq, thiserror::Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HttpError {
    /// Connection could not be established, was reset, or timed out.
    #[error("network error: {message}")]
    Network { message: String },
    /// HTTP 429 or a response explicitly signaling rate limiting.
    #[error("rate limited: {body}")]
    RateLimited {
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        body: JsonValue,
    },
    /// 4xx response other than 429.
    #[error("http error {status}: {body}")]
    Client { status: u16, body: JsonValue },
    /// 5xx response.
    #[error("server error {status}: {body}")]
    Server { status: u16, body: JsonValue },
    /// Transport failure that is not worth retrying.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// Every allowed attempt failed; `last` is the final failure.
    #[error("request failed after {attempts} attempts: {last}")]
    ExhaustedRetries { attempts: usize, last: Box<HttpError> },
    /// The request descriptor was rejected before anything was sent.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
}

impl HttpError {
    /// HTTP status reported for this failure, `None` for network-level errors.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { status, .. } => *status,
            Self::Client { status, .. } | Self::Server { status, .. } => Some(*status),
            Self::ExhaustedRetries { last, .. } => last.http_status(),
            Self::Network { .. } | Self::Transport { .. } | Self::InvalidRequest { .. } => None,
        }
    }

    /// Whether the inner retry loop may try again after this failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::RateLimited { .. })
    }
}

/// Classifies a network-level failure reported by a [`Transport`](crate::Transport).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransportErrorKind {
    /// DNS or TCP/TLS connection failure.
    Connect,
    /// The per-attempt timeout elapsed.
    Timeout,
    /// Connection dropped while sending the request or reading the body.
    Io,
    /// Anything else (redirect loops, builder errors, ...).
    Other,
}

/// Network-level failure returned by a transport instead of an HTTP response.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_connection_level(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::Connect | TransportErrorKind::Timeout | TransportErrorKind::Io
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_request() || err.is_body() {
            TransportErrorKind::Io
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, err.to_string())
    }
}

/// Error returned while loading [`ServiceConfig`](crate::ServiceConfig).
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is set but empty")]
    Empty { name: &'static str },
    #[error("{name} must be a positive integer, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },
}
