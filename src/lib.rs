//! `resilient-http` is an async HTTP client that hides transient failures
//! behind a uniform [`ResponseEnvelope`].
//!
//! - [`ResilientClient::execute`] retries rate limiting and connection-level
//!   failures with exponential backoff (1s, 2s, 4s by default).
//! - [`ResilientClient::execute_with_retry`] adds an outer layer that also
//!   retries provider outages (5xx) and stops on client errors (4xx).
//! - [`ServiceGateway`] wires the chat, contact and health call sites onto one
//!   client from an explicit [`ServiceConfig`].

mod client;
mod config;
mod envelope;
mod error;
mod options;
mod request;
mod services;
mod transport;

pub use client::{ResilientClient, DEFAULT_MAX_RETRIES};
pub use config::{
    ServiceConfig, DEFAULT_CHAT_API_URL, DEFAULT_CHAT_TIMEOUT_MS, DEFAULT_HEALTH_TIMEOUT_MS,
};
pub use envelope::{ResponseEnvelope, SYNTHETIC_FAILURE_STATUS};
pub use error::{ConfigError, HttpError, TransportError, TransportErrorKind};
pub use options::ClientOptions;
pub use request::{Method, PreparedRequest, RequestDescriptor};
pub use services::ServiceGateway;
pub use transport::{RawResponse, ReqwestTransport, Transport};

pub type Result<T> = std::result::Result<T, ConfigError>;
