use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::HttpError;

/// Status reported when no HTTP response was received.
pub const SYNTHETIC_FAILURE_STATUS: u16 = 500;

/// Uniform result of one logical HTTP operation.
///
/// Exactly one of [`data`](Self::data) and [`error`](Self::error) is present,
/// matching [`success`](Self::success).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResponseEnvelope {
    success: bool,
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<HttpError>,
}

impl ResponseEnvelope {
    pub fn success(data: JsonValue, status: u16) -> Self {
        Self {
            success: true,
            status,
            data: Some(data),
            error: None,
        }
    }

    /// Builds a failure envelope. The status falls back to 500 when the error
    /// carries no HTTP status.
    pub fn failure(error: HttpError) -> Self {
        let status = error.http_status().unwrap_or(SYNTHETIC_FAILURE_STATUS);
        Self {
            success: false,
            status,
            data: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn data(&self) -> Option<&JsonValue> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&HttpError> {
        self.error.as_ref()
    }

    /// Whether the failure status is a client error (`400..500`).
    pub fn is_client_error(&self) -> bool {
        !self.success && (400..500).contains(&self.status)
    }

    /// Converts the envelope into a `Result` for callers that prefer `?`.
    pub fn into_result(self) -> Result<JsonValue, HttpError> {
        match (self.data, self.error) {
            (Some(data), None) => Ok(data),
            (_, Some(error)) => Err(error),
            (None, None) => Ok(JsonValue::Null),
        }
    }
}
