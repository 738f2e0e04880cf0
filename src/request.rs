use std::{collections::BTreeMap, fmt, time::Duration};

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE},
    Url,
};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::HttpError;

const JSON_MEDIA_TYPE: &str = "application/json";

/// HTTP methods the client dispatches.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describes one logical HTTP operation.
///
/// Builder-style: start from [`RequestDescriptor::new`] or a method shortcut
/// and chain setters. Problems such as an unserializable body are recorded and
/// reported as an [`HttpError::InvalidRequest`] envelope when executed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestDescriptor {
    url: String,
    method: Method,
    headers: Vec<(String, String)>,
    body: Option<JsonValue>,
    timeout_ms: Option<u64>,
    extras: BTreeMap<String, JsonValue>,
    invalid: Option<String>,
}

impl RequestDescriptor {
    /// Creates a `GET` descriptor for an absolute URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(url).method(Method::Post)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(url).method(Method::Put)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(url).method(Method::Patch)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(url).method(Method::Delete)
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Adds a header. Names are case-insensitive; a later value for the same
    /// name replaces an earlier one and any default.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    /// Serializes `body` to JSON.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => self.body = Some(value),
            Err(err) => {
                self.invalid
                    .get_or_insert_with(|| format!("body could not be serialized: {err}"));
            }
        }
        self
    }

    /// Per-attempt timeout in milliseconds. Must be positive.
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Attaches an opaque option for the transport. The client never reads it.
    pub fn extra(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.extras.insert(key.into(), value);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn http_method(&self) -> Method {
        self.method
    }

    /// Validates the descriptor and resolves everything every attempt reuses.
    pub(crate) fn prepare(&self, default_timeout_ms: u64) -> Result<PreparedRequest, HttpError> {
        if let Some(message) = &self.invalid {
            return Err(invalid(message.clone()));
        }

        let url = Url::parse(self.url.trim())
            .map_err(|err| invalid(format!("url '{}' is not absolute: {err}", self.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!(
                "unsupported url scheme '{}' in '{}'",
                url.scheme(),
                self.url
            )));
        }

        let timeout_ms = self.timeout_ms.unwrap_or(default_timeout_ms);
        if timeout_ms == 0 {
            return Err(invalid("timeout must be a positive number of milliseconds"));
        }

        let headers = merge_headers(&self.headers)?;
        let body = self
            .body
            .as_ref()
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|err| invalid(format!("body could not be serialized: {err}")))?;

        Ok(PreparedRequest {
            method: self.method,
            url,
            headers,
            body,
            timeout: Duration::from_millis(timeout_ms),
            extras: self.extras.clone(),
        })
    }
}

/// A validated request, identical for every attempt of one logical call.
#[derive(Clone, Debug)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
    pub extras: BTreeMap<String, JsonValue>,
}

/// Default JSON headers overlaid with caller headers; caller values win.
pub(crate) fn merge_headers(custom: &[(String, String)]) -> Result<HeaderMap, HttpError> {
    let mut headers = HeaderMap::with_capacity(custom.len() + 2);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_MEDIA_TYPE));
    headers.insert(ACCEPT, HeaderValue::from_static(JSON_MEDIA_TYPE));

    for (name, value) in custom {
        let header_name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| invalid(format!("invalid header name '{name}'")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| invalid(format!("invalid value for header '{name}'")))?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}

fn invalid(message: impl Into<String>) -> HttpError {
    HttpError::InvalidRequest {
        message: message.into(),
    }
}
