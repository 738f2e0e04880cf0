use std::{future::Future, sync::Arc};

use crate::{PreparedRequest, TransportError};

/// Raw HTTP response captured by a transport, before classification.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Sends one attempt over the network.
///
/// Implementations must honor [`PreparedRequest::timeout`] and report
/// network-level failures as [`TransportError`]; any HTTP response, whatever
/// its status, is returned as `Ok`.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: &PreparedRequest,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn send(
        &self,
        request: &PreparedRequest,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send {
        (**self).send(request)
    }
}

/// [`Transport`] backed by a pooled `reqwest::Client`.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing client, e.g. one configured with proxies or TLS roots.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Transport for ReqwestTransport {
    fn send(
        &self,
        request: &PreparedRequest,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send {
        let mut builder = self
            .http
            .request(request.method.to_reqwest(), request.url.clone())
            .headers(request.headers.clone())
            .timeout(request.timeout);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        async move {
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok::<_, TransportError>(RawResponse { status, body })
        }
    }
}
