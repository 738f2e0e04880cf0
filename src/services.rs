//! Call sites built on [`ResilientClient`]: chat proxy, CRM contact
//! submission and health probe.

use serde::Serialize;

use crate::{
    client::DEFAULT_MAX_RETRIES, HttpError, ReqwestTransport, RequestDescriptor, ResilientClient,
    ResponseEnvelope, ServiceConfig, Transport,
};

/// One client plus the configuration of the services it talks to.
#[derive(Clone, Debug)]
pub struct ServiceGateway<T = ReqwestTransport> {
    client: ResilientClient<T>,
    config: ServiceConfig,
}

impl<T: Transport> ServiceGateway<T> {
    pub fn new(client: ResilientClient<T>, config: ServiceConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &ResilientClient<T> {
        &self.client
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Forwards a chat payload to the chat API.
    ///
    /// Uses the outer retry layer, so provider outages (5xx) are retried on
    /// top of the client's transient retries.
    pub async fn chat<P>(&self, payload: &P) -> ResponseEnvelope
    where
        P: Serialize + ?Sized,
    {
        let url = self.config.chat_url();
        let timeout_ms = self.config.chat_timeout_ms;
        self.client
            .execute_with_retry(
                || {
                    RequestDescriptor::post(url.as_str())
                        .json(payload)
                        .timeout_ms(timeout_ms)
                },
                DEFAULT_MAX_RETRIES,
            )
            .await
    }

    /// Probes the chat API health endpoint.
    pub async fn health(&self) -> ResponseEnvelope {
        let descriptor =
            RequestDescriptor::get(self.config.health_url()).timeout_ms(self.config.health_timeout_ms);
        self.client.execute(&descriptor).await
    }

    /// Creates a contact in the CRM. Fields are passed through untouched.
    pub async fn submit_contact<C>(&self, contact: &C) -> ResponseEnvelope
    where
        C: Serialize + ?Sized,
    {
        let Some(url) = self.config.crm_contacts_url.as_deref() else {
            return ResponseEnvelope::failure(HttpError::InvalidRequest {
                message: "CRM_CONTACTS_URL is not configured".to_owned(),
            });
        };

        let mut descriptor = RequestDescriptor::post(url).json(contact);
        if let Some(token) = self.config.crm_api_token.as_deref() {
            descriptor = descriptor.header("Authorization", normalize_bearer_authorization(token));
        }
        self.client.execute(&descriptor).await
    }
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
