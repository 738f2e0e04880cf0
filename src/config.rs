use crate::{ConfigError, Result};

pub const DEFAULT_CHAT_API_URL: &str = "http://localhost:8000";
/// AI-processing calls can take a while.
pub const DEFAULT_CHAT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_HEALTH_TIMEOUT_MS: u64 = 5_000;

/// Endpoints and timeouts for the services reached through the client.
///
/// Built once by the hosting process (or per request) and handed to
/// [`ServiceGateway`](crate::ServiceGateway); nothing is cached globally.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Base URL of the chat API, without trailing slash.
    pub chat_api_url: String,
    pub chat_timeout_ms: u64,
    pub health_timeout_ms: u64,
    /// Contact-creation endpoint of the CRM. Submission is refused when unset.
    pub crm_contacts_url: Option<String>,
    /// Raw CRM token; a `Bearer ` prefix is added when missing.
    pub crm_api_token: Option<String>,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("chat_api_url", &self.chat_api_url)
            .field("chat_timeout_ms", &self.chat_timeout_ms)
            .field("health_timeout_ms", &self.health_timeout_ms)
            .field("crm_contacts_url", &self.crm_contacts_url)
            .field(
                "crm_api_token",
                &self.crm_api_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            chat_api_url: DEFAULT_CHAT_API_URL.to_owned(),
            chat_timeout_ms: DEFAULT_CHAT_TIMEOUT_MS,
            health_timeout_ms: DEFAULT_HEALTH_TIMEOUT_MS,
            crm_contacts_url: None,
            crm_api_token: None,
        }
    }
}

impl ServiceConfig {
    /// Reads configuration from the process environment.
    ///
    /// Reads:
    /// - `CHAT_API_URL` (default `http://localhost:8000`)
    /// - `CHAT_API_TIMEOUT_MS` (default `30000`)
    /// - `HEALTH_TIMEOUT_MS` (default `5000`)
    /// - `CRM_CONTACTS_URL`, `CRM_API_TOKEN` (optional)
    ///
    /// Unset variables fall back to defaults; set-but-empty ones are errors.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use resilient_http::ServiceConfig;
    ///
    /// let config = ServiceConfig::from_env().expect("invalid service configuration");
    /// ```
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &'static str| -> Result<Option<String>> {
            match lookup(name) {
                None => Ok(None),
                Some(value) if value.trim().is_empty() => Err(ConfigError::Empty { name }),
                Some(value) => Ok(Some(value.trim().to_owned())),
            }
        };
        let read_ms = |name: &'static str, default: u64| -> Result<u64> {
            match read(name)? {
                None => Ok(default),
                Some(value) => match value.parse::<u64>() {
                    Ok(ms) if ms > 0 => Ok(ms),
                    _ => Err(ConfigError::InvalidNumber { name, value }),
                },
            }
        };

        let chat_api_url = read("CHAT_API_URL")?
            .map(|url| url.trim_end_matches('/').to_owned())
            .unwrap_or_else(|| DEFAULT_CHAT_API_URL.to_owned());

        Ok(Self {
            chat_api_url,
            chat_timeout_ms: read_ms("CHAT_API_TIMEOUT_MS", DEFAULT_CHAT_TIMEOUT_MS)?,
            health_timeout_ms: read_ms("HEALTH_TIMEOUT_MS", DEFAULT_HEALTH_TIMEOUT_MS)?,
            crm_contacts_url: read("CRM_CONTACTS_URL")?,
            crm_api_token: read("CRM_API_TOKEN")?,
        })
    }

    pub fn chat_url(&self) -> String {
        format!("{}/chat", self.chat_api_url)
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.chat_api_url)
    }
}
