//! Settings Models
//!
//! Consumer configuration stored in config.json.

use std::time::Duration;

use plan_pipeline_core::request::DEFAULT_LOCALE;
use plan_pipeline_transport::{
    HttpTransportConfig, RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY,
};
use serde::{Deserialize, Serialize};

/// Environment variable that overrides the configured endpoint
pub const ENDPOINT_ENV_VAR: &str = "PLAN_PIPELINE_ENDPOINT";

/// Environment variable that overrides the configured bearer token
pub const TOKEN_ENV_VAR: &str = "PLAN_PIPELINE_TOKEN";

const REDACTED: &str = "********";

/// Endpoint used when nothing is configured
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000/api/v1/plans/generate";

/// Pipeline consumer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Generation endpoint (http or https)
    pub endpoint: String,
    /// Bearer token sent with every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Reconnect attempts after the first failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Pause before each reconnect, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Locale sent when the request does not set one
    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_connect_timeout_secs() -> u64 {
    plan_pipeline_transport::transport::DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY.as_millis() as u64
}

fn default_locale() -> String {
    DEFAULT_LOCALE.to_string()
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            auth_token: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            locale: default_locale(),
        }
    }
}

/// Settings update request (partial update)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsUpdate {
    pub endpoint: Option<String>,
    pub auth_token: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub locale: Option<String>,
}

impl PipelineSettings {
    /// Apply a partial update to the settings
    pub fn apply_update(&mut self, update: SettingsUpdate) {
        if let Some(endpoint) = update.endpoint {
            self.endpoint = endpoint;
        }
        if let Some(token) = update.auth_token {
            self.auth_token = Some(token);
        }
        if let Some(secs) = update.connect_timeout_secs {
            self.connect_timeout_secs = secs;
        }
        if let Some(retries) = update.max_retries {
            self.max_retries = retries;
        }
        if let Some(delay) = update.retry_delay_ms {
            self.retry_delay_ms = delay;
        }
        if let Some(locale) = update.locale {
            self.locale = locale;
        }
    }

    /// Apply `PLAN_PIPELINE_ENDPOINT` and `PLAN_PIPELINE_TOKEN` when they are set
    pub fn apply_env(&mut self) {
        self.apply_env_values(
            std::env::var(ENDPOINT_ENV_VAR).ok(),
            std::env::var(TOKEN_ENV_VAR).ok(),
        );
    }

    fn apply_env_values(&mut self, endpoint: Option<String>, token: Option<String>) {
        if let Some(endpoint) = endpoint.filter(|v| !v.trim().is_empty()) {
            self.endpoint = endpoint;
        }
        if let Some(token) = token.filter(|v| !v.trim().is_empty()) {
            self.auth_token = Some(token);
        }
    }

    /// Copy safe to print: the token is masked
    pub fn redacted(&self) -> Self {
        Self {
            auth_token: self.auth_token.as_ref().map(|_| REDACTED.to_string()),
            ..self.clone()
        }
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), String> {
        if self.endpoint.trim().is_empty() {
            return Err("endpoint is required".to_string());
        }

        let url = url::Url::parse(&self.endpoint)
            .map_err(|e| format!("Invalid endpoint {}: {}", self.endpoint, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!(
                "Invalid endpoint scheme: {}. Must be 'http' or 'https'",
                url.scheme()
            ));
        }

        if self.connect_timeout_secs == 0 {
            return Err("connect_timeout_secs must be at least 1 second".to_string());
        }

        if self.locale.trim().is_empty() {
            return Err("locale cannot be empty".to_string());
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn transport_config(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            auth_token: self.auth_token.clone(),
            ..Default::default()
        }
    }
}
