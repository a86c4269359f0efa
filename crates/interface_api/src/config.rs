//! API configuration

use serde::Deserialize;
use std::time::Duration;

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Database URL
    pub database_url: String,
    /// Log level
    pub log_level: String,
    /// Payment gateway base URL
    pub gateway_base_url: String,
    /// Payment gateway API key
    pub gateway_api_key: String,
    /// Shared secret for webhook signature verification
    pub gateway_webhook_secret: String,
    /// Bound on outbound gateway calls, in seconds
    pub gateway_timeout_secs: u64,
    /// Delay between background sweep passes, in seconds
    pub sweep_interval_secs: u64,
    /// Age past which an unresolved payment attempt is abandoned, in seconds
    pub abandon_after_secs: u64,
    /// Maximum rows per sweep pass
    pub sweep_batch_size: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: "postgres://localhost/billing".to_string(),
            log_level: "info".to_string(),
            gateway_base_url: "https://gateway.example.com".to_string(),
            gateway_api_key: "sk_test_change_me".to_string(),
            gateway_webhook_secret: "whsec_change_me".to_string(),
            gateway_timeout_secs: 10,
            sweep_interval_secs: 3600,
            abandon_after_secs: 24 * 3600,
            sweep_batch_size: 500,
        }
    }
}

impl ApiConfig {
    /// Loads configuration from `API_`-prefixed environment variables
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix("API"))
            .build()?
            .try_deserialize()
    }

    /// Returns the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn abandon_after(&self) -> Duration {
        Duration::from_secs(self.abandon_after_secs)
    }
}
