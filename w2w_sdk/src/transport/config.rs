use std::{env, time::Duration};
use url::Url;

use super::RelayError;

/// Connection settings of a [RelayTransport](super::RelayTransport)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayConfig {
    /// Base URL of the relay; endpoint paths are appended to it
    pub service_url: Url,
    pub request_timeout: Duration,
    /// Ask the relay to keep fetched messages until they are acknowledged
    pub keep_messages: bool,
}

impl RelayConfig {
    pub const URL_VAR: &'static str = "W2W_RELAY_URL";
    pub const TIMEOUT_VAR: &'static str = "W2W_RELAY_TIMEOUT_SECS";

    pub const DEFAULT_TIMEOUT: Duration = crate::http_client::DEFAULT_TIMEOUT;

    pub fn new(service_url: Url) -> Self {
        RelayConfig {
            service_url,
            request_timeout: Self::DEFAULT_TIMEOUT,
            keep_messages: true,
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_keep_messages(mut self, keep_messages: bool) -> Self {
        self.keep_messages = keep_messages;
        self
    }

    /// Read the configuration from `W2W_RELAY_URL` and `W2W_RELAY_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self, RelayError> {
        let service_url = env::var(Self::URL_VAR)
            .map_err(|_| RelayError::Config(Self::URL_VAR, "not set".to_string()))?;
        let service_url = Url::parse(&service_url)
            .map_err(|e| RelayError::Config(Self::URL_VAR, e.to_string()))?;

        let config = Self::new(service_url);

        match env::var(Self::TIMEOUT_VAR) {
            Ok(secs) => {
                let secs = secs
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| RelayError::Config(Self::TIMEOUT_VAR, e.to_string()))?;

                Ok(config.with_request_timeout(Duration::from_secs(secs)))
            }
            Err(_) => Ok(config),
        }
    }
}
