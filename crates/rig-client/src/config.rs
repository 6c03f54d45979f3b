//! Client configuration defaults.
//!
//! Settings come from the environment and are overridden by whatever the
//! caller passes to [`crate::ClientBuilder`]:
//!
//! - `RIG_HOST`: API endpoint, default `http://localhost:4747`
//! - `RIG_CLIENT_ID` / `RIG_CLIENT_SECRET`: client credentials for the
//!   initial login

use std::time::Duration;

use crate::auth::Credential;

pub const ENV_HOST: &str = "RIG_HOST";

pub const DEFAULT_HOST: &str = "http://localhost:4747";

/// Deadline for a unary call, in seconds. Streams are not bounded.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Connection setup timeout in seconds.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Idle read timeout for h2c connections, in seconds.
pub const H2C_KEEPALIVE_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub credential: Option<Credential>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            credential: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            host: lookup(ENV_HOST).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            credential: Credential::from_lookup(&lookup),
        }
    }

    /// Plain `http:` hosts are spoken to over h2c so bidi streams work.
    pub fn uses_h2c(&self) -> bool {
        self.host.starts_with("http:")
    }

    /// Default transport for this host.
    pub fn build_http_client(&self) -> reqwest::Result<reqwest::Client> {
        let builder =
            reqwest::Client::builder().connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS));
        let builder = if self.uses_h2c() {
            builder
                .http2_prior_knowledge()
                .http2_keep_alive_interval(Duration::from_secs(H2C_KEEPALIVE_SECS))
                .http2_keep_alive_timeout(Duration::from_secs(H2C_KEEPALIVE_SECS))
        } else {
            builder
        };
        builder.build()
    }
}
