//! `[fetch]` section configuration.
//!
//! Applies to remote includes (`@import url(https://…)`).
//!
//! ```toml
//! [fetch]
//! timeout = 30        # Seconds per request
//! user_agent = "Mozilla/5.0 ..."
//! ```

use crate::config::ConfigDiagnostics;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Font CDNs pick the served format from the `User-Agent`; a modern
/// browser string gets woff2.
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:115.0) Gecko/20100101 Firefox/115.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Request timeout in seconds.
    pub timeout: u64,
    pub user_agent: String,
}

config_fields!(FetchConfig => FetchConfigFields, "fetch" { timeout, user_agent });

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: 30,
            user_agent: DEFAULT_USER_AGENT.into(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.timeout == 0 {
            diag.error(Self::FIELDS.timeout, "must be greater than zero");
        }
        if self.user_agent.trim().is_empty() {
            diag.error(Self::FIELDS.user_agent, "must not be empty");
        }
    }
}
