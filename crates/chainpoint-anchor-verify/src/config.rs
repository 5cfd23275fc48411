//! Verifier configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::explorer::{ESPLORA_TESTNET_URL, ESPLORA_URL};
use crate::http::HTTP_REQUEST_TIMEOUT;

/// Configuration parameters controlling where and how anchors are checked
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Timeout of a single HTTP request, in seconds
    pub http_timeout_secs: u64,
    /// Deadline for a whole verification, in seconds. Elapsing counts as cancellation.
    pub timeout_secs: Option<u64>,
    /// Esplora REST API used to cross-check mainnet Bitcoin anchors
    pub esplora_url: String,
    /// Esplora REST API used to cross-check testnet Bitcoin anchors
    pub esplora_testnet_url: Option<String>,
    /// Bitcoin Core RPC URL, replaces Esplora for mainnet when set
    pub bitcoin_rpc_url: Option<String>,
    /// Bitcoin Core RPC user:password
    pub bitcoin_rpc_userpwd: Option<String>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: HTTP_REQUEST_TIMEOUT.as_secs(),
            timeout_secs: None,
            esplora_url: ESPLORA_URL.to_string(),
            esplora_testnet_url: Some(ESPLORA_TESTNET_URL.to_string()),
            bitcoin_rpc_url: None,
            bitcoin_rpc_userpwd: None,
        }
    }
}

impl VerifierConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: VerifierConfig =
            serde_json::from_str(r#"{ "timeout_secs": 60, "esplora_url": "http://localhost:3000" }"#)
                .unwrap();
        assert_eq!(config.timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.esplora_url, "http://localhost:3000");
        assert_eq!(config.http_timeout(), HTTP_REQUEST_TIMEOUT);
        assert_eq!(
            config.esplora_testnet_url.as_deref(),
            Some(ESPLORA_TESTNET_URL)
        );
    }
}
