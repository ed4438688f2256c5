//! Bitcoin Core JSON-RPC broadcast client.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::TxBroadcaster;
use crate::core::BroadcastError;
use crate::core::constants::{RPC_MAX_ATTEMPTS, RPC_RETRY_DELAY, RPC_TIMEOUT};

/// Backend configuration.
#[derive(Clone)]
pub struct RpcConfig {
    /// Endpoint, e.g. `http://127.0.0.1:8332`.
    pub url: String,
    /// RPC username.
    pub user: String,
    /// RPC password.
    pub password: String,
    /// Per-attempt request timeout.
    pub timeout: Duration,
    /// Attempts on connection-level failures.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub retry_delay: Duration,
    /// SOCKS5 proxy, e.g. `socks5h://127.0.0.1:9050`.
    ///
    /// Used when the endpoint is a hidden service; a `.onion` host without a
    /// proxy configured cannot be reached.
    pub socks_proxy: Option<String>,
}

impl std::fmt::Debug for RpcConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &"[redacted]")
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay", &self.retry_delay)
            .field("socks_proxy", &self.socks_proxy)
            .finish()
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8332".to_string(),
            user: String::new(),
            password: String::new(),
            timeout: RPC_TIMEOUT,
            max_attempts: RPC_MAX_ATTEMPTS,
            retry_delay: RPC_RETRY_DELAY,
            socks_proxy: None,
        }
    }
}

impl RpcConfig {
    /// Whether the endpoint host is a Tor hidden service.
    pub fn is_hidden_service(&self) -> bool {
        host_of(&self.url).is_some_and(|h| h.ends_with(".onion"))
    }
}

/// Host portion of an `http(s)://host[:port]/...` endpoint.
fn host_of(url: &str) -> Option<&str> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?']).next()?;
    let host = authority.rsplit_once(':').map_or(authority, |(h, _)| h);
    (!host.is_empty()).then_some(host)
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<serde_json::Value>,
    error: Option<RpcError>,
}

/// `sendrawtransaction` client for a Bitcoin Core node.
///
/// Retries only connection-level failures; an error the node itself reports
/// is terminal and returned on the first attempt. The HTTP client is built
/// per call, so construction is cheap and the type stays usable from a
/// blocking thread regardless of where it was created.
pub struct BitcoinRpc {
    config: RpcConfig,
}

impl BitcoinRpc {
    /// Create a client for the given backend.
    pub fn new(config: RpcConfig) -> Self {
        Self { config }
    }

    fn build_client(&self) -> Result<reqwest::blocking::Client, BroadcastError> {
        let mut builder = reqwest::blocking::Client::builder().timeout(self.config.timeout);

        // Routing through the proxy is a transport decision; the retry
        // policy above it is unchanged.
        if self.config.is_hidden_service() {
            let proxy_url = self.config.socks_proxy.as_deref().ok_or_else(|| {
                BroadcastError::Unavailable(
                    "endpoint is a hidden service but no SOCKS proxy is configured".to_string(),
                )
            })?;
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| BroadcastError::Unavailable(format!("bad proxy url: {e}")))?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| BroadcastError::Unavailable(format!("http client: {e}")))
    }

    fn call_once(
        &self,
        client: &reqwest::blocking::Client,
        raw_tx_hex: &str,
    ) -> Result<String, BroadcastError> {
        let body = json!({
            "jsonrpc": "1.0",
            "id": "meshtx",
            "method": "sendrawtransaction",
            "params": [raw_tx_hex],
        });

        let response = client
            .post(&self.config.url)
            .basic_auth(&self.config.user, Some(&self.config.password))
            .json(&body)
            .send()
            .map_err(|e| BroadcastError::Unavailable(e.to_string()))?;

        let status = response.status();
        // The node reports rejections in the JSON-RPC error body, usually
        // alongside a non-2xx status, so parse the body before the status.
        let parsed: RpcResponse = match response.json() {
            Ok(parsed) => parsed,
            Err(e) => {
                return Err(BroadcastError::Unavailable(format!(
                    "bad RPC response (http {status}): {e}"
                )));
            }
        };

        if let Some(error) = parsed.error {
            debug!(code = error.code, message = %error.message, "backend rejected transaction");
            return Err(BroadcastError::Rejected(error.message));
        }

        match parsed.result.as_ref().and_then(|v| v.as_str()) {
            Some(txid) => Ok(txid.to_string()),
            None => Err(BroadcastError::Unavailable(format!(
                "RPC response carried no txid (http {status})"
            ))),
        }
    }
}

impl TxBroadcaster for BitcoinRpc {
    fn broadcast(&self, raw_tx_hex: &str) -> Result<String, BroadcastError> {
        let client = self.build_client()?;
        let mut last_error = String::new();

        for attempt in 1..=self.config.max_attempts.max(1) {
            match self.call_once(&client, raw_tx_hex) {
                Ok(txid) => {
                    debug!(%txid, attempt, "transaction broadcast");
                    return Ok(txid);
                }
                Err(BroadcastError::Rejected(message)) => {
                    return Err(BroadcastError::Rejected(message));
                }
                Err(BroadcastError::Unavailable(message)) => {
                    warn!(attempt, %message, "broadcast backend unreachable");
                    last_error = message;
                    if attempt < self.config.max_attempts {
                        std::thread::sleep(self.config.retry_delay);
                    }
                }
            }
        }

        Err(BroadcastError::Unavailable(last_error))
    }
}
