//! Bitcoin RPC client for looking up block headers and raw transactions with retry logic.

use base64::{engine::general_purpose, Engine as _};
use bitcoin::consensus::Decodable;
use bitcoin::{BlockHash, Transaction, Txid};
use bitcoincore_rpc_json::GetBlockHeaderResult;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HeaderMap, HeaderValue, HttpClient};
use jsonrpsee::rpc_params;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Error types for Bitcoin RPC client operations
#[derive(Error, Debug)]
pub enum BitcoinClientError {
    /// RPC client errors
    #[error("RPC client error: {0}")]
    RpcClient(#[from] jsonrpsee::core::client::Error),
    /// Invalid HTTP header value
    #[error("Invalid HTTP header value")]
    InvalidHeader,
    /// Failed to decode hex response
    #[error("Failed to decode hex response: {0}")]
    HexDecode(#[from] hex::FromHexError),
    /// Failed to deserialize Bitcoin consensus data
    #[error("Failed to deserialize Bitcoin data: {0}")]
    BitcoinDeserialization(#[from] bitcoin::consensus::encode::Error),
}

/// RPC_INVALID_ADDRESS_OR_KEY, returned for unknown transactions and block hashes
const RPC_INVALID_ADDRESS_OR_KEY: i32 = -5;
/// RPC_INVALID_PARAMETER, returned for block heights out of range
const RPC_INVALID_PARAMETER: i32 = -8;

impl BitcoinClientError {
    /// Whether the node answered that the requested block or transaction does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            BitcoinClientError::RpcClient(jsonrpsee::core::client::Error::Call(err)) => {
                matches!(
                    err.code(),
                    RPC_INVALID_ADDRESS_OR_KEY | RPC_INVALID_PARAMETER
                )
            }
            _ => false,
        }
    }
}

/// Default HTTP request timeout
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Default upper bound on the total time spent retrying a single request
pub const MAX_RETRY_ELAPSED_TIME: Duration = Duration::from_secs(30);

/// Bitcoin RPC client
pub struct BitcoinClient {
    client: HttpClient,
    backoff: backoff::ExponentialBackoff,
}

impl BitcoinClient {
    /// Create a new Bitcoin RPC client with default retry settings (exponential backoff)
    pub fn new(url: String, userpwd: Option<String>) -> Result<Self, BitcoinClientError> {
        let mut headers = HeaderMap::new();
        if let Some(userpwd) = userpwd {
            let creds = general_purpose::STANDARD.encode(userpwd);
            headers.insert(
                "Authorization",
                HeaderValue::from_str(&format!("Basic {creds}"))
                    .map_err(|_| BitcoinClientError::InvalidHeader)?,
            );
        };

        let client = HttpClient::builder()
            .set_headers(headers)
            .request_timeout(HTTP_REQUEST_TIMEOUT)
            .build(url)?;

        let backoff = backoff::ExponentialBackoff {
            max_elapsed_time: Some(MAX_RETRY_ELAPSED_TIME),
            ..Default::default()
        };

        Ok(Self { client, backoff })
    }

    async fn request_decode<T: Decodable>(
        &self,
        method: &str,
        params: ArrayParams,
    ) -> Result<T, BitcoinClientError> {
        request_with_retry(self.backoff.clone(), || async {
            let res_hex: String = self.client.request(method, params.clone()).await?;
            let res_bytes = hex::decode(&res_hex)?;
            bitcoin::consensus::deserialize(&res_bytes).map_err(Into::into)
        })
        .await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: ArrayParams,
    ) -> Result<T, BitcoinClientError> {
        request_with_retry(self.backoff.clone(), || async {
            self.client
                .request(method, params.clone())
                .await
                .map_err(Into::into)
        })
        .await
    }

    /// Get block hash by height
    pub async fn get_block_hash(&self, height: u32) -> Result<BlockHash, BitcoinClientError> {
        self.request("getblockhash", rpc_params![height]).await
    }

    /// Get block header by hash with extended data
    pub async fn get_block_header_ex(
        &self,
        hash: &BlockHash,
    ) -> Result<GetBlockHeaderResult, BitcoinClientError> {
        self.request("getblockheader", rpc_params![hash.to_string(), true])
            .await
    }

    /// Get transaction by txid.
    /// Requires the node to run with `-txindex` unless the transaction is in the mempool.
    pub async fn get_raw_transaction(&self, txid: &Txid) -> Result<Transaction, BitcoinClientError> {
        self.request_decode("getrawtransaction", rpc_params![txid.to_string(), false])
            .await
    }
}

/// Execute a request with retry logic using exponential backoff
/// Only retries on unexpected HTTP errors (not 200 OK or 400 Bad Request)
async fn request_with_retry<F, Fut, T>(
    backoff: backoff::ExponentialBackoff,
    operation: F,
) -> Result<T, BitcoinClientError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, BitcoinClientError>>,
{
    use backoff::{future::retry_notify, Error};

    retry_notify(
        backoff,
        || async {
            match operation().await {
                Ok(result) => Ok(result),
                Err(err) => {
                    if is_retryable_error(&err) {
                        Err(Error::transient(err))
                    } else {
                        Err(Error::permanent(err))
                    }
                }
            }
        },
        |err, duration| {
            info!("Request failed, retrying in {:?}: {}", duration, err);
        },
    )
    .await
}

/// Determines if an error should be retried - only retry HTTP errors (except bad request)
fn is_retryable_error(err: &BitcoinClientError) -> bool {
    match err {
        BitcoinClientError::RpcClient(rpc_err) => {
            use jsonrpsee::core::client::Error as RpcError;
            match rpc_err {
                // Transport errors and timeouts only, JSON-RPC level failures are final
                RpcError::Transport(_) => true,
                RpcError::RequestTimeout => true,
                RpcError::RestartNeeded(_) => true,
                RpcError::ServiceDisconnect => true,
                _ => false,
            }
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonrpsee::types::ErrorObjectOwned;

    fn call_error(code: i32) -> BitcoinClientError {
        BitcoinClientError::RpcClient(jsonrpsee::core::client::Error::Call(
            ErrorObjectOwned::owned(code, "boom", None::<()>),
        ))
    }

    #[test]
    fn test_not_found_codes() {
        assert!(call_error(RPC_INVALID_ADDRESS_OR_KEY).is_not_found());
        assert!(call_error(RPC_INVALID_PARAMETER).is_not_found());
        assert!(!call_error(-32601).is_not_found());
        assert!(!BitcoinClientError::InvalidHeader.is_not_found());
    }

    #[test]
    fn test_call_errors_are_not_retried() {
        assert!(!is_retryable_error(&call_error(RPC_INVALID_PARAMETER)));
        assert!(is_retryable_error(&BitcoinClientError::RpcClient(
            jsonrpsee::core::client::Error::RequestTimeout
        )));
    }

    #[tokio::test]
    async fn test_basic_auth_client_builds() {
        let client = BitcoinClient::new(
            "http://127.0.0.1:8332".to_string(),
            Some("user:password".to_string()),
        );
        assert!(client.is_ok());
    }
}
