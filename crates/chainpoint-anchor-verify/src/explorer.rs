//! Block explorer capability: block merkle roots and transaction OP_RETURN payloads.

use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::block::Header as BlockHeader;
use bitcoin::script::Instruction;
use bitcoin::{BlockHash, Transaction, TxMerkleNode, Txid};
use chainpoint_bitcoin_client::{BitcoinClient, BitcoinClientError};
use reqwest::StatusCode;
use tracing::debug;

use crate::error::VerificationError;
use crate::http::HttpGet;

/// Block metadata needed to cross-check a Bitcoin anchor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    pub height: u32,
    pub merkle_root: TxMerkleNode,
}

/// Transaction metadata needed to cross-check a Bitcoin anchor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionInfo {
    pub txid: Txid,
    /// Hex payload of the first OP_RETURN output, if any
    pub data_output_value: Option<String>,
}

impl TransactionInfo {
    pub fn from_transaction(transaction: &Transaction) -> Self {
        Self {
            txid: transaction.compute_txid(),
            data_output_value: op_return_payload(transaction).map(hex::encode),
        }
    }
}

/// Data pushed by the first OP_RETURN output of `transaction`
pub fn op_return_payload(transaction: &Transaction) -> Option<Vec<u8>> {
    transaction
        .output
        .iter()
        .find(|output| output.script_pubkey.is_op_return())
        .map(|output| {
            output
                .script_pubkey
                .instructions()
                .filter_map(Result::ok)
                .find_map(|instruction| match instruction {
                    Instruction::PushBytes(bytes) => Some(bytes.as_bytes().to_vec()),
                    Instruction::Op(_) => None,
                })
                .unwrap_or_default()
        })
}

/// Source of truth for blocks and transactions on one Bitcoin network
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlockExplorer: Send + Sync {
    /// Block at `height`, or [`VerificationError::BlockNotFound`]
    async fn get_block(&self, height: u32) -> Result<BlockInfo, VerificationError>;
    /// Transaction `txid`, or [`VerificationError::TransactionNotFound`]
    async fn get_transaction(&self, txid: &Txid) -> Result<TransactionInfo, VerificationError>;
}

/// Public Esplora instance on mainnet
pub const ESPLORA_URL: &str = "https://blockstream.info/api";
/// Public Esplora instance on testnet
pub const ESPLORA_TESTNET_URL: &str = "https://blockstream.info/testnet/api";

/// [`BlockExplorer`] backed by an Esplora REST API
pub struct EsploraExplorer {
    base_url: String,
    http: Arc<dyn HttpGet>,
}

impl EsploraExplorer {
    pub fn new(base_url: impl Into<String>, http: Arc<dyn HttpGet>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    /// GET `path`, returning `None` on 404
    async fn get_text(&self, path: &str) -> Result<Option<String>, VerificationError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.get(&url).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        response.error_for_status(&url)?.text(&url).map(Some)
    }

    async fn get_decoded<T: bitcoin::consensus::Decodable + Send>(
        &self,
        path: &str,
    ) -> Result<Option<T>, VerificationError> {
        let Some(body) = self.get_text(path).await? else {
            return Ok(None);
        };
        let invalid = |reason: String| VerificationError::InvalidResponse {
            url: format!("{}{}", self.base_url, path),
            reason,
        };
        let bytes = hex::decode(&body).map_err(|e| invalid(e.to_string()))?;
        bitcoin::consensus::deserialize(&bytes)
            .map(Some)
            .map_err(|e| invalid(e.to_string()))
    }
}

#[async_trait]
impl BlockExplorer for EsploraExplorer {
    async fn get_block(&self, height: u32) -> Result<BlockInfo, VerificationError> {
        let not_found = || VerificationError::BlockNotFound { height };

        let path = format!("/block-height/{height}");
        let hash = self.get_text(&path).await?.ok_or_else(not_found)?;
        let hash: BlockHash = hash.parse().map_err(|e| VerificationError::InvalidResponse {
            url: format!("{}{}", self.base_url, path),
            reason: format!("invalid block hash: {e}"),
        })?;
        debug!("Block #{} has hash {}", height, hash);

        let header: BlockHeader = self
            .get_decoded(&format!("/block/{hash}/header"))
            .await?
            .ok_or_else(not_found)?;

        Ok(BlockInfo {
            height,
            merkle_root: header.merkle_root,
        })
    }

    async fn get_transaction(&self, txid: &Txid) -> Result<TransactionInfo, VerificationError> {
        let transaction: Transaction = self
            .get_decoded(&format!("/tx/{txid}/hex"))
            .await?
            .ok_or_else(|| VerificationError::TransactionNotFound {
                txid: txid.to_string(),
            })?;
        Ok(TransactionInfo::from_transaction(&transaction))
    }
}

/// [`BlockExplorer`] backed by a Bitcoin Core node (needs `-txindex` for transactions)
pub struct BitcoinRpcExplorer {
    client: BitcoinClient,
}

impl BitcoinRpcExplorer {
    pub fn new(url: String, userpwd: Option<String>) -> Result<Self, VerificationError> {
        let client = BitcoinClient::new(url, userpwd).map_err(rpc_error)?;
        Ok(Self { client })
    }
}

fn rpc_error(err: BitcoinClientError) -> VerificationError {
    VerificationError::Explorer(err.to_string())
}

#[async_trait]
impl BlockExplorer for BitcoinRpcExplorer {
    async fn get_block(&self, height: u32) -> Result<BlockInfo, VerificationError> {
        let not_found_or = |err: BitcoinClientError| {
            if err.is_not_found() {
                VerificationError::BlockNotFound { height }
            } else {
                rpc_error(err)
            }
        };
        let hash = self
            .client
            .get_block_hash(height)
            .await
            .map_err(not_found_or)?;
        let header = self
            .client
            .get_block_header_ex(&hash)
            .await
            .map_err(not_found_or)?;
        Ok(BlockInfo {
            height,
            merkle_root: header.merkle_root,
        })
    }

    async fn get_transaction(&self, txid: &Txid) -> Result<TransactionInfo, VerificationError> {
        let transaction = self
            .client
            .get_raw_transaction(txid)
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    VerificationError::TransactionNotFound {
                        txid: txid.to_string(),
                    }
                } else {
                    rpc_error(err)
                }
            })?;
        Ok(TransactionInfo::from_transaction(&transaction))
    }
}
