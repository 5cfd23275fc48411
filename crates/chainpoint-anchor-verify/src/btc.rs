//! Cross-validation of Bitcoin anchors against the chain itself.

use std::sync::Arc;

use bitcoin::Txid;
use tracing::info;

use crate::cancel::CancelToken;
use crate::error::VerificationError;
use crate::explorer::BlockExplorer;

/// Checks a Bitcoin anchor two independent ways: the merkle root of the anchored block and
/// the OP_RETURN payload of the anchoring transaction
#[derive(Clone)]
pub struct BitcoinCrossValidator {
    explorer: Arc<dyn BlockExplorer>,
}

impl BitcoinCrossValidator {
    pub fn new(explorer: Arc<dyn BlockExplorer>) -> Self {
        Self { explorer }
    }

    /// Run both sub-checks concurrently. Both must pass; if both fail, the merkle root
    /// failure is reported.
    pub async fn cross_validate(
        &self,
        cancel: &CancelToken,
        block_height: u32,
        txid: &Txid,
        expected_merkle_root: &str,
        expected_op_return: &str,
    ) -> Result<(), VerificationError> {
        let (merkle_root, op_return) = tokio::join!(
            self.verify_block_merkle_root(cancel, block_height, expected_merkle_root),
            self.verify_tx_op_return(cancel, txid, expected_op_return),
        );
        merkle_root?;
        op_return
    }

    /// Sub-check A: merkle root of the block at `block_height`
    pub async fn verify_block_merkle_root(
        &self,
        cancel: &CancelToken,
        block_height: u32,
        expected_merkle_root: &str,
    ) -> Result<(), VerificationError> {
        let block = cancel.run(self.explorer.get_block(block_height)).await?;
        let actual = block.merkle_root.to_string();
        if !actual.eq_ignore_ascii_case(expected_merkle_root) {
            return Err(VerificationError::MerkleRootMismatch {
                height: block_height,
                expected: expected_merkle_root.to_string(),
                actual,
            });
        }
        info!("Block #{} merkle root matches", block_height);
        Ok(())
    }

    /// Sub-check B: OP_RETURN payload of transaction `txid`
    pub async fn verify_tx_op_return(
        &self,
        cancel: &CancelToken,
        txid: &Txid,
        expected_op_return: &str,
    ) -> Result<(), VerificationError> {
        let transaction = cancel.run(self.explorer.get_transaction(txid)).await?;
        let actual = transaction
            .data_output_value
            .ok_or_else(|| VerificationError::MissingOpReturn {
                txid: txid.to_string(),
            })?;
        if !actual.eq_ignore_ascii_case(expected_op_return) {
            return Err(VerificationError::OpReturnMismatch {
                txid: txid.to_string(),
                expected: expected_op_return.to_string(),
                actual,
            });
        }
        info!("Transaction {} OP_RETURN matches", txid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancel_scope;
    use crate::explorer::{BlockInfo, MockBlockExplorer, TransactionInfo};
    use mockall::predicate::eq;
    use std::str::FromStr;

    const BLOCK_HEIGHT: u32 = 503275;
    const MERKLE_ROOT: &str =
        "c617f5faca34474bea7020d75c39cb8427a32145f9646586ecb9184002131ad9";
    const TX_ID: &str =
        "ba3c8c3e547ed73471c28a69659373f3f0a3b726aab31cdecd14513d9c581f1e";
    const OP_RETURN: &str =
        "267335262e21e7adb4220068b4b90b7ff066324935d7f61ceab2a64080b06b1b";

    fn txid() -> Txid {
        Txid::from_str(TX_ID).unwrap()
    }

    fn explorer(merkle_root: &'static str, op_return: Option<&'static str>) -> MockBlockExplorer {
        let mut explorer = MockBlockExplorer::new();
        explorer
            .expect_get_block()
            .with(eq(BLOCK_HEIGHT))
            .returning(move |height| {
                Ok(BlockInfo {
                    height,
                    merkle_root: merkle_root.parse().unwrap(),
                })
            });
        explorer.expect_get_transaction().returning(move |txid| {
            Ok(TransactionInfo {
                txid: *txid,
                data_output_value: op_return.map(str::to_string),
            })
        });
        explorer
    }

    fn validator(explorer: MockBlockExplorer) -> BitcoinCrossValidator {
        BitcoinCrossValidator::new(Arc::new(explorer))
    }

    #[tokio::test]
    async fn test_cross_validate_pass() {
        let res = validator(explorer(MERKLE_ROOT, Some(OP_RETURN)))
            .cross_validate(
                &CancelToken::never(),
                BLOCK_HEIGHT,
                &txid(),
                MERKLE_ROOT,
                OP_RETURN,
            )
            .await;
        assert!(res.is_ok(), "{res:?}");
    }

    #[tokio::test]
    async fn test_merkle_root_mismatch() {
        let other = "0000000000000000000000000000000000000000000000000000000000000001";
        let err = validator(explorer(other, Some(OP_RETURN)))
            .cross_validate(
                &CancelToken::never(),
                BLOCK_HEIGHT,
                &txid(),
                MERKLE_ROOT,
                OP_RETURN,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::MerkleRootMismatch { .. }));
        assert!(err.is_mismatch());
    }

    #[tokio::test]
    async fn test_op_return_mismatch() {
        let err = validator(explorer(MERKLE_ROOT, Some("deadbeef")))
            .cross_validate(
                &CancelToken::never(),
                BLOCK_HEIGHT,
                &txid(),
                MERKLE_ROOT,
                OP_RETURN,
            )
            .await
            .unwrap_err();
        match err {
            VerificationError::OpReturnMismatch { actual, .. } => assert_eq!(actual, "deadbeef"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_op_return() {
        let err = validator(explorer(MERKLE_ROOT, None))
            .verify_tx_op_return(&CancelToken::never(), &txid(), OP_RETURN)
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::MissingOpReturn { .. }));
    }

    #[tokio::test]
    async fn test_block_not_found_is_not_a_mismatch() {
        let mut explorer = MockBlockExplorer::new();
        explorer
            .expect_get_block()
            .returning(|height| Err(VerificationError::BlockNotFound { height }));
        explorer.expect_get_transaction().returning(|txid| {
            Ok(TransactionInfo {
                txid: *txid,
                data_output_value: Some(OP_RETURN.to_string()),
            })
        });

        let err = validator(explorer)
            .cross_validate(
                &CancelToken::never(),
                BLOCK_HEIGHT,
                &txid(),
                MERKLE_ROOT,
                OP_RETURN,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::BlockNotFound { height: BLOCK_HEIGHT }));
        assert!(!err.is_mismatch());
    }

    #[tokio::test]
    async fn test_canceled_cross_validation() {
        let (handle, token) = cancel_scope();
        handle.cancel();

        let mut explorer = MockBlockExplorer::new();
        explorer.expect_get_block().never();
        explorer.expect_get_transaction().never();

        let err = validator(explorer)
            .cross_validate(&token, BLOCK_HEIGHT, &txid(), MERKLE_ROOT, OP_RETURN)
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::Canceled));
    }
}
