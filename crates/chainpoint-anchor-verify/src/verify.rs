//! Verification of evaluated proofs: the recursive branch walk and its entry points.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bitcoin::Network;
use serde_json::Value;
use tracing::{info, warn};

use crate::anchor::AnchorResolver;
use crate::btc::BitcoinCrossValidator;
use crate::cancel::CancelToken;
use crate::config::VerifierConfig;
use crate::error::VerificationError;
use crate::explorer::{BitcoinRpcExplorer, BlockExplorer, EsploraExplorer};
use crate::http::{HttpGet, ReqwestHttp};
use crate::proof::{Anchor, Branch, EvaluatedProof};

type BranchFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Verifies evaluated proofs against calendars and the Bitcoin blockchain
#[derive(Clone)]
pub struct Verifier {
    resolver: AnchorResolver,
    mainnet: Option<BitcoinCrossValidator>,
    testnet: Option<BitcoinCrossValidator>,
    timeout: Option<std::time::Duration>,
}

impl Verifier {
    /// Verifier that resolves anchor URIs through `http` and has no block explorer yet
    pub fn new(http: Arc<dyn HttpGet>) -> Self {
        Self {
            resolver: AnchorResolver::new(http),
            mainnet: None,
            testnet: None,
            timeout: None,
        }
    }

    /// Use `explorer` to cross-check Bitcoin anchors on `network`
    pub fn with_explorer(mut self, network: Network, explorer: Arc<dyn BlockExplorer>) -> Self {
        let validator = Some(BitcoinCrossValidator::new(explorer));
        if network == Network::Bitcoin {
            self.mainnet = validator;
        } else {
            self.testnet = validator;
        }
        self
    }

    /// Fail whole verifications with [`VerificationError::Canceled`] after `timeout`
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn from_config(config: &VerifierConfig) -> Result<Self, VerificationError> {
        let http: Arc<dyn HttpGet> = Arc::new(ReqwestHttp::new(config.http_timeout())?);

        let mainnet: Arc<dyn BlockExplorer> = match &config.bitcoin_rpc_url {
            Some(url) => Arc::new(BitcoinRpcExplorer::new(
                url.clone(),
                config.bitcoin_rpc_userpwd.clone(),
            )?),
            None => Arc::new(EsploraExplorer::new(&config.esplora_url, http.clone())),
        };
        let mut verifier = Self::new(http.clone()).with_explorer(Network::Bitcoin, mainnet);

        if let Some(url) = &config.esplora_testnet_url {
            let testnet = Arc::new(EsploraExplorer::new(url, http));
            verifier = verifier.with_explorer(Network::Testnet, testnet);
        }
        if let Some(timeout) = config.timeout() {
            verifier = verifier.with_timeout(timeout);
        }
        Ok(verifier)
    }

    /// Verify the evaluator's JSON output. Decoding happens up front, so a malformed proof
    /// fails before any network request is made.
    pub async fn verify(&self, cancel: &CancelToken, proof: &Value) -> Result<(), VerificationError> {
        if cancel.is_canceled() {
            return Err(VerificationError::Canceled);
        }
        let proof = EvaluatedProof::from_json(proof)?;
        self.verify_proof(cancel, &proof).await
    }

    /// Verify every top-level branch, stopping at the first failure
    pub async fn verify_proof(
        &self,
        cancel: &CancelToken,
        proof: &EvaluatedProof,
    ) -> Result<(), VerificationError> {
        let verify_all = async {
            for branch in &proof.branches {
                self.verify_branch(cancel, branch).await?;
            }
            Ok::<(), VerificationError>(())
        };
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, cancel.run(verify_all))
                .await
                .unwrap_or(Err(VerificationError::Canceled)),
            None => cancel.run(verify_all).await,
        }
    }

    /// Verify the anchors of `branch`, then its sub-branches, stopping at the first failure.
    ///
    /// A branch with neither anchors nor sub-branches passes.
    pub fn verify_branch<'a>(
        &'a self,
        cancel: &'a CancelToken,
        branch: &'a Branch,
    ) -> BranchFuture<'a, Result<(), VerificationError>> {
        Box::pin(async move {
            if cancel.is_canceled() {
                return Err(VerificationError::Canceled);
            }
            let label = branch.label.as_deref();
            info!("Verifying branch {} ...", label.unwrap_or("<unlabeled>"));

            for (index, anchor) in branch.anchors.iter().enumerate() {
                self.verify_anchor(cancel, anchor)
                    .await
                    .map_err(|err| err.in_branch(label, Some(index)))?;
            }

            for sub_branch in &branch.branches {
                self.verify_branch(cancel, sub_branch).await?;
            }
            Ok(())
        })
    }

    /// Verify a single anchor. Bitcoin anchors carrying a transaction commitment are also
    /// cross-validated against the chain.
    pub async fn verify_anchor(
        &self,
        cancel: &CancelToken,
        anchor: &Anchor,
    ) -> Result<(), VerificationError> {
        info!(
            "Verifying {} anchor {} ...",
            anchor.type_name(),
            anchor.expected_value()
        );
        self.resolver
            .resolve(cancel, anchor.uris(), anchor.expected_value())
            .await?;

        if let Anchor::Bitcoin(anchor) = anchor {
            if let Some(commitment) = &anchor.tx_commitment {
                let validator = self.validator(anchor.network)?;
                validator
                    .cross_validate(
                        cancel,
                        anchor.block_height,
                        &commitment.txid,
                        &anchor.expected_value,
                        &commitment.op_return_value,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    fn validator(&self, network: Network) -> Result<&BitcoinCrossValidator, VerificationError> {
        let validator = if network == Network::Bitcoin {
            self.mainnet.as_ref()
        } else {
            self.testnet.as_ref()
        };
        validator.ok_or(VerificationError::NoExplorer { network })
    }

    /// Check every anchor of every branch and report all failures in source order.
    ///
    /// Diagnostic variant of [`Verifier::verify_proof`]: nothing short-circuits except
    /// cancellation, which yields a single [`VerificationError::Canceled`].
    pub async fn diagnose(
        &self,
        cancel: &CancelToken,
        proof: &EvaluatedProof,
    ) -> Vec<VerificationError> {
        if cancel.is_canceled() {
            return vec![VerificationError::Canceled];
        }
        let mut failures = Vec::new();
        let diagnose_all = async {
            for branch in &proof.branches {
                self.diagnose_branch(cancel, branch, &mut failures).await?;
            }
            Ok::<(), VerificationError>(())
        };
        let res = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, diagnose_all)
                .await
                .unwrap_or(Err(VerificationError::Canceled)),
            None => diagnose_all.await,
        };
        match res {
            Ok(()) => failures,
            Err(err) => vec![err],
        }
    }

    fn diagnose_branch<'a>(
        &'a self,
        cancel: &'a CancelToken,
        branch: &'a Branch,
        failures: &'a mut Vec<VerificationError>,
    ) -> BranchFuture<'a, Result<(), VerificationError>> {
        Box::pin(async move {
            let label = branch.label.as_deref();
            for (index, anchor) in branch.anchors.iter().enumerate() {
                match self.verify_anchor(cancel, anchor).await {
                    Ok(()) => {}
                    Err(err) if err.is_canceled() => return Err(err),
                    Err(err) => {
                        let err = err.in_branch(label, Some(index));
                        warn!("{}", err);
                        failures.push(err);
                    }
                }
            }
            for sub_branch in &branch.branches {
                self.diagnose_branch(cancel, sub_branch, failures).await?;
            }
            Ok(())
        })
    }
}

/// Verify `proof` with a verifier built from `config`
pub async fn verify_proof(
    cancel: &CancelToken,
    proof: &Value,
    config: &VerifierConfig,
) -> Result<(), VerificationError> {
    Verifier::from_config(config)?.verify(cancel, proof).await
}
