//! CLI wrapper for proof verification

use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use chainpoint_anchor_verify::explorer::{ESPLORA_TESTNET_URL, ESPLORA_URL};
use chainpoint_anchor_verify::{CancelToken, EvaluatedProof, Verifier, VerifierConfig};
use serde_json::Value;
use tracing::{error, info};

/// CLI arguments for verifying an evaluated proof
#[derive(Clone, Debug, clap::Args)]
pub struct VerifyArgs {
    /// Path to the evaluated proof (JSON)
    #[arg(long)]
    proof_path: PathBuf,
    /// Check every anchor and report all failures instead of stopping at the first one
    #[arg(long, default_value = "false")]
    all_failures: bool,
    /// Give up (as if canceled) after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Timeout of a single HTTP request, in seconds
    #[arg(long, default_value = "30")]
    http_timeout_secs: u64,
    /// Esplora API used for mainnet Bitcoin anchors
    #[arg(long, env = "ESPLORA_URL", default_value = ESPLORA_URL)]
    esplora_url: String,
    /// Esplora API used for testnet Bitcoin anchors
    #[arg(long, env = "ESPLORA_TESTNET_URL", default_value = ESPLORA_TESTNET_URL)]
    esplora_testnet_url: String,
    /// Bitcoin RPC URL, replaces Esplora for mainnet anchors (optional)
    #[arg(long, env = "BITCOIN_RPC")]
    bitcoin_rpc_url: Option<String>,
    /// Bitcoin RPC user:password (optional)
    #[arg(long, env = "USERPWD")]
    bitcoin_rpc_userpwd: Option<String>,
}

impl VerifyArgs {
    pub fn config(&self) -> VerifierConfig {
        VerifierConfig {
            http_timeout_secs: self.http_timeout_secs,
            timeout_secs: self.timeout_secs,
            esplora_url: self.esplora_url.clone(),
            esplora_testnet_url: Some(self.esplora_testnet_url.clone()),
            bitcoin_rpc_url: self.bitcoin_rpc_url.clone(),
            bitcoin_rpc_userpwd: self.bitcoin_rpc_userpwd.clone(),
        }
    }
}

/// Read the evaluated proof JSON from disk
pub fn load_proof(proof_path: &Path) -> Result<Value, anyhow::Error> {
    info!("Loading proof from {}", proof_path.display());
    let data = std::fs::read_to_string(proof_path)
        .with_context(|| format!("Failed to read {}", proof_path.display()))?;
    let proof = serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse {} as JSON", proof_path.display()))?;
    Ok(proof)
}

/// Verify the proof at `args.proof_path`, failing if any anchor does not check out
pub async fn run(args: VerifyArgs, cancel: CancelToken) -> Result<(), anyhow::Error> {
    let proof = load_proof(&args.proof_path)?;
    let verifier = Verifier::from_config(&args.config())?;

    if args.all_failures {
        let proof = EvaluatedProof::from_json(&proof)?;
        let failures = verifier.diagnose(&cancel, &proof).await;
        if !failures.is_empty() {
            for failure in &failures {
                error!("{}", failure);
            }
            anyhow::bail!("{} anchor check(s) failed", failures.len());
        }
    } else {
        verifier.verify(&cancel, &proof).await?;
    }

    info!("Proof verified");
    Ok(())
}
