//! Error taxonomy shared by every stage of anchor verification.

use reqwest::StatusCode;
use thiserror::Error;

/// Why a proof failed to verify.
///
/// Apart from [`VerificationError::Branch`], which only adds the location of the failure,
/// every variant describes exactly one kind of failure. Cancellation is never wrapped.
#[derive(Error, Debug)]
pub enum VerificationError {
    /// The proof does not have the expected branch/anchor shape
    #[error("malformed proof: {0}")]
    MalformedProof(String),
    /// An anchor declares no URIs to resolve
    #[error("anchor has no URIs to verify")]
    NoUris,
    /// Network level failure (DNS, connection, timeout) while reaching an endpoint
    #[error("Get {url}: {message}")]
    Transport { url: String, message: String },
    /// Endpoint answered with a non-2xx status
    #[error("got {status} from {url}")]
    HttpStatus { status: StatusCode, url: String },
    /// Endpoint answered with a body that cannot be interpreted
    #[error("invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },
    /// A published value disagrees with the value computed from the proof
    #[error("value mismatch at {url}: expected {expected}, got {actual}")]
    ValueMismatch {
        url: String,
        expected: String,
        actual: String,
    },
    /// The block explorer knows no block at this height
    #[error("bitcoin block {height} not found")]
    BlockNotFound { height: u32 },
    /// The block explorer knows no such transaction
    #[error("bitcoin transaction {txid} not found")]
    TransactionNotFound { txid: String },
    /// Merkle root of the anchored block disagrees with the proof
    #[error("merkle root mismatch for block {height}: expected {expected}, got {actual}")]
    MerkleRootMismatch {
        height: u32,
        expected: String,
        actual: String,
    },
    /// OP_RETURN payload of the anchoring transaction disagrees with the proof
    #[error("OP_RETURN mismatch for transaction {txid}: expected {expected}, got {actual}")]
    OpReturnMismatch {
        txid: String,
        expected: String,
        actual: String,
    },
    /// The anchoring transaction carries no OP_RETURN output
    #[error("transaction {txid} has no OP_RETURN output")]
    MissingOpReturn { txid: String },
    /// No block explorer is configured for the anchor's network
    #[error("no block explorer configured for {network}")]
    NoExplorer { network: bitcoin::Network },
    /// Block explorer backend failure not covered by the other variants
    #[error("block explorer error: {0}")]
    Explorer(String),
    /// The caller's cancellation scope fired (or its deadline elapsed)
    #[error("context canceled")]
    Canceled,
    /// Failure inside a branch, annotated with where it happened
    #[error("{}: {source}", describe_location(.label, .anchor))]
    Branch {
        label: Option<String>,
        anchor: Option<usize>,
        #[source]
        source: Box<VerificationError>,
    },
}

fn describe_location(label: &Option<String>, anchor: &Option<usize>) -> String {
    let label = label.as_deref().unwrap_or("<unlabeled>");
    match anchor {
        Some(index) => format!("branch {label}: anchor #{index}"),
        None => format!("branch {label}"),
    }
}

impl VerificationError {
    /// Attach branch context, leaving cancellation untouched
    pub fn in_branch(self, label: Option<&str>, anchor: Option<usize>) -> Self {
        match self {
            VerificationError::Canceled => VerificationError::Canceled,
            err => VerificationError::Branch {
                label: label.map(str::to_string),
                anchor,
                source: Box::new(err),
            },
        }
    }

    /// Build a transport error, flattening the source chain into the message
    pub fn transport(url: &str, err: &(dyn std::error::Error + 'static)) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            let text = cause.to_string();
            // hyper and reqwest often repeat the inner message verbatim
            if !message.ends_with(&text) {
                message.push_str(": ");
                message.push_str(&text);
            }
            source = cause.source();
        }
        VerificationError::Transport {
            url: url.to_string(),
            message,
        }
    }

    /// Transport error for a host name that does not resolve
    pub fn unresolved_host(url: &str) -> Self {
        let host = reqwest::Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string());
        VerificationError::Transport {
            url: url.to_string(),
            message: format!("dial tcp: lookup {host}: no such host"),
        }
    }

    /// The underlying failure with any branch context removed
    pub fn root_cause(&self) -> &VerificationError {
        match self {
            VerificationError::Branch { source, .. } => source.root_cause(),
            err => err,
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self.root_cause(), VerificationError::Canceled)
    }

    /// The proof itself is broken, as opposed to not matching the ledgers
    pub fn is_malformed(&self) -> bool {
        matches!(
            self.root_cause(),
            VerificationError::MalformedProof(_) | VerificationError::NoUris
        )
    }

    /// A ledger disagrees with the proof
    pub fn is_mismatch(&self) -> bool {
        matches!(
            self.root_cause(),
            VerificationError::ValueMismatch { .. }
                | VerificationError::MerkleRootMismatch { .. }
                | VerificationError::OpReturnMismatch { .. }
                | VerificationError::MissingOpReturn { .. }
        )
    }
}
