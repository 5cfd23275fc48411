//! Chainpoint anchor verification library
//!
//! This crate checks evaluated Chainpoint proofs against the values their anchors claim are
//! published: calendar endpoints, and for Bitcoin anchors the block merkle root and the
//! OP_RETURN output of the anchoring transaction.

pub mod anchor;
pub mod btc;
pub mod cancel;
pub mod config;
pub mod error;
pub mod explorer;
pub mod http;
pub mod proof;
pub mod verify;

pub use anchor::AnchorResolver;
pub use btc::BitcoinCrossValidator;
pub use cancel::{cancel_scope, CancelHandle, CancelToken};
pub use config::VerifierConfig;
pub use error::VerificationError;
pub use explorer::{BitcoinRpcExplorer, BlockExplorer, BlockInfo, EsploraExplorer, TransactionInfo};
pub use http::{HttpGet, HttpResponse, ReqwestHttp};
pub use proof::{Anchor, BitcoinAnchor, Branch, CalendarAnchor, EvaluatedProof, TxCommitment};
pub use verify::{verify_proof, Verifier};
