//! Chainpoint Verify Client Library
//!
//! Command line plumbing around `chainpoint-anchor-verify`: loading evaluated proofs from
//! disk, building the verifier from CLI/env configuration, and canceling on signals.

pub mod shutdown;
pub mod verify;

pub use verify::{load_proof, run, VerifyArgs};
