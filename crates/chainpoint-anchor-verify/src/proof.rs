//! Typed view of an evaluated Chainpoint proof and its decoding from JSON.
//!
//! The evaluator emits a self-describing JSON tree. All shape checks happen here, once, so the
//! verifier only ever sees well-formed branches and anchors.

use std::str::FromStr;

use bitcoin::{Network, Txid};
use serde::Deserialize;
use serde_json::Value;

use crate::error::VerificationError;

/// Proof whose hash operations have already been applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatedProof {
    /// Hash of the anchored data, if the evaluator recorded it
    pub hash: Option<String>,
    /// Top-level branches, all of which must verify
    pub branches: Vec<Branch>,
}

/// Node of the proof tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Branch {
    pub label: Option<String>,
    pub anchors: Vec<Anchor>,
    pub branches: Vec<Branch>,
}

/// Claim that a value is published in an external ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    Calendar(CalendarAnchor),
    Bitcoin(BitcoinAnchor),
}

/// Anchor into a Chainpoint calendar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarAnchor {
    /// Calendar block id
    pub anchor_id: String,
    /// Alternative endpoints publishing the same value
    pub uris: Vec<String>,
    /// Lowercase hex value the calendar must publish
    pub expected_value: String,
    /// `tcal` rather than `cal`
    pub testnet: bool,
}

/// Anchor into the Bitcoin blockchain, mirrored by calendars
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitcoinAnchor {
    /// Height of the block whose merkle root is anchored
    pub block_height: u32,
    /// Calendar endpoints mirroring the merkle root
    pub uris: Vec<String>,
    /// Lowercase hex merkle root, in display byte order
    pub expected_value: String,
    pub network: Network,
    /// On-chain commitment, present on the top-level Bitcoin branch
    pub tx_commitment: Option<TxCommitment>,
}

/// Transaction whose OP_RETURN output commits to the calendar state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxCommitment {
    pub txid: Txid,
    /// Lowercase hex payload expected in the OP_RETURN output
    pub op_return_value: String,
}

impl Anchor {
    pub fn uris(&self) -> &[String] {
        match self {
            Anchor::Calendar(anchor) => &anchor.uris,
            Anchor::Bitcoin(anchor) => &anchor.uris,
        }
    }

    pub fn expected_value(&self) -> &str {
        match self {
            Anchor::Calendar(anchor) => &anchor.expected_value,
            Anchor::Bitcoin(anchor) => &anchor.expected_value,
        }
    }

    /// Wire name of the anchor type
    pub fn type_name(&self) -> &'static str {
        match self {
            Anchor::Calendar(CalendarAnchor { testnet: false, .. }) => "cal",
            Anchor::Calendar(CalendarAnchor { testnet: true, .. }) => "tcal",
            Anchor::Bitcoin(BitcoinAnchor { network, .. }) if *network == Network::Bitcoin => "btc",
            Anchor::Bitcoin(_) => "tbtc",
        }
    }
}

#[derive(Deserialize)]
struct RawProof {
    #[serde(default)]
    hash: Option<String>,
    branches: Option<Vec<Value>>,
}

#[derive(Deserialize)]
struct RawBranch {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    anchors: Vec<Value>,
    #[serde(default)]
    branches: Vec<Value>,
    #[serde(rename = "opReturnValue", default)]
    op_return_value: Option<String>,
    #[serde(rename = "btcTxId", default)]
    btc_tx_id: Option<String>,
}

#[derive(Deserialize)]
struct RawAnchor {
    #[serde(rename = "type")]
    anchor_type: String,
    anchor_id: Value,
    uris: Vec<String>,
    expected_value: String,
}

fn malformed(path: &str, reason: impl std::fmt::Display) -> VerificationError {
    VerificationError::MalformedProof(format!("{path}: {reason}"))
}

fn decode_hex_value(path: &str, field: &str, value: &str) -> Result<String, VerificationError> {
    if value.is_empty() {
        return Err(malformed(path, format!("`{field}` is empty")));
    }
    hex::decode(value).map_err(|e| malformed(path, format!("`{field}` is not hex: {e}")))?;
    Ok(value.to_ascii_lowercase())
}

impl EvaluatedProof {
    /// Decode the evaluator output, rejecting anything that is not a branch tree
    pub fn from_json(value: &Value) -> Result<Self, VerificationError> {
        if !value.is_object() {
            return Err(malformed("$", "proof must be a JSON object"));
        }
        let raw = RawProof::deserialize(value).map_err(|e| malformed("$", e))?;
        let branches = raw
            .branches
            .ok_or_else(|| malformed("$", "missing `branches`"))?
            .iter()
            .enumerate()
            .map(|(i, branch)| Branch::decode(&format!("branches[{i}]"), branch))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            hash: raw.hash,
            branches,
        })
    }
}

impl TryFrom<&Value> for EvaluatedProof {
    type Error = VerificationError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Self::from_json(value)
    }
}

impl FromStr for EvaluatedProof {
    type Err = VerificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: Value = serde_json::from_str(s).map_err(|e| malformed("$", e))?;
        Self::from_json(&value)
    }
}

impl Branch {
    /// Decode a single branch (and its subtree) from its JSON form
    pub fn from_json(value: &Value) -> Result<Self, VerificationError> {
        Self::decode("branch", value)
    }

    fn decode(path: &str, value: &Value) -> Result<Self, VerificationError> {
        if !value.is_object() {
            return Err(malformed(path, "branch must be a JSON object"));
        }
        let raw = RawBranch::deserialize(value).map_err(|e| malformed(path, e))?;

        let tx_commitment = match (raw.op_return_value, raw.btc_tx_id) {
            (Some(op_return_value), Some(btc_tx_id)) => {
                let txid = Txid::from_str(&btc_tx_id)
                    .map_err(|e| malformed(path, format!("invalid `btcTxId`: {e}")))?;
                let op_return_value = decode_hex_value(path, "opReturnValue", &op_return_value)?;
                Some(TxCommitment {
                    txid,
                    op_return_value,
                })
            }
            (None, None) => None,
            _ => {
                return Err(malformed(
                    path,
                    "`opReturnValue` and `btcTxId` must be given together",
                ))
            }
        };

        let mut anchors = raw
            .anchors
            .iter()
            .enumerate()
            .map(|(i, anchor)| decode_anchor(&format!("{path}.anchors[{i}]"), anchor))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(tx_commitment) = tx_commitment {
            let mut attached = false;
            for anchor in anchors.iter_mut() {
                if let Anchor::Bitcoin(anchor) = anchor {
                    anchor.tx_commitment = Some(tx_commitment.clone());
                    attached = true;
                }
            }
            if !attached {
                return Err(malformed(
                    path,
                    "`opReturnValue`/`btcTxId` given on a branch without bitcoin anchors",
                ));
            }
        }

        let branches = raw
            .branches
            .iter()
            .enumerate()
            .map(|(i, branch)| Branch::decode(&format!("{path}.branches[{i}]"), branch))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            label: raw.label,
            anchors,
            branches,
        })
    }
}

fn decode_anchor(path: &str, value: &Value) -> Result<Anchor, VerificationError> {
    let raw = RawAnchor::deserialize(value).map_err(|e| malformed(path, e))?;
    let anchor_id = match &raw.anchor_id {
        Value::String(id) => id.clone(),
        Value::Number(id) => id.to_string(),
        other => return Err(malformed(path, format!("invalid `anchor_id`: {other}"))),
    };
    let expected_value = decode_hex_value(path, "expected_value", &raw.expected_value)?;

    match raw.anchor_type.as_str() {
        "cal" | "tcal" => Ok(Anchor::Calendar(CalendarAnchor {
            anchor_id,
            uris: raw.uris,
            expected_value,
            testnet: raw.anchor_type == "tcal",
        })),
        "btc" | "tbtc" => {
            let block_height = anchor_id.parse::<u32>().map_err(|e| {
                malformed(path, format!("`anchor_id` {anchor_id:?} is not a block height: {e}"))
            })?;
            let network = if raw.anchor_type == "btc" {
                Network::Bitcoin
            } else {
                Network::Testnet
            };
            Ok(Anchor::Bitcoin(BitcoinAnchor {
                block_height,
                uris: raw.uris,
                expected_value,
                network,
                tx_commitment: None,
            }))
        }
        other => Err(malformed(path, format!("unsupported anchor type {other:?}"))),
    }
}
