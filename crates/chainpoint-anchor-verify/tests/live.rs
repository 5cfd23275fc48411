//! Checks against the public Chainpoint calendar and Blockstream's Esplora.
//!
//! Run with `cargo test -- --ignored`.

use std::sync::Arc;

use bitcoin::{Network, Txid};
use chainpoint_anchor_verify::{
    AnchorResolver, BitcoinCrossValidator, Branch, CancelToken, EsploraExplorer, ReqwestHttp,
    VerificationError, Verifier, VerifierConfig,
};
use serde_json::json;

const CAL_HASH: &str = "4690932f928fb7f7ce6e6c49ee95851742231709360be28b7ce2af7b92cfa95b";
const BLOCK_HEIGHT: u32 = 503275;
const MERKLE_ROOT: &str = "c617f5faca34474bea7020d75c39cb8427a32145f9646586ecb9184002131ad9";
const TX_ID: &str = "ba3c8c3e547ed73471c28a69659373f3f0a3b726aab31cdecd14513d9c581f1e";
const OP_RETURN: &str = "267335262e21e7adb4220068b4b90b7ff066324935d7f61ceab2a64080b06b1b";

fn http() -> Arc<ReqwestHttp> {
    let config = VerifierConfig::default();
    Arc::new(ReqwestHttp::new(config.http_timeout()).expect("failed to build HTTP client"))
}

fn verifier() -> Verifier {
    Verifier::from_config(&VerifierConfig::default()).expect("failed to build verifier")
}

#[tokio::test]
#[ignore = "requires network access"]
async fn calendar_hash_with_duplicate_uris() {
    let uris = vec![
        "https://a.chainpoint.org/calendar/985635/hash".to_string(),
        "https://a.chainpoint.org/calendar/985635/hash".to_string(),
    ];
    let res = AnchorResolver::new(http())
        .resolve(&CancelToken::never(), &uris, CAL_HASH)
        .await;
    assert!(res.is_ok(), "{res:?}");
}

#[tokio::test]
#[ignore = "requires network access"]
async fn unresolvable_host() {
    let err = AnchorResolver::new(http())
        .resolve(
            &CancelToken::never(),
            &["http://skldfjklasdfk.com".to_string()],
            "",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, VerificationError::Transport { .. }), "{err}");
    assert!(err.to_string().ends_with("no such host"), "{err}");
}

#[tokio::test]
#[ignore = "requires network access"]
async fn missing_calendar_resource() {
    let err = AnchorResolver::new(http())
        .resolve(
            &CancelToken::never(),
            &["https://a.chainpoint.org/notexists".to_string()],
            "",
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("404 Not Found"), "{err}");
}

#[tokio::test]
#[ignore = "requires network access"]
async fn bitcoin_cross_validation() {
    let explorer = EsploraExplorer::new(VerifierConfig::default().esplora_url, http());
    let txid: Txid = TX_ID.parse().unwrap();
    let res = BitcoinCrossValidator::new(Arc::new(explorer))
        .cross_validate(&CancelToken::never(), BLOCK_HEIGHT, &txid, MERKLE_ROOT, OP_RETURN)
        .await;
    assert!(res.is_ok(), "{res:?}");
}

#[tokio::test]
#[ignore = "requires network access"]
async fn bitcoin_branch() {
    let branch = Branch::from_json(&json!({
        "label": "btc_anchor_branch",
        "anchors": [{
            "type": "btc",
            "anchor_id": BLOCK_HEIGHT.to_string(),
            "uris": ["https://a.chainpoint.org/calendar/985814/data"],
            "expected_value": MERKLE_ROOT,
        }],
        "opReturnValue": OP_RETURN,
        "btcTxId": TX_ID,
    }))
    .unwrap();

    let res = verifier().verify_branch(&CancelToken::never(), &branch).await;
    assert!(res.is_ok(), "{res:?}");
}

#[tokio::test]
#[ignore = "requires network access"]
async fn inconsistent_calendar_branch() {
    let branch = Branch::from_json(&json!({
        "label": "cal_anchor_branch",
        "anchors": [
            {
                "type": "cal",
                "anchor_id": "985637",
                "uris": ["https://a.chainpoint.org/calendar/985637/hash"],
                "expected_value": CAL_HASH,
            },
            {
                "type": "cal",
                "anchor_id": "985635",
                "uris": [
                    "https://a.chainpoint.org/calendar/985635/hash",
                    "https://a.chainpoint.org/calendar/985635/hash",
                    "https://a.chainpoint.org/calendar/985635/hash",
                ],
                "expected_value": CAL_HASH,
            },
            {
                "type": "cal",
                "anchor_id": "985635",
                "uris": ["https://a.chainpoint.org/calendar/985635/hash"],
                "expected_value": CAL_HASH,
            },
        ],
    }))
    .unwrap();

    let err = verifier()
        .verify_branch(&CancelToken::never(), &branch)
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("branch cal_anchor_branch: anchor #0"), "{err}");
}

#[tokio::test]
#[ignore = "requires network access"]
async fn testnet_explorer_is_used_for_testnet_anchors() {
    let verifier = Verifier::new(http()).with_explorer(
        Network::Testnet,
        Arc::new(EsploraExplorer::new(
            VerifierConfig::default()
                .esplora_testnet_url
                .unwrap_or_default(),
            http(),
        )),
    );
    // Mainnet anchor, testnet-only verifier
    let branch = Branch::from_json(&json!({
        "anchors": [{
            "type": "btc",
            "anchor_id": BLOCK_HEIGHT.to_string(),
            "uris": ["https://a.chainpoint.org/calendar/985814/data"],
            "expected_value": MERKLE_ROOT,
        }],
        "opReturnValue": OP_RETURN,
        "btcTxId": TX_ID,
    }))
    .unwrap();

    let err = verifier
        .verify_branch(&CancelToken::never(), &branch)
        .await
        .unwrap_err();
    assert!(
        matches!(err.root_cause(), VerificationError::NoExplorer { network: Network::Bitcoin }),
        "{err}"
    );
}
