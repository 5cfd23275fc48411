//! Resolution of anchor URIs against the values calendars publish.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::VerificationError;
use crate::http::HttpGet;

/// Fetches the values published at anchor URIs and checks them against the proof
#[derive(Clone)]
pub struct AnchorResolver {
    http: Arc<dyn HttpGet>,
}

impl AnchorResolver {
    pub fn new(http: Arc<dyn HttpGet>) -> Self {
        Self { http }
    }

    /// Require every unique URI in `uris` to publish `expected_value`.
    ///
    /// URIs are fetched concurrently, but the reported failure is always the one belonging to
    /// the earliest URI in input order. Remaining fetches are aborted as soon as the outcome is
    /// known.
    pub async fn resolve(
        &self,
        cancel: &CancelToken,
        uris: &[String],
        expected_value: &str,
    ) -> Result<(), VerificationError> {
        cancel.run(self.resolve_all(uris, expected_value)).await
    }

    async fn resolve_all(
        &self,
        uris: &[String],
        expected_value: &str,
    ) -> Result<(), VerificationError> {
        let uris = unique_uris(uris);
        if uris.is_empty() {
            return Err(VerificationError::NoUris);
        }
        let expected_value = expected_value.to_ascii_lowercase();

        let mut tasks = JoinSet::new();
        for (index, uri) in uris.iter().enumerate() {
            let http = self.http.clone();
            let uri = uri.to_string();
            let expected_value = expected_value.clone();
            tasks.spawn(async move {
                let outcome = verify_uri(http.as_ref(), &uri, &expected_value).await;
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<Result<(), VerificationError>>> =
            uris.iter().map(|_| None).collect();
        let mut decided = 0;
        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) = match joined {
                Ok(res) => res,
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(_) => return Err(VerificationError::Canceled),
            };
            outcomes[index] = Some(outcome);

            // Settle the longest prefix of finished URIs, in input order
            while let Some(slot) = outcomes.get_mut(decided) {
                match slot.take() {
                    Some(Ok(())) => decided += 1,
                    Some(Err(err)) => return Err(err),
                    None => break,
                }
            }
        }
        Ok(())
    }
}

/// Drop repeated URIs, keeping the first occurrence of each
pub fn unique_uris(uris: &[String]) -> Vec<&str> {
    let mut unique: Vec<&str> = Vec::with_capacity(uris.len());
    for uri in uris {
        if !unique.contains(&uri.as_str()) {
            unique.push(uri);
        }
    }
    unique
}

async fn verify_uri(
    http: &dyn HttpGet,
    uri: &str,
    expected_value: &str,
) -> Result<(), VerificationError> {
    let value = fetch_anchor_value(http, uri).await?;
    debug!("{} publishes {}", uri, value);
    if value != expected_value {
        return Err(VerificationError::ValueMismatch {
            url: uri.to_string(),
            expected: expected_value.to_string(),
            actual: value,
        });
    }
    Ok(())
}

/// Value published at a calendar URI.
///
/// Calendar `/hash` endpoints publish the block hash and `/data` endpoints the anchored data
/// value (for Bitcoin anchors the block merkle root, in display byte order), both as bare hex.
pub async fn fetch_anchor_value(http: &dyn HttpGet, uri: &str) -> Result<String, VerificationError> {
    let response = http.get(uri).await?.error_for_status(uri)?;
    let body = response.text(uri)?;
    if body.is_empty() {
        return Err(VerificationError::InvalidResponse {
            url: uri.to_string(),
            reason: "empty body".to_string(),
        });
    }
    hex::decode(&body).map_err(|e| VerificationError::InvalidResponse {
        url: uri.to_string(),
        reason: format!("body is not hex: {e}"),
    })?;
    Ok(body.to_ascii_lowercase())
}
