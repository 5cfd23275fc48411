//! HTTP GET capability used to reach calendars and block explorers.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use tracing::debug;

use crate::error::VerificationError;

/// Raw answer of an HTTP GET
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl HttpResponse {
    /// Turn a non-2xx answer into [`VerificationError::HttpStatus`]
    pub fn error_for_status(self, url: &str) -> Result<Self, VerificationError> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(VerificationError::HttpStatus {
                status: self.status,
                url: url.to_string(),
            })
        }
    }

    /// Body as trimmed UTF-8 text
    pub fn text(&self, url: &str) -> Result<String, VerificationError> {
        std::str::from_utf8(&self.body)
            .map(|text| text.trim().to_string())
            .map_err(|e| VerificationError::InvalidResponse {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Something that can GET a URL.
///
/// Implementations report transport failures as [`VerificationError::Transport`] and must not
/// interpret the status code. Cancellation is applied by the caller, which drops the future.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpGet: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, VerificationError>;
}

/// Default request timeout for calendar and explorer endpoints
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// [`HttpGet`] backed by a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    pub fn new(timeout: Duration) -> Result<Self, VerificationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("chainpoint-anchor-verify/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| VerificationError::Transport {
                url: String::new(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpGet for ReqwestHttp {
    async fn get(&self, url: &str) -> Result<HttpResponse, VerificationError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() && is_dns_failure(&e) {
                    VerificationError::unresolved_host(url)
                } else {
                    VerificationError::transport(url, &e)
                }
            })?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| VerificationError::transport(url, &e))?;
        debug!("GET {} -> {}", url, status);
        Ok(HttpResponse { status, body })
    }
}

/// Whether name resolution failed somewhere in the source chain of `err`
fn is_dns_failure(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut cause = Some(err);
    while let Some(err) = cause {
        let text = err.to_string();
        // hyper-util's connector error, then the resolver's io::Error
        if text.starts_with("dns error") || text.starts_with("failed to lookup address") {
            return true;
        }
        cause = err.source();
    }
    false
}
