//! OAuth access tokens for the Android Publisher API.
//!
//! Production workers run with a service account attached to the host and
//! fetch short-lived tokens from the metadata server. Local runs and tests
//! use a static token.

use secrecy::{ExposeSecret, SecretString};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::ports::BillingError;

use super::dto::MetadataTokenResponse;

/// Tokens are refreshed this long before the server-reported expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

pub struct CachedToken {
    value: SecretString,
    refresh_at: Instant,
}

/// Where bearer tokens come from.
pub enum AccessTokenSource {
    Static(SecretString),
    MetadataServer {
        url: String,
        cached: Mutex<Option<CachedToken>>,
    },
}

impl AccessTokenSource {
    pub fn fixed(token: SecretString) -> Self {
        AccessTokenSource::Static(token)
    }

    pub fn metadata_server(url: impl Into<String>) -> Self {
        AccessTokenSource::MetadataServer {
            url: url.into(),
            cached: Mutex::new(None),
        }
    }

    /// Returns the `Authorization` header value.
    pub async fn authorization(&self, http: &reqwest::Client) -> Result<String, BillingError> {
        match self {
            AccessTokenSource::Static(token) => Ok(format!("Bearer {}", token.expose_secret())),
            AccessTokenSource::MetadataServer { url, cached } => {
                let mut guard = cached.lock().await;
                if let Some(token) = guard.as_ref().filter(|t| Instant::now() < t.refresh_at) {
                    return Ok(format!("Bearer {}", token.value.expose_secret()));
                }

                let fresh = fetch_metadata_token(http, url).await?;
                let header = format!("Bearer {}", fresh.access_token);
                let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(REFRESH_MARGIN);
                *guard = Some(CachedToken {
                    value: SecretString::new(fresh.access_token),
                    refresh_at: Instant::now() + lifetime,
                });
                tracing::debug!(expires_in = fresh.expires_in, "Refreshed billing API access token");
                Ok(header)
            }
        }
    }
}

async fn fetch_metadata_token(
    http: &reqwest::Client,
    url: &str,
) -> Result<MetadataTokenResponse, BillingError> {
    let response = http
        .get(url)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(|e| BillingError::Unavailable(format!("metadata server: {}", e)))?;

    if !response.status().is_success() {
        return Err(BillingError::Unavailable(format!(
            "metadata server returned {}",
            response.status()
        )));
    }

    response
        .json::<MetadataTokenResponse>()
        .await
        .map_err(|e| BillingError::InvalidResponse(format!("metadata token: {}", e)))
}
