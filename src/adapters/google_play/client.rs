//! Android Publisher API client.
//!
//! Implements [`BillingVerificationClient`] against
//! `purchases.subscriptions.get` and `purchases.subscriptions.acknowledge`.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

use crate::config::{BillingConfig, TokenSourceKind};
use crate::domain::purchase::{redact, ExternalSubscriptionState};
use crate::ports::{BillingError, BillingVerificationClient, SubscriptionRef};

use super::dto::{ApiErrorEnvelope, SubscriptionPurchaseDto};
use super::token_source::AccessTokenSource;

pub struct GooglePlayBillingClient {
    api_base_url: String,
    tokens: AccessTokenSource,
    http_client: reqwest::Client,
}

impl GooglePlayBillingClient {
    pub fn new(
        api_base_url: impl Into<String>,
        tokens: AccessTokenSource,
        request_timeout: Duration,
    ) -> Result<Self, BillingError> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| BillingError::Unavailable(format!("http client: {}", e)))?;

        Ok(Self {
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            tokens,
            http_client,
        })
    }

    pub fn from_config(config: &BillingConfig) -> Result<Self, BillingError> {
        let tokens = match config.token_source {
            TokenSourceKind::Static => match &config.access_token {
                Some(token) => {
                    AccessTokenSource::fixed(SecretString::new(token.expose_secret().clone()))
                }
                None => {
                    return Err(BillingError::Unavailable(
                        "static token source without access_token".to_string(),
                    ))
                }
            },
            TokenSourceKind::Metadata => {
                AccessTokenSource::metadata_server(config.metadata_token_url.clone())
            }
        };
        Self::new(config.api_base_url.clone(), tokens, config.request_timeout())
    }

    fn subscription_url(&self, subscription: &SubscriptionRef) -> String {
        format!(
            "{}/applications/{}/purchases/subscriptions/{}/tokens/{}",
            self.api_base_url,
            subscription.package_name,
            subscription.product_id,
            subscription.purchase_token
        )
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        subscription: &SubscriptionRef,
    ) -> Result<reqwest::Response, BillingError> {
        let authorization = self.tokens.authorization(&self.http_client).await?;
        let response = request
            .header(reqwest::header::AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| BillingError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = classify_failure(status, &body, &subscription.purchase_token);
        tracing::warn!(
            status = status.as_u16(),
            purchase_token = redact(&subscription.purchase_token),
            error = %error,
            "Billing API request failed"
        );
        Err(error)
    }
}

/// Maps a non-success response onto the port's error vocabulary.
fn classify_failure(status: StatusCode, body: &str, purchase_token: &str) -> BillingError {
    let message = serde_json::from_str::<ApiErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());

    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => {
            BillingError::NotFound(redact(purchase_token).to_string())
        }
        StatusCode::CONFLICT => BillingError::AlreadyAcknowledged,
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::REQUEST_TIMEOUT => {
            BillingError::Unavailable(format!("{}: {}", status, message))
        }
        s if s.is_server_error() => BillingError::Unavailable(format!("{}: {}", status, message)),
        _ => BillingError::InvalidResponse(format!("{}: {}", status, message)),
    }
}

#[async_trait]
impl BillingVerificationClient for GooglePlayBillingClient {
    async fn get_subscription(
        &self,
        subscription: &SubscriptionRef,
    ) -> Result<ExternalSubscriptionState, BillingError> {
        let request = self.http_client.get(self.subscription_url(subscription));
        let response = self.send(request, subscription).await?;

        let dto: SubscriptionPurchaseDto = response
            .json()
            .await
            .map_err(|e| BillingError::InvalidResponse(e.to_string()))?;
        ExternalSubscriptionState::try_from(dto)
    }

    async fn acknowledge(&self, subscription: &SubscriptionRef) -> Result<(), BillingError> {
        let url = format!("{}:acknowledge", self.subscription_url(subscription));
        let request = self.http_client.post(url).json(&serde_json::json!({}));
        self.send(request, subscription).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GooglePlayBillingClient {
        GooglePlayBillingClient::new(
            "https://androidpublisher.googleapis.com/androidpublisher/v3/",
            AccessTokenSource::fixed(SecretString::new("token".to_string())),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn builds_subscription_url() {
        let url = client().subscription_url(&SubscriptionRef::new("com.example.app", "monthly", "tok-1"));
        assert_eq!(
            url,
            "https://androidpublisher.googleapis.com/androidpublisher/v3/applications/com.example.app/purchases/subscriptions/monthly/tokens/tok-1"
        );
    }

    #[test]
    fn gone_and_missing_purchases_are_not_found() {
        for status in [StatusCode::NOT_FOUND, StatusCode::GONE] {
            assert!(matches!(
                classify_failure(status, "", "tok"),
                BillingError::NotFound(_)
            ));
        }
    }

    #[test]
    fn conflict_means_already_acknowledged() {
        assert_eq!(
            classify_failure(StatusCode::CONFLICT, "", "tok"),
            BillingError::AlreadyAcknowledged
        );
    }

    #[test]
    fn server_errors_and_throttling_are_retryable() {
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::UNAUTHORIZED,
        ] {
            assert!(classify_failure(status, "", "tok").is_retryable());
        }
    }

    #[test]
    fn bad_request_carries_api_message() {
        let body = r#"{"error": {"code": 400, "message": "Invalid package name"}}"#;
        match classify_failure(StatusCode::BAD_REQUEST, body, "tok") {
            BillingError::InvalidResponse(message) => assert!(message.contains("Invalid package name")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn unreachable_api_is_unavailable() {
        let client = GooglePlayBillingClient::new(
            "http://127.0.0.1:9",
            AccessTokenSource::fixed(SecretString::new("token".to_string())),
            Duration::from_secs(1),
        )
        .unwrap();
        let err = client
            .get_subscription(&SubscriptionRef::new("com.example.app", "monthly", "tok"))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Unavailable(_)));
    }
}
