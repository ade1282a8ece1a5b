//! Billing provider configuration

use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

use crate::application::ReconciliationSettings;

use super::error::ValidationError;
use super::Environment;

/// Where the billing client obtains OAuth access tokens.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenSourceKind {
    /// Host metadata server (service account attached to the VM or pod)
    #[default]
    Metadata,
    /// Fixed `access_token`, for local runs
    Static,
}

/// Android Publisher API and reconciliation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default)]
    pub token_source: TokenSourceKind,

    /// Bearer token used when `token_source = static`
    pub access_token: Option<SecretString>,

    #[serde(default = "default_metadata_token_url")]
    pub metadata_token_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Acknowledge fulfilled purchases so the provider does not refund them
    #[serde(default = "default_true")]
    pub acknowledge_purchases: bool,

    /// Realm assigned to users created for purchases without an account
    #[serde(default = "default_anonymous_user_realm")]
    pub anonymous_user_realm: String,

    /// Retries granted to each scheduled recurring charge
    #[serde(default = "default_recurring_retry_budget")]
    pub recurring_retry_budget: u32,
}

impl BillingConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reconciliation_settings(&self) -> ReconciliationSettings {
        ReconciliationSettings {
            anonymous_user_realm: self.anonymous_user_realm.clone(),
            recurring_retry_budget: self.recurring_retry_budget,
            acknowledge_purchases: self.acknowledge_purchases,
        }
    }

    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://") {
            return Err(ValidationError::InvalidBillingUrl);
        }
        if self.request_timeout_secs == 0 || self.request_timeout_secs > 300 {
            return Err(ValidationError::InvalidTimeout("billing.request_timeout_secs"));
        }
        if self.anonymous_user_realm.trim().is_empty() {
            return Err(ValidationError::MissingRequired("BILLING__ANONYMOUS_USER_REALM"));
        }
        if self.token_source == TokenSourceKind::Static && self.access_token.is_none() {
            return Err(ValidationError::MissingRequired("BILLING__ACCESS_TOKEN"));
        }

        if *environment == Environment::Production {
            if !self.api_base_url.starts_with("https://") {
                return Err(ValidationError::BillingUrlMustBeHttps);
            }
            if self.token_source == TokenSourceKind::Static {
                return Err(ValidationError::StaticTokenInProduction);
            }
        }
        Ok(())
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            token_source: TokenSourceKind::default(),
            access_token: None,
            metadata_token_url: default_metadata_token_url(),
            request_timeout_secs: default_request_timeout(),
            acknowledge_purchases: true,
            anonymous_user_realm: default_anonymous_user_realm(),
            recurring_retry_budget: default_recurring_retry_budget(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://androidpublisher.googleapis.com/androidpublisher/v3".to_string()
}

fn default_metadata_token_url() -> String {
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token"
        .to_string()
}

fn default_request_timeout() -> u64 {
    20
}

fn default_true() -> bool {
    true
}

fn default_anonymous_user_realm() -> String {
    "google_play".to_string()
}

fn default_recurring_retry_budget() -> u32 {
    3
}
