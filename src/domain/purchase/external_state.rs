//! Authoritative subscription state as reported by the billing provider.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

use super::OrderId;

/// Payment state of the current billing period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Pending,
    Received,
    FreeTrial,
    PendingDeferred,
}

impl PaymentState {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(PaymentState::Pending),
            1 => Some(PaymentState::Received),
            2 => Some(PaymentState::FreeTrial),
            3 => Some(PaymentState::PendingDeferred),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcknowledgementState {
    Pending,
    Acknowledged,
}

impl AcknowledgementState {
    pub fn from_code(code: i32) -> Self {
        if code == 1 {
            AcknowledgementState::Acknowledged
        } else {
            AcknowledgementState::Pending
        }
    }
}

/// Why the provider stopped renewing the subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelCode {
    User,
    System,
    Replaced,
    Developer,
}

impl CancelCode {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(CancelCode::User),
            1 => Some(CancelCode::System),
            2 => Some(CancelCode::Replaced),
            3 => Some(CancelCode::Developer),
            _ => None,
        }
    }
}

/// Answer to the cancellation survey shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyReason {
    Other,
    NotEnoughUse,
    TechnicalIssues,
    CostRelated,
    FoundBetterApp,
}

impl SurveyReason {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(SurveyReason::Other),
            1 => Some(SurveyReason::NotEnoughUse),
            2 => Some(SurveyReason::TechnicalIssues),
            3 => Some(SurveyReason::CostRelated),
            4 => Some(SurveyReason::FoundBetterApp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SurveyReason::Other => "other",
            SurveyReason::NotEnoughUse => "not_enough_use",
            SurveyReason::TechnicalIssues => "technical_issues",
            SurveyReason::CostRelated => "cost_related",
            SurveyReason::FoundBetterApp => "found_better_app",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelSurveyResult {
    pub reason: Option<SurveyReason>,
    pub user_input: Option<String>,
}

/// Structured cancellation reason stored in ledger metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancellationReason {
    UserCanceled {
        survey_reason: Option<SurveyReason>,
        user_input: Option<String>,
    },
    SystemCanceled,
    ReplacedByUpgrade,
    DeveloperCanceled,
    Unspecified,
}

impl CancellationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancellationReason::UserCanceled { .. } => "user_canceled",
            CancellationReason::SystemCanceled => "system_canceled",
            CancellationReason::ReplacedByUpgrade => "replaced_by_upgrade",
            CancellationReason::DeveloperCanceled => "developer_canceled",
            CancellationReason::Unspecified => "unspecified",
        }
    }

    /// Human-readable fragment for ledger notes.
    pub fn describe(&self) -> String {
        match self {
            CancellationReason::UserCanceled {
                survey_reason: Some(reason),
                ..
            } => format!("canceled by user ({})", reason.as_str()),
            CancellationReason::UserCanceled { .. } => "canceled by user".to_string(),
            CancellationReason::SystemCanceled => "canceled by billing system".to_string(),
            CancellationReason::ReplacedByUpgrade => "replaced by a new subscription".to_string(),
            CancellationReason::DeveloperCanceled => "canceled by developer".to_string(),
            CancellationReason::Unspecified => "canceled".to_string(),
        }
    }
}

/// Normalized view of the provider's subscription purchase resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSubscriptionState {
    pub order_id: Option<OrderId>,
    pub start_time: Timestamp,
    pub expiry_time: Timestamp,
    pub auto_renewing: bool,
    pub payment_state: Option<PaymentState>,
    pub cancel_reason: Option<CancelCode>,
    pub cancel_survey_result: Option<CancelSurveyResult>,
    pub user_cancellation_time: Option<Timestamp>,
    pub acknowledgement_state: AcknowledgementState,
    pub obfuscated_external_account_id: Option<String>,
    pub developer_payload: Option<String>,
    pub linked_purchase_token: Option<String>,
}

impl ExternalSubscriptionState {
    /// Payment is settled or the period is a free trial.
    pub fn is_payment_confirmed(&self) -> bool {
        matches!(
            self.payment_state,
            Some(PaymentState::Received) | Some(PaymentState::FreeTrial)
        )
    }

    pub fn is_free_trial(&self) -> bool {
        self.payment_state == Some(PaymentState::FreeTrial)
    }

    pub fn is_payment_pending(&self) -> bool {
        self.payment_state == Some(PaymentState::Pending)
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledgement_state == AcknowledgementState::Acknowledged
    }

    /// Expiry normalized to whole seconds, the precision the ledger keeps.
    pub fn expiry_secs(&self) -> Timestamp {
        self.expiry_time.truncate_to_secs()
    }

    /// Opaque account identifier, preferring the modern field over the
    /// legacy developer payload (`{"account_id": "..."}`).
    pub fn external_account_id(&self) -> Option<String> {
        if let Some(id) = self
            .obfuscated_external_account_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
        {
            return Some(id.to_string());
        }

        let payload = self.developer_payload.as_deref()?;
        let value: serde_json::Value = serde_json::from_str(payload).ok()?;
        value
            .get("account_id")
            .and_then(|v| v.as_str())
            .filter(|id| !id.trim().is_empty())
            .map(str::to_string)
    }

    pub fn cancellation_reason(&self) -> CancellationReason {
        match self.cancel_reason {
            Some(CancelCode::User) => {
                let survey = self.cancel_survey_result.as_ref();
                CancellationReason::UserCanceled {
                    survey_reason: survey.and_then(|s| s.reason),
                    user_input: survey
                        .and_then(|s| s.user_input.clone())
                        .filter(|input| !input.trim().is_empty()),
                }
            }
            Some(CancelCode::System) => CancellationReason::SystemCanceled,
            Some(CancelCode::Replaced) => CancellationReason::ReplacedByUpgrade,
            Some(CancelCode::Developer) => CancellationReason::DeveloperCanceled,
            None => CancellationReason::Unspecified,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Confirmed, auto-renewing, unacknowledged state used across tests.
    pub fn state(order_id: &str, start_ms: i64, expiry_ms: i64) -> ExternalSubscriptionState {
        ExternalSubscriptionState {
            order_id: Some(OrderId::new(order_id).unwrap()),
            start_time: Timestamp::from_millis(start_ms).unwrap(),
            expiry_time: Timestamp::from_millis(expiry_ms).unwrap(),
            auto_renewing: true,
            payment_state: Some(PaymentState::Received),
            cancel_reason: None,
            cancel_survey_result: None,
            user_cancellation_time: None,
            acknowledgement_state: AcknowledgementState::Pending,
            obfuscated_external_account_id: None,
            developer_payload: None,
            linked_purchase_token: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::state;
    use super::*;

    #[test]
    fn received_and_trial_are_confirmed() {
        let mut s = state("GPA.1", 0, 1_000);
        assert!(s.is_payment_confirmed());

        s.payment_state = Some(PaymentState::FreeTrial);
        assert!(s.is_payment_confirmed());
        assert!(s.is_free_trial());

        s.payment_state = Some(PaymentState::Pending);
        assert!(!s.is_payment_confirmed());

        s.payment_state = Some(PaymentState::PendingDeferred);
        assert!(!s.is_payment_confirmed());
    }

    #[test]
    fn modern_account_id_wins_over_payload() {
        let mut s = state("GPA.1", 0, 1_000);
        s.obfuscated_external_account_id = Some("acct-modern".to_string());
        s.developer_payload = Some(r#"{"account_id":"acct-legacy"}"#.to_string());

        assert_eq!(s.external_account_id(), Some("acct-modern".to_string()));
    }

    #[test]
    fn legacy_payload_account_id_is_used() {
        let mut s = state("GPA.1", 0, 1_000);
        s.developer_payload = Some(r#"{"account_id":"acct-legacy"}"#.to_string());

        assert_eq!(s.external_account_id(), Some("acct-legacy".to_string()));
    }

    #[test]
    fn free_form_payload_has_no_account_id() {
        let mut s = state("GPA.1", 0, 1_000);
        s.developer_payload = Some("not json".to_string());

        assert_eq!(s.external_account_id(), None);
    }

    #[test]
    fn user_cancellation_carries_survey() {
        let mut s = state("GPA.1", 0, 1_000);
        s.cancel_reason = Some(CancelCode::User);
        s.cancel_survey_result = Some(CancelSurveyResult {
            reason: Some(SurveyReason::CostRelated),
            user_input: Some("too expensive".to_string()),
        });

        let reason = s.cancellation_reason();
        assert_eq!(reason.as_str(), "user_canceled");
        assert_eq!(
            reason,
            CancellationReason::UserCanceled {
                survey_reason: Some(SurveyReason::CostRelated),
                user_input: Some("too expensive".to_string()),
            }
        );
        assert_eq!(reason.describe(), "canceled by user (cost_related)");
    }

    #[test]
    fn replaced_cancellation_maps_to_upgrade() {
        let mut s = state("GPA.1", 0, 1_000);
        s.cancel_reason = Some(CancelCode::Replaced);
        assert_eq!(s.cancellation_reason(), CancellationReason::ReplacedByUpgrade);
    }

    #[test]
    fn expiry_is_normalized_to_seconds() {
        let s = state("GPA.1", 0, 1_903_548_057_456);
        assert_eq!(s.expiry_secs().as_millis(), 1_903_548_057_000);
    }
}
