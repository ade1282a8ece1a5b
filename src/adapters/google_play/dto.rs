//! Wire types for the Android Publisher `purchases.subscriptions` resource.
//!
//! The API encodes millisecond timestamps as decimal strings and enums as
//! integers; conversion into [`ExternalSubscriptionState`] happens here so
//! the rest of the crate never sees the wire shape.

use serde::Deserialize;

use crate::domain::foundation::Timestamp;
use crate::domain::purchase::{
    AcknowledgementState, CancelCode, CancelSurveyResult, ExternalSubscriptionState, OrderId,
    PaymentState, SurveyReason,
};
use crate::ports::BillingError;

/// `SubscriptionPurchase` as returned by `purchases.subscriptions.get`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPurchaseDto {
    pub order_id: Option<String>,
    pub start_time_millis: String,
    pub expiry_time_millis: String,
    #[serde(default)]
    pub auto_renewing: bool,
    pub payment_state: Option<i32>,
    pub cancel_reason: Option<i32>,
    pub cancel_survey_result: Option<CancelSurveyResultDto>,
    pub user_cancellation_time_millis: Option<String>,
    #[serde(default)]
    pub acknowledgement_state: i32,
    pub obfuscated_external_account_id: Option<String>,
    pub developer_payload: Option<String>,
    pub linked_purchase_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSurveyResultDto {
    pub cancel_survey_reason: Option<i32>,
    pub user_input_cancel_reason: Option<String>,
}

/// Google API error envelope: `{"error": {"code": 404, "message": "..."}}`.
///
/// Only the message is kept; the HTTP status already carries the code.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
}

/// Response of the compute metadata server token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataTokenResponse {
    pub access_token: String,
    pub expires_in: u64,
}

fn parse_millis(field: &str, raw: &str) -> Result<Timestamp, BillingError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(Timestamp::from_millis)
        .ok_or_else(|| BillingError::InvalidResponse(format!("{} is not epoch millis: {}", field, raw)))
}

impl TryFrom<SubscriptionPurchaseDto> for ExternalSubscriptionState {
    type Error = BillingError;

    fn try_from(dto: SubscriptionPurchaseDto) -> Result<Self, Self::Error> {
        let order_id = match dto.order_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => Some(
                OrderId::new(id).map_err(|e| BillingError::InvalidResponse(e.to_string()))?,
            ),
            None => None,
        };

        let user_cancellation_time = dto
            .user_cancellation_time_millis
            .as_deref()
            .map(|raw| parse_millis("userCancellationTimeMillis", raw))
            .transpose()?;

        Ok(ExternalSubscriptionState {
            order_id,
            start_time: parse_millis("startTimeMillis", &dto.start_time_millis)?,
            expiry_time: parse_millis("expiryTimeMillis", &dto.expiry_time_millis)?,
            auto_renewing: dto.auto_renewing,
            payment_state: dto.payment_state.and_then(PaymentState::from_code),
            cancel_reason: dto.cancel_reason.and_then(CancelCode::from_code),
            cancel_survey_result: dto.cancel_survey_result.map(|survey| CancelSurveyResult {
                reason: survey.cancel_survey_reason.and_then(SurveyReason::from_code),
                user_input: survey.user_input_cancel_reason,
            }),
            user_cancellation_time,
            acknowledgement_state: AcknowledgementState::from_code(dto.acknowledgement_state),
            obfuscated_external_account_id: dto.obfuscated_external_account_id,
            developer_payload: dto.developer_payload,
            linked_purchase_token: dto.linked_purchase_token,
        })
    }
}
