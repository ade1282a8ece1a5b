//! Recurring-charge schedule history.
//!
//! Each purchase token owns an append-only history of entries linked through
//! `previous_id`. The newest entry is the head; an `Active` head is the next
//! scheduled charge attempt.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    PaymentId, RecurringChargeId, StateMachine, Timestamp, ValidationError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurringChargeState {
    /// Scheduled; the scheduler will attempt the charge at `charge_at`.
    Active,
    /// Stopped because the user canceled.
    UserStop,
    /// Stopped by the system (refund, void, exhausted retries).
    SystemStop,
    /// The charge succeeded and is linked to its payment.
    Charged,
    ChargeFailed,
}

impl RecurringChargeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurringChargeState::Active => "active",
            RecurringChargeState::UserStop => "user_stop",
            RecurringChargeState::SystemStop => "system_stop",
            RecurringChargeState::Charged => "charged",
            RecurringChargeState::ChargeFailed => "charge_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(RecurringChargeState::Active),
            "user_stop" => Some(RecurringChargeState::UserStop),
            "system_stop" => Some(RecurringChargeState::SystemStop),
            "charged" => Some(RecurringChargeState::Charged),
            "charge_failed" => Some(RecurringChargeState::ChargeFailed),
            _ => None,
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(
            self,
            RecurringChargeState::UserStop | RecurringChargeState::SystemStop
        )
    }
}

impl StateMachine for RecurringChargeState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use RecurringChargeState::*;
        matches!(
            (self, target),
            (Active, UserStop)
                | (Active, SystemStop)
                | (Active, Charged)
                | (Active, ChargeFailed)
                | (UserStop, Active)
                | (UserStop, SystemStop)
                | (SystemStop, Active)
                | (ChargeFailed, Active)
                | (ChargeFailed, SystemStop)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use RecurringChargeState::*;
        match self {
            Active => vec![UserStop, SystemStop, Charged, ChargeFailed],
            UserStop => vec![Active, SystemStop],
            SystemStop => vec![Active],
            ChargeFailed => vec![Active, SystemStop],
            Charged => vec![],
        }
    }
}

/// One entry of a recurring-charge history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringCharge {
    pub id: RecurringChargeId,
    /// External charge token; the purchase token.
    pub charge_token: String,
    pub state: RecurringChargeState,
    pub charge_at: Timestamp,
    pub retries_left: u32,
    pub payment_id: Option<PaymentId>,
    pub previous_id: Option<RecurringChargeId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl RecurringCharge {
    fn entry(
        charge_token: impl Into<String>,
        state: RecurringChargeState,
        charge_at: Timestamp,
        retries_left: u32,
        payment_id: Option<PaymentId>,
        previous_id: Option<RecurringChargeId>,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id: RecurringChargeId::new(),
            charge_token: charge_token.into(),
            state,
            charge_at,
            retries_left,
            payment_id,
            previous_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record of a charge that already happened.
    pub fn charged(
        charge_token: impl Into<String>,
        payment_id: PaymentId,
        charged_at: Timestamp,
        previous_id: Option<RecurringChargeId>,
    ) -> Self {
        Self::entry(
            charge_token,
            RecurringChargeState::Charged,
            charged_at,
            0,
            Some(payment_id),
            previous_id,
        )
    }

    /// Next scheduled charge, carrying the payment it renews.
    pub fn scheduled(
        charge_token: impl Into<String>,
        payment_id: PaymentId,
        charge_at: Timestamp,
        retries_left: u32,
        previous_id: Option<RecurringChargeId>,
    ) -> Self {
        Self::entry(
            charge_token,
            RecurringChargeState::Active,
            charge_at,
            retries_left,
            Some(payment_id),
            previous_id,
        )
    }

    pub fn is_active(&self) -> bool {
        self.state == RecurringChargeState::Active
    }

    pub fn transition(&mut self, target: RecurringChargeState) -> Result<(), ValidationError> {
        self.state = self.state.transition_to(target)?;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Marks the scheduled entry as fulfilled by `payment_id`.
    pub fn complete_with(&mut self, payment_id: PaymentId) -> Result<(), ValidationError> {
        self.transition(RecurringChargeState::Charged)?;
        self.payment_id = Some(payment_id);
        Ok(())
    }
}
