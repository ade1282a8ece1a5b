//! Subscription notification types pushed by the billing provider.
//!
//! The integer codes are part of the provider's contract and must not change.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle event kind carried by a developer notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Recovered,
    Renewed,
    Canceled,
    Purchased,
    OnHold,
    InGracePeriod,
    Restarted,
    PriceChangeConfirmed,
    Deferred,
    Paused,
    PauseScheduleChanged,
    Revoked,
    Expired,
}

/// The code is not part of the contract known to this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Unknown notification type: {0}")]
pub struct UnknownNotificationType(pub i32);

impl NotificationType {
    pub const ALL: [NotificationType; 13] = [
        NotificationType::Recovered,
        NotificationType::Renewed,
        NotificationType::Canceled,
        NotificationType::Purchased,
        NotificationType::OnHold,
        NotificationType::InGracePeriod,
        NotificationType::Restarted,
        NotificationType::PriceChangeConfirmed,
        NotificationType::Deferred,
        NotificationType::Paused,
        NotificationType::PauseScheduleChanged,
        NotificationType::Revoked,
        NotificationType::Expired,
    ];

    /// Maps a provider code to a notification type.
    pub fn from_code(code: i32) -> Result<Self, UnknownNotificationType> {
        use NotificationType::*;
        Ok(match code {
            1 => Recovered,
            2 => Renewed,
            3 => Canceled,
            4 => Purchased,
            5 => OnHold,
            6 => InGracePeriod,
            7 => Restarted,
            8 => PriceChangeConfirmed,
            9 => Deferred,
            10 => Paused,
            11 => PauseScheduleChanged,
            12 => Revoked,
            13 => Expired,
            other => return Err(UnknownNotificationType(other)),
        })
    }

    /// Returns the provider code.
    pub fn code(&self) -> i32 {
        use NotificationType::*;
        match self {
            Recovered => 1,
            Renewed => 2,
            Canceled => 3,
            Purchased => 4,
            OnHold => 5,
            InGracePeriod => 6,
            Restarted => 7,
            PriceChangeConfirmed => 8,
            Deferred => 9,
            Paused => 10,
            PauseScheduleChanged => 11,
            Revoked => 12,
            Expired => 13,
        }
    }

    /// Types that result in a confirmed payment.
    pub fn creates_payment(&self) -> bool {
        matches!(
            self,
            NotificationType::Purchased | NotificationType::Renewed | NotificationType::Recovered
        )
    }

    /// Types that end a subscription.
    pub fn ends_subscription(&self) -> bool {
        matches!(
            self,
            NotificationType::Expired | NotificationType::Canceled | NotificationType::Revoked
        )
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl TryFrom<i32> for NotificationType {
    type Error = UnknownNotificationType;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}
