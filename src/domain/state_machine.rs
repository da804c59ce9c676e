use crate::domain::payment::{Charge, ChargeStatus, PaymentIntentStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentEvent {
    ConfirmStarted,
    Authorized,
    AuthorizationFailed,
    Captured,
    Voided,
}

impl PaymentIntentEvent {
    pub const ALL: [PaymentIntentEvent; 5] = [
        PaymentIntentEvent::ConfirmStarted,
        PaymentIntentEvent::Authorized,
        PaymentIntentEvent::AuthorizationFailed,
        PaymentIntentEvent::Captured,
        PaymentIntentEvent::Voided,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentIntentEvent::ConfirmStarted => "confirm_started",
            PaymentIntentEvent::Authorized => "authorized",
            PaymentIntentEvent::AuthorizationFailed => "authorization_failed",
            PaymentIntentEvent::Captured => "captured",
            PaymentIntentEvent::Voided => "voided",
        }
    }
}

impl std::fmt::Display for PaymentIntentEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("invalid payment intent transition: {current} -> {event}")]
    InvalidTransition {
        current: PaymentIntentStatus,
        event: PaymentIntentEvent,
    },
    #[error("capture amount must be greater than zero")]
    NonPositiveCapture,
    #[error("capture amount {requested} exceeds remaining authorized amount {remaining}")]
    ExceedsRemaining { requested: i64, remaining: i64 },
    #[error("charge cannot be captured in status {0}")]
    NotCapturable(ChargeStatus),
    #[error("charge cannot be voided in status {0}")]
    NotVoidable(ChargeStatus),
}

pub fn transition_payment_intent(
    current: PaymentIntentStatus,
    event: PaymentIntentEvent,
) -> Result<PaymentIntentStatus, TransitionError> {
    use PaymentIntentEvent as E;
    use PaymentIntentStatus as S;

    match (current, event) {
        (S::RequiresConfirmation, E::ConfirmStarted) => Ok(S::Processing),
        (S::Processing, E::Authorized) => Ok(S::RequiresCapture),
        (S::Processing, E::AuthorizationFailed) => Ok(S::Failed),
        (S::RequiresCapture, E::Captured) => Ok(S::Succeeded),
        (S::RequiresCapture, E::Voided) => Ok(S::Canceled),
        _ => Err(TransitionError::InvalidTransition { current, event }),
    }
}

pub fn charge_status_after_capture(charge: &Charge, capture_amount: i64) -> ChargeStatus {
    if charge.captured_amount + capture_amount < charge.authorized_amount {
        ChargeStatus::PartiallyCaptured
    } else {
        ChargeStatus::Captured
    }
}

/// Checks run in a fixed order: amount sign, remaining authorization, then
/// charge status.
pub fn decide_capture(charge: &Charge, capture_amount: i64) -> Result<ChargeStatus, TransitionError> {
    if capture_amount <= 0 {
        return Err(TransitionError::NonPositiveCapture);
    }

    let remaining = charge.remaining_capturable();
    if capture_amount > remaining {
        return Err(TransitionError::ExceedsRemaining {
            requested: capture_amount,
            remaining,
        });
    }

    if !charge.status.is_open() {
        return Err(TransitionError::NotCapturable(charge.status));
    }

    Ok(charge_status_after_capture(charge, capture_amount))
}

pub fn decide_void(charge: &Charge) -> Result<(), TransitionError> {
    if !charge.status.is_open() {
        return Err(TransitionError::NotVoidable(charge.status));
    }
    Ok(())
}
