//! Withdrawal requests and their state machine.

use serde::{Deserialize, Serialize};

use crate::{Currency, UserId, WithdrawalId};

/// Withdrawal lifecycle: `pending -> approved -> settled`, or
/// `pending -> rejected`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Settled,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Settled => "settled",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Result<Self, crate::ParseEnumError> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "settled" => Ok(Self::Settled),
            "rejected" => Ok(Self::Rejected),
            other => Err(crate::ParseEnumError {
                what: "withdrawal status",
                value: other.to_string(),
            }),
        }
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition(&self, next: WithdrawalStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved)
                | (Self::Pending, Self::Rejected)
                | (Self::Approved, Self::Settled)
        )
    }
}

/// A user's payout request. Created by the user; mutated only by an admin
/// decision or the settlement callback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub withdrawal_id: WithdrawalId,
    pub user_id: UserId,
    /// Amount in SA, held back from available while the request is open.
    pub amount: u64,
    pub currency: Currency,
    /// Payout method, e.g. "bank_transfer".
    pub method: String,
    pub status: WithdrawalStatus,
    pub created_at: u64,
    pub decided_at: Option<u64>,
    pub decision_reason: Option<String>,
    /// Gateway checkout reference once a payout has been initiated.
    pub gateway_reference: Option<String>,
}

impl Withdrawal {
    /// Whether the held amount is still reserved (not yet returned or
    /// paid out).
    pub fn holds_funds(&self) -> bool {
        matches!(
            self.status,
            WithdrawalStatus::Pending | WithdrawalStatus::Approved
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            WithdrawalStatus::Pending,
            WithdrawalStatus::Approved,
            WithdrawalStatus::Settled,
            WithdrawalStatus::Rejected,
        ] {
            assert_eq!(
                WithdrawalStatus::parse(status.as_str()).expect("parse"),
                status
            );
        }
        assert!(WithdrawalStatus::parse("cancelled").is_err());
    }

    #[test]
    fn test_legal_transitions() {
        use WithdrawalStatus::*;
        assert!(Pending.can_transition(Approved));
        assert!(Pending.can_transition(Rejected));
        assert!(Approved.can_transition(Settled));

        assert!(!Pending.can_transition(Settled));
        assert!(!Approved.can_transition(Rejected));
        assert!(!Settled.can_transition(Approved));
        assert!(!Rejected.can_transition(Pending));
    }

    #[test]
    fn test_holds_funds() {
        let mut w = Withdrawal {
            withdrawal_id: "w1".to_string(),
            user_id: "u1".to_string(),
            amount: 500,
            currency: Currency::Usd,
            method: "bank_transfer".to_string(),
            status: WithdrawalStatus::Pending,
            created_at: 100,
            decided_at: None,
            decision_reason: None,
            gateway_reference: None,
        };
        assert!(w.holds_funds());
        w.status = WithdrawalStatus::Approved;
        assert!(w.holds_funds());
        w.status = WithdrawalStatus::Settled;
        assert!(!w.holds_funds());
        w.status = WithdrawalStatus::Rejected;
        assert!(!w.holds_funds());
    }
}
