//! The platform reserve account.

use serde::{Deserialize, Serialize};

/// Singleton platform account accumulating the non-creator share of boost
/// purchases and admin adjustments. Same arithmetic shape as a user
/// account, minus identity; reserve credits are always instant, so
/// `on_hold_balance` stays zero in practice but the invariant is kept for
/// uniformity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveAccount {
    pub total_balance: u64,
    pub available_balance: u64,
    pub on_hold_balance: u64,
}

impl ReserveAccount {
    pub fn balanced(&self) -> bool {
        self.total_balance == self.available_balance + self.on_hold_balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_balanced() {
        assert!(ReserveAccount::default().balanced());
    }
}
