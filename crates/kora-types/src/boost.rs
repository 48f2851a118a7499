//! Boost purchase records.

use serde::{Deserialize, Serialize};

use crate::{BoostId, PostId, UserId};

/// A paid, time-limited promotion of a post. Written once at purchase;
/// read-only afterward. Expiry is a read-side check, never a mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boost {
    pub boost_id: BoostId,
    pub post_id: PostId,
    pub booster_user_id: UserId,
    pub creator_user_id: UserId,
    /// Cost in SA paid by the booster.
    pub cost: u64,
    pub created_at: u64,
    pub expires_at: u64,
}

impl Boost {
    pub fn is_active(&self, now: u64) -> bool {
        now <= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_window() {
        let boost = Boost {
            boost_id: "b1".to_string(),
            post_id: "p1".to_string(),
            booster_user_id: "u1".to_string(),
            creator_user_id: "u2".to_string(),
            cost: 100,
            created_at: 1000,
            expires_at: 1000 + 86_400,
        };
        assert!(boost.is_active(1000));
        assert!(boost.is_active(1000 + 86_400));
        assert!(!boost.is_active(1001 + 86_400));
    }
}
