//! External collaborator ports.
//!
//! The engine owns balance arithmetic only. Moving real money and
//! knowing who a user is belong to the platform; both arrive here as
//! injected trait objects.

use async_trait::async_trait;

use kora_types::Currency;

/// Opaque failure from the payment provider. The engine surfaces it as
/// `GatewayUnavailable` and leaves ledger state untouched.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct GatewayError(pub String);

/// Reference handed back by the provider when a checkout is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutRef {
    pub reference: String,
}

/// Provider-side state of an initiated payout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayoutOutcome {
    Completed,
    Pending,
    Failed,
}

/// Payment provider port.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a checkout/payout with the provider and return its
    /// reference.
    async fn initiate_checkout(
        &self,
        amount: u64,
        currency: Currency,
        metadata: &serde_json::Value,
    ) -> Result<CheckoutRef, GatewayError>;

    /// Ask the provider for the state of a reference. Used by webhook
    /// handling before funds are settled.
    async fn verify(&self, reference: &str) -> Result<PayoutOutcome, GatewayError>;
}

/// Identity/profile directory port. Lookups are infallible; an unknown
/// user reads as unverified with zero followers.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn is_verified(&self, user_id: &str) -> bool;

    async fn follower_count(&self, user_id: &str) -> u64;
}
