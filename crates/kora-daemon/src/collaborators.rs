//! Collaborator implementations injected into the engine.
//!
//! The real platform supplies a hosted payment provider and a profile
//! service; this daemon ships a simulated gateway (references are minted
//! locally and every payout verifies as completed) and an identity
//! directory backed by the `[identity]` config section.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use kora_ledger::traits::{CheckoutRef, GatewayError};
use kora_ledger::{IdentityDirectory, PaymentGateway, PayoutOutcome};
use kora_types::Currency;

use crate::config::IdentityConfig;

/// Payment gateway simulator.
///
/// Checkout references follow the provider convention: `WD-` for
/// withdrawal payouts, `SUB-` for subscription purchases, each with a
/// random hex suffix. Issued references are remembered so `verify`
/// rejects unknown ones.
pub struct SimulatedGateway {
    issued: Mutex<HashSet<String>>,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self {
            issued: Mutex::new(HashSet::new()),
        }
    }

    fn mint_reference(metadata: &serde_json::Value) -> String {
        use rand::RngCore;
        let prefix = if metadata.get("withdrawal_id").is_some() {
            "WD"
        } else {
            "SUB"
        };
        let mut bytes = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut bytes);
        format!("{prefix}-{}", hex::encode(bytes))
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn initiate_checkout(
        &self,
        amount: u64,
        currency: Currency,
        metadata: &serde_json::Value,
    ) -> Result<CheckoutRef, GatewayError> {
        let reference = Self::mint_reference(metadata);
        self.issued.lock().await.insert(reference.clone());
        tracing::debug!(
            amount,
            currency = currency.as_str(),
            %reference,
            "simulated checkout created"
        );
        Ok(CheckoutRef { reference })
    }

    async fn verify(&self, reference: &str) -> Result<PayoutOutcome, GatewayError> {
        if self.issued.lock().await.contains(reference) {
            Ok(PayoutOutcome::Completed)
        } else {
            Err(GatewayError(format!("unknown reference {reference}")))
        }
    }
}

/// Identity directory read from the daemon config.
pub struct ConfigIdentity {
    verified: HashSet<String>,
    followers: HashMap<String, u64>,
}

impl ConfigIdentity {
    pub fn new(config: &IdentityConfig) -> Self {
        Self {
            verified: config.verified.iter().cloned().collect(),
            followers: config.followers.clone(),
        }
    }
}

#[async_trait]
impl IdentityDirectory for ConfigIdentity {
    async fn is_verified(&self, user_id: &str) -> bool {
        self.verified.contains(user_id)
    }

    async fn follower_count(&self, user_id: &str) -> u64 {
        self.followers.get(user_id).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_gateway_reference_prefixes() {
        let gateway = SimulatedGateway::new();
        let wd = gateway
            .initiate_checkout(
                500,
                Currency::Usd,
                &serde_json::json!({"withdrawal_id": "wd-1"}),
            )
            .await
            .expect("checkout");
        assert!(wd.reference.starts_with("WD-"));

        let sub = gateway
            .initiate_checkout(500, Currency::Usd, &serde_json::json!({"user_id": "u1"}))
            .await
            .expect("checkout");
        assert!(sub.reference.starts_with("SUB-"));
    }

    #[tokio::test]
    async fn test_gateway_verifies_only_issued() {
        let gateway = SimulatedGateway::new();
        let checkout = gateway
            .initiate_checkout(
                500,
                Currency::Usd,
                &serde_json::json!({"withdrawal_id": "wd-1"}),
            )
            .await
            .expect("checkout");

        assert_eq!(
            gateway.verify(&checkout.reference).await.expect("verify"),
            PayoutOutcome::Completed
        );
        assert!(gateway.verify("WD-forged").await.is_err());
    }

    #[tokio::test]
    async fn test_config_identity_lookup() {
        let mut config = IdentityConfig::default();
        config.verified.push("u-verified".to_string());
        config.followers.insert("u-verified".to_string(), 4_000);
        let identity = ConfigIdentity::new(&config);

        assert!(identity.is_verified("u-verified").await);
        assert!(!identity.is_verified("u-unknown").await);
        assert_eq!(identity.follower_count("u-verified").await, 4_000);
        assert_eq!(identity.follower_count("u-unknown").await, 0);
    }
}
