//! Agent registry
//!
//! Binds agent addresses to model families and tracks verification status.
//! Registration is gated on the payment collaborator's authorization signal;
//! verification is one-way and only reachable through the model's DAO.

use crate::clock::GovernanceClock;
use crate::error::{GovernanceError, Result};
use crate::payment::PaymentAuthorizer;
use crate::types::{normalize_address, Address, ModelType};
use log::{debug, info};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One registration of an address for a model family
#[derive(Debug, Clone, Serialize)]
pub struct AgentRecord {
    pub address: Address,
    pub model: ModelType,
    pub verified: bool,
    pub registered_at: u64,
}

/// Registry of agents across all model DAOs
pub struct AgentRegistry {
    clock: Arc<dyn GovernanceClock>,
    payment: Arc<dyn PaymentAuthorizer>,
    agents: RwLock<HashMap<(Address, ModelType), AgentRecord>>,
}

impl AgentRegistry {
    pub fn new(clock: Arc<dyn GovernanceClock>, payment: Arc<dyn PaymentAuthorizer>) -> Self {
        Self {
            clock,
            payment,
            agents: RwLock::new(HashMap::new()),
        }
    }

    /// Register `address` as an agent of `model`
    ///
    /// The payment authorization is a single precondition check: if it fails,
    /// no record is created. An address may hold one registration per model.
    pub async fn register_agent(
        &self,
        address: &str,
        model: ModelType,
        payment_id: &str,
    ) -> Result<AgentRecord> {
        let address = normalize_address(address)?;
        let key = (address.clone(), model);

        // The write guard is held across the authorization call so the
        // duplicate check and the insert observe the same state.
        let mut agents = self.agents.write().await;
        if agents.contains_key(&key) {
            return Err(GovernanceError::DuplicateRegistration { address, model });
        }

        self.payment.authorize_registration(&address, payment_id).await?;

        let record = AgentRecord {
            address: address.clone(),
            model,
            verified: false,
            registered_at: self.clock.now(),
        };
        agents.insert(key, record.clone());
        info!("Agent {} registered for {}", address, model);
        Ok(record)
    }

    /// Mark a registered agent as verified; idempotent.
    ///
    /// Crate-private: the only caller is `ModelDAO::verify_agent`, which
    /// supplies its own model, so a DAO can never verify another model's
    /// agents.
    pub(crate) async fn verify(&self, address: &str, model: ModelType) -> Result<AgentRecord> {
        let address = normalize_address(address)?;
        let mut agents = self.agents.write().await;
        let record = agents
            .get_mut(&(address.clone(), model))
            .ok_or(GovernanceError::AgentNotFound { address, model })?;

        if !record.verified {
            record.verified = true;
            info!("Agent {} verified for {}", record.address, model);
        } else {
            debug!("Agent {} already verified for {}", record.address, model);
        }
        Ok(record.clone())
    }

    /// True iff the agent is registered for `model` and verified
    pub async fn is_eligible(&self, address: &str, model: ModelType) -> bool {
        let Ok(address) = normalize_address(address) else {
            return false;
        };
        self.agents
            .read()
            .await
            .get(&(address, model))
            .map(|record| record.verified)
            .unwrap_or(false)
    }

    pub async fn agent_info(&self, address: &str, model: ModelType) -> Option<AgentRecord> {
        let address = normalize_address(address).ok()?;
        self.agents.read().await.get(&(address, model)).cloned()
    }

    pub async fn agents_of_model(&self, model: ModelType) -> Vec<AgentRecord> {
        let mut records: Vec<AgentRecord> = self
            .agents
            .read()
            .await
            .values()
            .filter(|record| record.model == model)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.registered_at.cmp(&b.registered_at));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::FeeSchedule;
    use crate::payment::X402Gateway;

    const AGENT: &str = "0x1a2b3c4d5e6f7890abcdef1234567890abcdef12";

    fn registry() -> AgentRegistry {
        let clock = Arc::new(ManualClock::new(500));
        let payment = Arc::new(X402Gateway::new(FeeSchedule::default(), clock.clone()));
        AgentRegistry::new(clock, payment)
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let registry = registry();
        registry
            .register_agent(AGENT, ModelType::Claude, "pay-1")
            .await
            .unwrap();

        let err = registry
            .register_agent(AGENT, ModelType::Claude, "pay-2")
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::DuplicateRegistration { .. }));

        // Same address, different model is a separate registration
        registry
            .register_agent(AGENT, ModelType::Gpt, "pay-3")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_payment_leaves_no_record() {
        let registry = registry();
        registry
            .register_agent(AGENT, ModelType::Claude, "pay-1")
            .await
            .unwrap();

        // Replayed payment id fails authorization for a different agent
        let other = "0x2222222222222222222222222222222222222222";
        let err = registry
            .register_agent(other, ModelType::Claude, "pay-1")
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::PaymentAuthorizationFailed(_)));
        assert!(registry.agent_info(other, ModelType::Claude).await.is_none());
    }

    #[tokio::test]
    async fn test_verify_is_idempotent_and_one_way() {
        let registry = registry();
        registry
            .register_agent(AGENT, ModelType::Claude, "pay-1")
            .await
            .unwrap();
        assert!(!registry.is_eligible(AGENT, ModelType::Claude).await);

        let first = registry.verify(AGENT, ModelType::Claude).await.unwrap();
        assert!(first.verified);
        let second = registry.verify(AGENT, ModelType::Claude).await.unwrap();
        assert!(second.verified);
        assert!(registry.is_eligible(AGENT, ModelType::Claude).await);

        // Verification for one model does not leak into another
        assert!(!registry.is_eligible(AGENT, ModelType::Gpt).await);
    }

    #[tokio::test]
    async fn test_verify_unregistered_fails() {
        let registry = registry();
        let err = registry.verify(AGENT, ModelType::Claude).await.unwrap_err();
        assert!(matches!(err, GovernanceError::AgentNotFound { .. }));
    }
}
