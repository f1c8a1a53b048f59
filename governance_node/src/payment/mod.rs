//! Payment collaborator seam
//!
//! Registration and DAO deployment are gated on an authorization signal from
//! the payment collaborator. The signal is a boolean precondition keyed by a
//! unique payment id: it either fully authorizes the call or fails with no
//! side effect on engine state. Replays of a spent payment id are rejected
//! here, before the engine mutates anything.

use crate::clock::GovernanceClock;
use crate::config::FeeSchedule;
use crate::error::{GovernanceError, Result};
use crate::types::Address;
use async_trait::async_trait;
use log::{debug, info};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Seconds a subscription purchase stays active
const SUBSCRIPTION_TERM: u64 = 30 * 86_400;

/// Authorization interface the engine calls out to
#[async_trait]
pub trait PaymentAuthorizer: Send + Sync {
    /// Authorize one agent registration; consumes `payment_id`
    async fn authorize_registration(&self, payer: &Address, payment_id: &str) -> Result<()>;

    /// Authorize one DAO deployment; consumes `payment_id`
    async fn authorize_deployment(&self, payer: &Address, payment_id: &str) -> Result<()>;
}

/// Subscription status exposed to readers
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionStatus {
    pub payer: Address,
    pub active: bool,
    pub expires_at: Option<u64>,
}

#[derive(Debug, Default)]
struct GatewayState {
    used_payment_ids: HashSet<String>,
    subscriptions: HashMap<Address, u64>,
    total_collected: u128,
}

/// In-process x402-style payment gateway
///
/// Tracks monthly subscriptions with expiry timestamps and single-use payment
/// ids for metered calls. Settlement is assumed to have happened upstream;
/// this gateway only accounts for it and enforces replay protection.
pub struct X402Gateway {
    fees: FeeSchedule,
    clock: Arc<dyn GovernanceClock>,
    state: RwLock<GatewayState>,
}

impl X402Gateway {
    pub fn new(fees: FeeSchedule, clock: Arc<dyn GovernanceClock>) -> Self {
        Self {
            fees,
            clock,
            state: RwLock::new(GatewayState::default()),
        }
    }

    /// Buy or extend a monthly subscription
    pub async fn purchase_subscription(&self, payer: &Address, amount_paid: u128) -> Result<u64> {
        if amount_paid < self.fees.subscription_price {
            return Err(GovernanceError::PaymentAuthorizationFailed(format!(
                "subscription requires {}, paid {}",
                self.fees.subscription_price, amount_paid
            )));
        }

        let now = self.clock.now();
        let mut state = self.state.write().await;
        let base = state
            .subscriptions
            .get(payer)
            .copied()
            .filter(|expiry| *expiry > now)
            .unwrap_or(now);
        let expires_at = base + SUBSCRIPTION_TERM;
        state.subscriptions.insert(payer.clone(), expires_at);
        state.total_collected = state.total_collected.saturating_add(amount_paid);

        info!("Subscription for {} active until {}", payer, expires_at);
        Ok(expires_at)
    }

    /// Pay for a single metered call; `payment_id` is single-use
    pub async fn pay_for_call(
        &self,
        payer: &Address,
        payment_id: &str,
        amount_paid: u128,
    ) -> Result<()> {
        if amount_paid < self.fees.per_call_price {
            return Err(GovernanceError::PaymentAuthorizationFailed(format!(
                "call requires {}, paid {}",
                self.fees.per_call_price, amount_paid
            )));
        }

        let mut state = self.state.write().await;
        self.consume_payment_id(&mut state, payment_id)?;
        state.total_collected = state.total_collected.saturating_add(amount_paid);
        debug!("Metered call paid by {} ({})", payer, payment_id);
        Ok(())
    }

    pub async fn subscription_status(&self, payer: &Address) -> SubscriptionStatus {
        let now = self.clock.now();
        let state = self.state.read().await;
        let expires_at = state.subscriptions.get(payer).copied();
        SubscriptionStatus {
            payer: payer.clone(),
            active: expires_at.map(|e| e > now).unwrap_or(false),
            expires_at,
        }
    }

    pub async fn total_collected(&self) -> u128 {
        self.state.read().await.total_collected
    }

    fn consume_payment_id(&self, state: &mut GatewayState, payment_id: &str) -> Result<()> {
        if payment_id.is_empty() {
            return Err(GovernanceError::PaymentAuthorizationFailed(
                "empty payment id".to_string(),
            ));
        }
        if !state.used_payment_ids.insert(payment_id.to_string()) {
            return Err(GovernanceError::PaymentAuthorizationFailed(format!(
                "payment id {} already spent",
                payment_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentAuthorizer for X402Gateway {
    async fn authorize_registration(&self, payer: &Address, payment_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        self.consume_payment_id(&mut state, payment_id)?;
        state.total_collected = state.total_collected.saturating_add(self.fees.registration_fee);
        debug!("Registration fee collected from {} ({})", payer, payment_id);
        Ok(())
    }

    async fn authorize_deployment(&self, payer: &Address, payment_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        self.consume_payment_id(&mut state, payment_id)?;
        state.total_collected = state.total_collected.saturating_add(self.fees.deployment_fee);
        debug!("Deployment fee collected from {} ({})", payer, payment_id);
        Ok(())
    }
}
