//! Per-model governance token ledger
//!
//! Tracks balances, vote delegation, and an append-only voting-power history
//! per holder. Vote weight for a proposal is always resolved against the
//! checkpoint at the proposal snapshot, so acquiring tokens after the
//! snapshot cannot change the weight of a vote on it.
//!
//! Delegation is a direct power transfer applied when `delegate` is called:
//! the holder's full balance-derived power moves from the previous delegate
//! to the new one and both sides get a checkpoint. Reads never walk a
//! delegation chain.

use crate::clock::GovernanceClock;
use crate::error::{GovernanceError, Result};
use crate::types::{Address, ModelType};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A recorded (timestamp, value) pair in a power or supply history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub timestamp: u64,
    pub value: u128,
}

/// Read-only token summary for the external surface
#[derive(Debug, Clone, Serialize)]
pub struct TokenInfo {
    pub model: ModelType,
    pub symbol: String,
    pub name: String,
    pub total_supply: u128,
    pub max_supply: u128,
    pub holders: usize,
}

#[derive(Debug, Default)]
struct LedgerState {
    total_supply: u128,
    balances: HashMap<Address, u128>,
    /// Only non-self delegations are stored; absence means self-delegation
    delegations: HashMap<Address, Address>,
    voting_power: HashMap<Address, u128>,
    checkpoints: HashMap<Address, Vec<Checkpoint>>,
    supply_checkpoints: Vec<Checkpoint>,
    /// Sticky fault flag; once set, every mutation fails
    poisoned: bool,
}

impl LedgerState {
    fn holder_of(&self, address: &str) -> Address {
        self.delegations
            .get(address)
            .cloned()
            .unwrap_or_else(|| address.to_string())
    }

    fn push_checkpoint(&mut self, holder: &str, value: u128, now: u64) {
        let history = self.checkpoints.entry(holder.to_string()).or_default();
        // History must stay sorted by timestamp
        let at = history.last().map(|c| c.timestamp.max(now)).unwrap_or(now);
        match history.last_mut() {
            Some(last) if last.timestamp == at => last.value = value,
            _ => history.push(Checkpoint {
                timestamp: at,
                value,
            }),
        }
    }

    fn push_supply_checkpoint(&mut self, now: u64) {
        let value = self.total_supply;
        let at = self
            .supply_checkpoints
            .last()
            .map(|c| c.timestamp.max(now))
            .unwrap_or(now);
        match self.supply_checkpoints.last_mut() {
            Some(last) if last.timestamp == at => last.value = value,
            _ => self.supply_checkpoints.push(Checkpoint {
                timestamp: at,
                value,
            }),
        }
    }

    /// Move `amount` of voting power between holders, checkpointing both.
    /// `None` on either side models supply entering or leaving circulation.
    fn move_power(
        &mut self,
        from: Option<&str>,
        to: Option<&str>,
        amount: u128,
        now: u64,
    ) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        if let (Some(a), Some(b)) = (from, to) {
            if a == b {
                return Ok(());
            }
        }

        if let Some(holder) = from {
            let current = self.voting_power.get(holder).copied().unwrap_or(0);
            let updated = current.checked_sub(amount).ok_or_else(|| {
                self.poisoned = true;
                GovernanceError::IntegrityFault(format!(
                    "voting power underflow for {}: {} - {}",
                    holder, current, amount
                ))
            })?;
            self.voting_power.insert(holder.to_string(), updated);
            self.push_checkpoint(holder, updated, now);
        }

        if let Some(holder) = to {
            let updated = self.voting_power.get(holder).copied().unwrap_or(0) + amount;
            self.voting_power.insert(holder.to_string(), updated);
            self.push_checkpoint(holder, updated, now);
        }

        Ok(())
    }

    fn guard(&self) -> Result<()> {
        if self.poisoned {
            return Err(GovernanceError::IntegrityFault(
                "ledger halted after integrity fault".to_string(),
            ));
        }
        Ok(())
    }
}

/// Authoritative token state for one model DAO
pub struct TokenLedger {
    model: ModelType,
    max_supply: u128,
    clock: Arc<dyn GovernanceClock>,
    state: RwLock<LedgerState>,
}

impl TokenLedger {
    pub fn new(model: ModelType, max_supply: u128, clock: Arc<dyn GovernanceClock>) -> Self {
        Self {
            model,
            max_supply,
            clock,
            state: RwLock::new(LedgerState::default()),
        }
    }

    pub fn model(&self) -> ModelType {
        self.model
    }

    pub fn symbol(&self) -> String {
        self.model.token_symbol()
    }

    pub fn max_supply(&self) -> u128 {
        self.max_supply
    }

    /// Mint new tokens to `to`
    ///
    /// Only reachable through the DAO governance-execution path; there is no
    /// public minting surface.
    pub(crate) async fn mint(&self, to: &str, amount: u128) -> Result<()> {
        self.mint_batch(&[(to.to_string(), amount)]).await
    }

    /// Mint several grants as one atomic operation: either every grant fits
    /// under the supply cap and all are applied, or none are.
    pub(crate) async fn mint_batch(&self, grants: &[(Address, u128)]) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        state.guard()?;

        // Saturating sums: a request large enough to overflow certainly
        // exceeds the cap
        let requested = grants
            .iter()
            .fold(0u128, |acc, (_, amount)| acc.saturating_add(*amount));
        if state.total_supply.saturating_add(requested) > self.max_supply {
            return Err(GovernanceError::SupplyCapExceeded {
                amount: requested,
                total_supply: state.total_supply,
                max_supply: self.max_supply,
            });
        }

        for (to, amount) in grants {
            *state.balances.entry(to.clone()).or_insert(0) += amount;
            state.total_supply += amount;
            let holder = state.holder_of(to);
            state.move_power(None, Some(&holder), *amount, now)?;
            info!("Minted {} {} to {}", amount, self.symbol(), to);
        }
        state.push_supply_checkpoint(now);
        Ok(())
    }

    /// Burn tokens from the caller's own balance
    pub async fn burn(&self, owner: &str, amount: u128) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        state.guard()?;

        let balance = state.balances.get(owner).copied().unwrap_or(0);
        if balance < amount {
            return Err(GovernanceError::InsufficientBalance {
                required: amount,
                available: balance,
            });
        }

        state.balances.insert(owner.to_string(), balance - amount);
        state.total_supply -= amount;
        let holder = state.holder_of(owner);
        state.move_power(Some(&holder), None, amount, now)?;
        state.push_supply_checkpoint(now);

        info!("Burned {} {} from {}", amount, self.symbol(), owner);
        Ok(())
    }

    /// Move tokens between accounts, checkpointing both sides' power holders
    pub async fn transfer(&self, from: &str, to: &str, amount: u128) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        state.guard()?;

        let sender_balance = state.balances.get(from).copied().unwrap_or(0);
        if sender_balance < amount {
            return Err(GovernanceError::InsufficientBalance {
                required: amount,
                available: sender_balance,
            });
        }

        state.balances.insert(from.to_string(), sender_balance - amount);
        *state.balances.entry(to.to_string()).or_insert(0) += amount;

        let from_holder = state.holder_of(from);
        let to_holder = state.holder_of(to);
        state.move_power(Some(&from_holder), Some(&to_holder), amount, now)?;

        debug!("Transferred {} {} from {} to {}", amount, self.symbol(), from, to);
        Ok(())
    }

    /// Redirect the caller's voting power to `delegatee`
    pub async fn delegate(&self, who: &str, delegatee: &str) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        state.guard()?;

        let old_holder = state.holder_of(who);
        if old_holder == delegatee {
            return Ok(());
        }

        let moved = state.balances.get(who).copied().unwrap_or(0);
        if delegatee == who {
            state.delegations.remove(who);
        } else {
            state
                .delegations
                .insert(who.to_string(), delegatee.to_string());
        }
        state.move_power(Some(&old_holder), Some(delegatee), moved, now)?;

        info!(
            "{} delegated {} {} of voting power: {} -> {}",
            who,
            moved,
            self.symbol(),
            old_holder,
            delegatee
        );
        Ok(())
    }

    /// Voting power of `address` as of `timestamp`: the latest checkpoint at
    /// or before that time, or zero if the history starts later
    pub async fn voting_power_at(&self, address: &str, timestamp: u64) -> u128 {
        let state = self.state.read().await;
        match state.checkpoints.get(address) {
            Some(history) => lookup(history, timestamp),
            None => 0,
        }
    }

    /// Total supply as of `timestamp`, the quorum denominator for snapshots
    pub async fn total_supply_at(&self, timestamp: u64) -> u128 {
        let state = self.state.read().await;
        lookup(&state.supply_checkpoints, timestamp)
    }

    pub async fn balance_of(&self, address: &str) -> u128 {
        self.state.read().await.balances.get(address).copied().unwrap_or(0)
    }

    pub async fn total_supply(&self) -> u128 {
        self.state.read().await.total_supply
    }

    /// Current delegate of `address` (itself when no delegation is set)
    pub async fn delegate_of(&self, address: &str) -> Address {
        self.state.read().await.holder_of(address)
    }

    pub async fn current_voting_power(&self, address: &str) -> u128 {
        self.state
            .read()
            .await
            .voting_power
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    pub async fn token_info(&self) -> TokenInfo {
        let state = self.state.read().await;
        TokenInfo {
            model: self.model,
            symbol: self.model.token_symbol(),
            name: self.model.token_name(),
            total_supply: state.total_supply,
            max_supply: self.max_supply,
            holders: state.balances.values().filter(|b| **b > 0).count(),
        }
    }

    /// Recompute conservation sums and halt the ledger if they disagree.
    ///
    /// A mismatch here means sequencing was violated somewhere; no further
    /// mutation is allowed once it happens.
    pub async fn verify_integrity(&self) -> Result<()> {
        let mut state = self.state.write().await;

        let balance_sum: u128 = state.balances.values().sum();
        let power_sum: u128 = state.voting_power.values().sum();

        if balance_sum != state.total_supply || power_sum != state.total_supply {
            state.poisoned = true;
            error!(
                "{} ledger integrity fault: balances={} power={} supply={}",
                self.symbol(),
                balance_sum,
                power_sum,
                state.total_supply
            );
            return Err(GovernanceError::IntegrityFault(format!(
                "sum(balances)={} sum(power)={} total_supply={}",
                balance_sum, power_sum, state.total_supply
            )));
        }
        if state.total_supply > self.max_supply {
            state.poisoned = true;
            return Err(GovernanceError::IntegrityFault(format!(
                "total_supply {} above cap {}",
                state.total_supply, self.max_supply
            )));
        }
        Ok(())
    }

    /// Drop history strictly older than the latest checkpoint at or before
    /// `horizon`. Lookups at or after `horizon` are unaffected; callers pass
    /// the oldest snapshot still referenced by an open proposal.
    pub async fn prune_checkpoints(&self, horizon: u64) {
        let mut state = self.state.write().await;
        for history in state.checkpoints.values_mut() {
            prune(history, horizon);
        }
        prune(&mut state.supply_checkpoints, horizon);
        debug!("{} checkpoint histories pruned to {}", self.symbol(), horizon);
    }

    #[cfg(test)]
    pub(crate) async fn tamper_balance_for_tests(&self, address: &str, balance: u128) {
        self.state
            .write()
            .await
            .balances
            .insert(address.to_string(), balance);
    }
}

fn lookup(history: &[Checkpoint], timestamp: u64) -> u128 {
    let idx = history.partition_point(|c| c.timestamp <= timestamp);
    if idx == 0 {
        0
    } else {
        history[idx - 1].value
    }
}

fn prune(history: &mut Vec<Checkpoint>, horizon: u64) {
    let idx = history.partition_point(|c| c.timestamp <= horizon);
    if idx > 1 {
        history.drain(..idx - 1);
    }
}
