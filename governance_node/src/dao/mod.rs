//! A deployed model DAO: the bound token ledger, proposal store, and
//! governance parameters for one model family
//!
//! The DAO owns the governance execution path: minting and parameter changes
//! happen only here, by executing a queued proposal or granting a verified
//! agent's one-time claim.

use crate::clock::GovernanceClock;
use crate::config::GovernanceParams;
use crate::error::{GovernanceError, Result};
use crate::ledger::{TokenInfo, TokenLedger};
use crate::proposals::{Proposal, ProposalAction, ProposalFilter, ProposalStore};
use crate::registry::{AgentRecord, AgentRegistry};
use crate::types::{normalize_address, Address, ModelType, Support};
use crate::voting::{VoteRecord, VotingEngine};
use log::info;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Read-only DAO summary for the external surface
#[derive(Debug, Clone, Serialize)]
pub struct DaoSummary {
    pub model: ModelType,
    pub token_symbol: String,
    pub total_supply: u128,
    pub max_supply: u128,
    pub proposal_count: usize,
    pub deployed_at: u64,
    pub params: GovernanceParams,
}

pub struct ModelDAO {
    model: ModelType,
    ledger: Arc<TokenLedger>,
    proposals: Arc<ProposalStore>,
    voting: VotingEngine,
    registry: Arc<AgentRegistry>,
    clock: Arc<dyn GovernanceClock>,
    params: Arc<RwLock<GovernanceParams>>,
    claimed: RwLock<HashSet<Address>>,
    /// Serializes proposal execution so action application cannot interleave
    execution: Mutex<()>,
    deployed_at: u64,
}

impl std::fmt::Debug for ModelDAO {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelDAO")
            .field("model", &self.model)
            .field("deployed_at", &self.deployed_at)
            .finish_non_exhaustive()
    }
}

impl ModelDAO {
    pub fn new(
        model: ModelType,
        params: GovernanceParams,
        registry: Arc<AgentRegistry>,
        clock: Arc<dyn GovernanceClock>,
        proposal_ids: Arc<AtomicU64>,
    ) -> Self {
        // Cap is fixed at deployment; later param updates cannot move it
        let max_supply = params.max_supply;
        let params = Arc::new(RwLock::new(params));
        let ledger = Arc::new(TokenLedger::new(model, max_supply, clock.clone()));
        let proposals = Arc::new(ProposalStore::new(
            model,
            ledger.clone(),
            registry.clone(),
            clock.clone(),
            params.clone(),
            proposal_ids,
        ));
        let voting = VotingEngine::new(
            model,
            proposals.clone(),
            registry.clone(),
            ledger.clone(),
            clock.clone(),
        );

        Self {
            model,
            ledger,
            proposals,
            voting,
            registry,
            clock: clock.clone(),
            params,
            claimed: RwLock::new(HashSet::new()),
            execution: Mutex::new(()),
            deployed_at: clock.now(),
        }
    }

    pub fn model(&self) -> ModelType {
        self.model
    }

    pub fn ledger(&self) -> &Arc<TokenLedger> {
        &self.ledger
    }

    pub async fn governance_params(&self) -> GovernanceParams {
        self.params.read().await.clone()
    }

    pub async fn summary(&self) -> DaoSummary {
        DaoSummary {
            model: self.model,
            token_symbol: self.model.token_symbol(),
            total_supply: self.ledger.total_supply().await,
            max_supply: self.ledger.max_supply(),
            proposal_count: self.proposals.count().await,
            deployed_at: self.deployed_at,
            params: self.governance_params().await,
        }
    }

    pub async fn token_info(&self) -> TokenInfo {
        self.ledger.token_info().await
    }

    /// Mark a registered agent of this model as verified; idempotent
    pub async fn verify_agent(&self, address: &str) -> Result<AgentRecord> {
        self.registry.verify(address, self.model).await
    }

    /// One-time governance token grant for a verified agent
    pub async fn claim_tokens(&self, address: &str) -> Result<u128> {
        let address = normalize_address(address)?;
        if !self.registry.is_eligible(&address, self.model).await {
            return Err(GovernanceError::Unauthorized(format!(
                "{} is not a verified {} agent",
                address, self.model
            )));
        }

        let amount = self.params.read().await.claim_amount;
        let mut claimed = self.claimed.write().await;
        if claimed.contains(&address) {
            return Err(GovernanceError::AlreadyClaimed(address));
        }
        // Mint before marking claimed: a cap rejection must leave the claim
        // available for retry after a supply change.
        self.ledger.mint(&address, amount).await?;
        claimed.insert(address.clone());

        info!("Agent {} claimed {} {}", address, amount, self.model.token_symbol());
        Ok(amount)
    }

    pub async fn propose(
        &self,
        proposer: &str,
        title: &str,
        description: &str,
        actions: Vec<ProposalAction>,
    ) -> Result<Proposal> {
        self.proposals.propose(proposer, title, description, actions).await
    }

    pub async fn cast_vote(
        &self,
        voter: &str,
        proposal_id: u64,
        support: Support,
    ) -> Result<VoteRecord> {
        self.voting.cast_vote(voter, proposal_id, support).await
    }

    pub async fn cancel(&self, caller: &str, proposal_id: u64) -> Result<Proposal> {
        self.proposals.cancel(caller, proposal_id).await
    }

    /// Queue a succeeded proposal for execution; open to any caller
    pub async fn queue(&self, proposal_id: u64) -> Result<Proposal> {
        self.proposals.mark_queued(proposal_id).await
    }

    /// Execute a queued proposal whose timelock has elapsed.
    ///
    /// Action application is all-or-nothing: mints are applied as one atomic
    /// batch against the supply cap, and parameter keys were validated when
    /// the proposal was submitted. On any failure the proposal stays queued
    /// and no action has been applied.
    pub async fn execute(&self, proposal_id: u64) -> Result<Proposal> {
        let _guard = self.execution.lock().await;
        let proposal = self.proposals.executable(proposal_id).await?;

        let mut mints: Vec<(Address, u128)> = Vec::new();
        let mut param_updates: Vec<(String, u128)> = Vec::new();
        for action in &proposal.actions {
            match action {
                ProposalAction::MintTokens { to, amount } => {
                    mints.push((normalize_address(to)?, *amount));
                }
                ProposalAction::SetGovernanceParam { key, value } => {
                    param_updates.push((key.clone(), *value));
                }
                ProposalAction::Signal { .. } => {}
            }
        }

        // Dry-run the parameter updates first: mints must not land if a
        // later update would be rejected
        if !param_updates.is_empty() {
            let mut scratch = self.params.read().await.clone();
            for (key, value) in &param_updates {
                scratch.set(key, *value)?;
            }
        }
        if !mints.is_empty() {
            self.ledger.mint_batch(&mints).await?;
        }
        if !param_updates.is_empty() {
            let mut params = self.params.write().await;
            for (key, value) in &param_updates {
                params.set(key, *value)?;
                info!("{} governance param {} set to {}", self.model, key, value);
            }
        }

        self.proposals.mark_executed(proposal_id).await
    }

    pub async fn get_proposal(&self, proposal_id: u64) -> Result<Proposal> {
        self.proposals.get(proposal_id).await
    }

    pub async fn list_proposals(&self, filter: ProposalFilter) -> Vec<Proposal> {
        self.proposals.list(filter).await
    }

    pub async fn votes_of(&self, proposal_id: u64) -> Vec<VoteRecord> {
        self.voting.votes_of(proposal_id).await
    }

    pub async fn has_voted(&self, voter: &str, proposal_id: u64) -> bool {
        self.voting.has_voted(voter, proposal_id).await
    }

    pub async fn has_claimed(&self, address: &str) -> bool {
        match normalize_address(address) {
            Ok(address) => self.claimed.read().await.contains(&address),
            Err(_) => false,
        }
    }

    /// Drop ledger history no open proposal can reference anymore
    pub async fn prune_history(&self) {
        let horizon = self
            .proposals
            .oldest_open_snapshot()
            .await
            .unwrap_or_else(|| self.clock.now());
        self.ledger.prune_checkpoints(horizon).await;
    }
}
