//! Proposal records and lifecycle state machine
//!
//! Phase advancement is pull-based: every read or mutation first reconciles
//! the stored state against the governance clock, so a proposal is always
//! observed in the phase its timestamps imply. No timers run anywhere.

use crate::clock::GovernanceClock;
use crate::config::GovernanceParams;
use crate::error::{GovernanceError, Result};
use crate::ledger::TokenLedger;
use crate::registry::AgentRegistry;
use crate::types::{normalize_address, Address, ModelType, Support};
use crate::voting::resolve_outcome;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Lifecycle states; `Executed`, `Defeated`, `Expired` and `Canceled` are
/// terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalState {
    Pending,
    Active,
    Succeeded,
    Defeated,
    Queued,
    Executed,
    Expired,
    Canceled,
}

impl ProposalState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalState::Executed
                | ProposalState::Defeated
                | ProposalState::Expired
                | ProposalState::Canceled
        )
    }
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProposalState::Pending => "pending",
            ProposalState::Active => "active",
            ProposalState::Succeeded => "succeeded",
            ProposalState::Defeated => "defeated",
            ProposalState::Queued => "queued",
            ProposalState::Executed => "executed",
            ProposalState::Expired => "expired",
            ProposalState::Canceled => "canceled",
        };
        write!(f, "{}", s)
    }
}

/// Governance actions carried by a proposal, applied on execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProposalAction {
    MintTokens { to: Address, amount: u128 },
    SetGovernanceParam { key: String, value: u128 },
    Signal { text: String },
}

/// A governance proposal for one model DAO
#[derive(Debug, Clone, Serialize)]
pub struct Proposal {
    pub id: u64,
    pub model: ModelType,
    pub proposer: Address,
    pub title: String,
    pub description: String,
    pub actions: Vec<ProposalAction>,
    pub snapshot_time: u64,
    pub voting_start: u64,
    pub voting_end: u64,
    pub state: ProposalState,
    pub votes_for: u128,
    pub votes_against: u128,
    pub votes_abstain: u128,
    pub executed: bool,
    pub queued_at: Option<u64>,
}

/// Listing filter for the read surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProposalFilter {
    #[default]
    All,
    Pending,
    Active,
    Succeeded,
    Defeated,
}

impl ProposalFilter {
    fn matches(&self, state: ProposalState) -> bool {
        match self {
            ProposalFilter::All => true,
            ProposalFilter::Pending => state == ProposalState::Pending,
            ProposalFilter::Active => state == ProposalState::Active,
            // The succeeded family includes proposals that went on to queue
            // or execute
            ProposalFilter::Succeeded => matches!(
                state,
                ProposalState::Succeeded | ProposalState::Queued | ProposalState::Executed
            ),
            ProposalFilter::Defeated => state == ProposalState::Defeated,
        }
    }
}

impl FromStr for ProposalFilter {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(ProposalFilter::All),
            "pending" => Ok(ProposalFilter::Pending),
            "active" => Ok(ProposalFilter::Active),
            "succeeded" => Ok(ProposalFilter::Succeeded),
            "defeated" => Ok(ProposalFilter::Defeated),
            other => Err(GovernanceError::Internal(anyhow::anyhow!(
                "unknown proposal filter: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    proposals: BTreeMap<u64, Proposal>,
}

/// Proposal storage and state machine for one model DAO
pub struct ProposalStore {
    model: ModelType,
    ledger: Arc<TokenLedger>,
    registry: Arc<AgentRegistry>,
    clock: Arc<dyn GovernanceClock>,
    params: Arc<RwLock<GovernanceParams>>,
    next_id: Arc<AtomicU64>,
    state: RwLock<StoreState>,
}

impl ProposalStore {
    pub fn new(
        model: ModelType,
        ledger: Arc<TokenLedger>,
        registry: Arc<AgentRegistry>,
        clock: Arc<dyn GovernanceClock>,
        params: Arc<RwLock<GovernanceParams>>,
        next_id: Arc<AtomicU64>,
    ) -> Self {
        Self {
            model,
            ledger,
            registry,
            clock,
            params,
            next_id,
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Submit a new proposal
    ///
    /// The proposer must be a verified agent of this model and hold at least
    /// `proposal_threshold` voting power right now; the current time becomes
    /// the vote-weight snapshot for the proposal's whole life.
    pub async fn propose(
        &self,
        proposer: &str,
        title: &str,
        description: &str,
        actions: Vec<ProposalAction>,
    ) -> Result<Proposal> {
        let proposer = normalize_address(proposer)?;

        if !self.registry.is_eligible(&proposer, self.model).await {
            return Err(GovernanceError::Unauthorized(format!(
                "{} is not a verified {} agent",
                proposer, self.model
            )));
        }

        let now = self.clock.now();
        let (threshold, voting_delay, voting_period) = {
            let params = self.params.read().await;
            (
                params.proposal_threshold,
                params.voting_delay,
                params.voting_period,
            )
        };

        let power = self.ledger.voting_power_at(&proposer, now).await;
        if power < threshold {
            return Err(GovernanceError::ThresholdNotMet { power, threshold });
        }

        validate_actions(&actions)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let voting_start = now.saturating_add(voting_delay);
        let proposal = Proposal {
            id,
            model: self.model,
            proposer: proposer.clone(),
            title: title.to_string(),
            description: description.to_string(),
            actions,
            snapshot_time: now,
            voting_start,
            voting_end: voting_start.saturating_add(voting_period),
            state: ProposalState::Pending,
            votes_for: 0,
            votes_against: 0,
            votes_abstain: 0,
            executed: false,
            queued_at: None,
        };

        let mut state = self.state.write().await;
        state.proposals.insert(id, proposal.clone());
        info!(
            "Proposal {} created for {} by {} (voting {}..{})",
            id, self.model, proposer, proposal.voting_start, proposal.voting_end
        );
        Ok(proposal)
    }

    /// Fetch one proposal, reconciled against the clock
    pub async fn get(&self, id: u64) -> Result<Proposal> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let proposal = state
            .proposals
            .get_mut(&id)
            .ok_or(GovernanceError::ProposalNotFound(id))?;
        self.reconcile(proposal, now).await;
        Ok(proposal.clone())
    }

    /// List proposals matching `filter`, reconciled against the clock
    pub async fn list(&self, filter: ProposalFilter) -> Vec<Proposal> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let mut out = Vec::new();
        for proposal in state.proposals.values_mut() {
            self.reconcile(proposal, now).await;
            if filter.matches(proposal.state) {
                out.push(proposal.clone());
            }
        }
        out
    }

    pub async fn count(&self) -> usize {
        self.state.read().await.proposals.len()
    }

    /// Earliest snapshot still referenced by a non-terminal proposal; the
    /// safe horizon for checkpoint pruning
    pub async fn oldest_open_snapshot(&self) -> Option<u64> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let mut oldest = None;
        for proposal in state.proposals.values_mut() {
            self.reconcile(proposal, now).await;
            if !proposal.state.is_terminal() {
                oldest = Some(oldest.map_or(proposal.snapshot_time, |o: u64| {
                    o.min(proposal.snapshot_time)
                }));
            }
        }
        oldest
    }

    /// Snapshot time of a proposal that is currently open for voting
    pub(crate) async fn active_snapshot(&self, id: u64) -> Result<u64> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let proposal = state
            .proposals
            .get_mut(&id)
            .ok_or(GovernanceError::ProposalNotFound(id))?;
        self.reconcile(proposal, now).await;
        if proposal.state != ProposalState::Active {
            return Err(GovernanceError::VotingClosed(format!(
                "proposal {} is {}",
                id, proposal.state
            )));
        }
        Ok(proposal.snapshot_time)
    }

    /// Add a vote's weight to the proposal tally.
    ///
    /// Re-checks the Active state under the same guard that mutates the
    /// tally, so a vote can never land on a proposal that left its voting
    /// window between eligibility checks.
    pub(crate) async fn apply_vote(&self, id: u64, support: Support, weight: u128) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let proposal = state
            .proposals
            .get_mut(&id)
            .ok_or(GovernanceError::ProposalNotFound(id))?;
        self.reconcile(proposal, now).await;
        if proposal.state != ProposalState::Active {
            return Err(GovernanceError::VotingClosed(format!(
                "proposal {} is {}",
                id, proposal.state
            )));
        }

        match support {
            Support::For => proposal.votes_for += weight,
            Support::Against => proposal.votes_against += weight,
            Support::Abstain => proposal.votes_abstain += weight,
        }
        Ok(())
    }

    /// Cancel a proposal; proposer-only, and only before meaningful voting
    /// activity (any non-abstain weight) has accumulated
    pub async fn cancel(&self, caller: &str, id: u64) -> Result<Proposal> {
        let caller = normalize_address(caller)?;
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let proposal = state
            .proposals
            .get_mut(&id)
            .ok_or(GovernanceError::ProposalNotFound(id))?;
        self.reconcile(proposal, now).await;

        if proposal.proposer != caller {
            return Err(GovernanceError::Unauthorized(format!(
                "{} is not the proposer of {}",
                caller, id
            )));
        }
        if !matches!(
            proposal.state,
            ProposalState::Pending | ProposalState::Active
        ) {
            return Err(GovernanceError::InvalidProposalState {
                state: proposal.state,
                action: "cancel",
            });
        }
        if proposal.votes_for + proposal.votes_against > 0 {
            return Err(GovernanceError::VotingClosed(format!(
                "proposal {} already has votes cast",
                id
            )));
        }

        proposal.state = ProposalState::Canceled;
        info!("Proposal {} canceled by proposer", id);
        Ok(proposal.clone())
    }

    /// Move a succeeded proposal into the execution queue
    pub(crate) async fn mark_queued(&self, id: u64) -> Result<Proposal> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let proposal = state
            .proposals
            .get_mut(&id)
            .ok_or(GovernanceError::ProposalNotFound(id))?;
        self.reconcile(proposal, now).await;

        if proposal.state != ProposalState::Succeeded {
            return Err(GovernanceError::InvalidProposalState {
                state: proposal.state,
                action: "queue",
            });
        }
        proposal.state = ProposalState::Queued;
        proposal.queued_at = Some(now);
        info!("Proposal {} queued at {}", id, now);
        Ok(proposal.clone())
    }

    /// Clone a queued proposal whose timelock has elapsed, for execution
    pub(crate) async fn executable(&self, id: u64) -> Result<Proposal> {
        let now = self.clock.now();
        let timelock_delay = self.params.read().await.timelock_delay;
        let mut state = self.state.write().await;
        let proposal = state
            .proposals
            .get_mut(&id)
            .ok_or(GovernanceError::ProposalNotFound(id))?;
        self.reconcile(proposal, now).await;

        if proposal.state != ProposalState::Queued {
            return Err(GovernanceError::InvalidProposalState {
                state: proposal.state,
                action: "execute",
            });
        }
        let ready_at = proposal
            .queued_at
            .unwrap_or(proposal.voting_end)
            .saturating_add(timelock_delay);
        if now < ready_at {
            return Err(GovernanceError::TimelockActive { ready_at, now });
        }
        Ok(proposal.clone())
    }

    /// Finalize a queued proposal whose actions have been applied
    pub(crate) async fn mark_executed(&self, id: u64) -> Result<Proposal> {
        let mut state = self.state.write().await;
        let proposal = state
            .proposals
            .get_mut(&id)
            .ok_or(GovernanceError::ProposalNotFound(id))?;
        // No reconcile here: the executor checked the phase and applied the
        // actions; flipping to Executed must not race the grace window.
        if proposal.state != ProposalState::Queued {
            return Err(GovernanceError::InvalidProposalState {
                state: proposal.state,
                action: "finalize",
            });
        }
        proposal.state = ProposalState::Executed;
        proposal.executed = true;
        info!("Proposal {} executed", id);
        Ok(proposal.clone())
    }

    /// Advance `proposal` to the phase its timestamps imply at `now`
    async fn reconcile(&self, proposal: &mut Proposal, now: u64) {
        if proposal.state == ProposalState::Pending && now >= proposal.voting_start {
            proposal.state = ProposalState::Active;
            debug!("Proposal {} entered voting", proposal.id);
        }

        if proposal.state == ProposalState::Active && now >= proposal.voting_end {
            let quorum_bps = self.params.read().await.quorum_bps;
            let supply = self.ledger.total_supply_at(proposal.snapshot_time).await;
            let quorum = supply * quorum_bps as u128 / 10_000;
            proposal.state = resolve_outcome(
                proposal.votes_for,
                proposal.votes_against,
                proposal.votes_abstain,
                quorum,
            );
            info!(
                "Proposal {} resolved {} (for={} against={} abstain={} quorum={})",
                proposal.id,
                proposal.state,
                proposal.votes_for,
                proposal.votes_against,
                proposal.votes_abstain,
                quorum
            );
        }

        if matches!(
            proposal.state,
            ProposalState::Succeeded | ProposalState::Queued
        ) && !proposal.executed
        {
            let grace_period = self.params.read().await.grace_period;
            if now > proposal.voting_end.saturating_add(grace_period) {
                proposal.state = ProposalState::Expired;
                info!("Proposal {} expired unexecuted", proposal.id);
            }
        }
    }
}

fn validate_actions(actions: &[ProposalAction]) -> Result<()> {
    // Rejecting bad actions here keeps execution all-or-nothing later
    let mut scratch = GovernanceParams::default();
    for action in actions {
        match action {
            ProposalAction::MintTokens { to, .. } => {
                normalize_address(to)?;
            }
            ProposalAction::SetGovernanceParam { key, value } => {
                scratch.set(key, *value)?;
            }
            ProposalAction::Signal { .. } => {}
        }
    }
    Ok(())
}
