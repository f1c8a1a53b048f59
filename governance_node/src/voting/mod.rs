//! Vote records, tallies, and outcome resolution

use crate::clock::GovernanceClock;
use crate::error::{GovernanceError, Result};
use crate::ledger::TokenLedger;
use crate::proposals::{ProposalState, ProposalStore};
use crate::registry::AgentRegistry;
use crate::types::{normalize_address, Address, ModelType, Support};
use log::info;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A cast vote; one per (proposal, voter), never overwritten
#[derive(Debug, Clone, Serialize)]
pub struct VoteRecord {
    pub proposal_id: u64,
    pub voter: Address,
    pub support: Support,
    pub weight: u128,
    pub cast_at: u64,
}

/// Outcome rule applied when a proposal's voting window closes.
///
/// All-integer arithmetic: the quorum is compared against the full tallied
/// weight, and a strict majority of non-abstaining weight is required, so a
/// tie defeats the proposal.
pub fn resolve_outcome(
    votes_for: u128,
    votes_against: u128,
    votes_abstain: u128,
    quorum: u128,
) -> ProposalState {
    let total = votes_for + votes_against + votes_abstain;
    if total >= quorum && votes_for > votes_against {
        ProposalState::Succeeded
    } else {
        ProposalState::Defeated
    }
}

/// Vote recording and aggregation for one model DAO
pub struct VotingEngine {
    model: ModelType,
    store: Arc<ProposalStore>,
    registry: Arc<AgentRegistry>,
    ledger: Arc<TokenLedger>,
    clock: Arc<dyn GovernanceClock>,
    votes: RwLock<HashMap<(u64, Address), VoteRecord>>,
}

impl VotingEngine {
    pub fn new(
        model: ModelType,
        store: Arc<ProposalStore>,
        registry: Arc<AgentRegistry>,
        ledger: Arc<TokenLedger>,
        clock: Arc<dyn GovernanceClock>,
    ) -> Self {
        Self {
            model,
            store,
            registry,
            ledger,
            clock,
            votes: RwLock::new(HashMap::new()),
        }
    }

    /// Cast a vote on an active proposal.
    ///
    /// Weight comes from the voter's checkpoint at the proposal snapshot,
    /// never the current balance. A zero-weight vote is recorded (the voter's
    /// intent is on the record) but contributes nothing to the tallies.
    pub async fn cast_vote(
        &self,
        voter: &str,
        proposal_id: u64,
        support: Support,
    ) -> Result<VoteRecord> {
        let voter = normalize_address(voter)?;

        let snapshot_time = self.store.active_snapshot(proposal_id).await?;

        if !self.registry.is_eligible(&voter, self.model).await {
            return Err(GovernanceError::Unauthorized(format!(
                "{} is not a verified {} agent",
                voter, self.model
            )));
        }

        let weight = self.ledger.voting_power_at(&voter, snapshot_time).await;

        let mut votes = self.votes.write().await;
        let key = (proposal_id, voter.clone());
        if votes.contains_key(&key) {
            return Err(GovernanceError::AlreadyVoted {
                proposal_id,
                voter,
            });
        }

        // The tally update re-checks the voting window under the store's own
        // guard; only after it lands does the vote record exist.
        self.store.apply_vote(proposal_id, support, weight).await?;

        let record = VoteRecord {
            proposal_id,
            voter: voter.clone(),
            support,
            weight,
            cast_at: self.clock.now(),
        };
        votes.insert(key, record.clone());
        info!(
            "Vote on {}: {} voted {} with weight {}",
            proposal_id, voter, support, weight
        );
        Ok(record)
    }

    pub async fn has_voted(&self, voter: &str, proposal_id: u64) -> bool {
        let Ok(voter) = normalize_address(voter) else {
            return false;
        };
        self.votes.read().await.contains_key(&(proposal_id, voter))
    }

    pub async fn votes_of(&self, proposal_id: u64) -> Vec<VoteRecord> {
        let mut records: Vec<VoteRecord> = self
            .votes
            .read()
            .await
            .values()
            .filter(|record| record.proposal_id == proposal_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.cast_at.cmp(&b.cast_at));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{FeeSchedule, GovernanceParams};
    use crate::payment::X402Gateway;
    use crate::proposals::ProposalFilter;
    use std::sync::atomic::AtomicU64;

    const PROPOSER: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const VOTER: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    const OUTSIDER: &str = "0xdddddddddddddddddddddddddddddddddddddddd";

    struct Harness {
        clock: Arc<ManualClock>,
        ledger: Arc<TokenLedger>,
        registry: Arc<AgentRegistry>,
        store: Arc<ProposalStore>,
        engine: VotingEngine,
    }

    async fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(1_000));
        let params = GovernanceParams {
            voting_delay: 100,
            voting_period: 1_000,
            proposal_threshold: 100_000,
            quorum_bps: 400,
            timelock_delay: 50,
            grace_period: 5_000,
            claim_amount: 250_000,
            max_supply: 1_000_000,
        };
        let payment = Arc::new(X402Gateway::new(FeeSchedule::default(), clock.clone()));
        let registry = Arc::new(AgentRegistry::new(clock.clone(), payment));
        let ledger = Arc::new(TokenLedger::new(
            ModelType::Claude,
            params.max_supply,
            clock.clone(),
        ));
        let store = Arc::new(ProposalStore::new(
            ModelType::Claude,
            ledger.clone(),
            registry.clone(),
            clock.clone(),
            Arc::new(RwLock::new(params)),
            Arc::new(AtomicU64::new(1)),
        ));
        let engine = VotingEngine::new(
            ModelType::Claude,
            store.clone(),
            registry.clone(),
            ledger.clone(),
            clock.clone(),
        );

        for (agent, payment_id) in [(PROPOSER, "pay-a"), (VOTER, "pay-b")] {
            registry
                .register_agent(agent, ModelType::Claude, payment_id)
                .await
                .unwrap();
            registry.verify(agent, ModelType::Claude).await.unwrap();
        }
        ledger.mint(PROPOSER, 150_000).await.unwrap();
        ledger.mint(VOTER, 50_000).await.unwrap();

        Harness {
            clock,
            ledger,
            registry,
            store,
            engine,
        }
    }

    #[tokio::test]
    async fn test_outcome_rule() {
        // Quorum 4% of a 1,000,000 supply is 40,000
        let quorum = 40_000;

        // Clears quorum with a for-majority
        assert_eq!(
            resolve_outcome(245_000, 18_000, 12_000, quorum),
            ProposalState::Succeeded
        );
        // Against-majority loses regardless of quorum
        assert_eq!(
            resolve_outcome(45_000, 320_000, 60_000, quorum),
            ProposalState::Defeated
        );
        // Quorum missed
        assert_eq!(
            resolve_outcome(30_000, 1_000, 2_000, quorum),
            ProposalState::Defeated
        );
        // Ties defeat
        assert_eq!(
            resolve_outcome(20_000, 20_000, 50_000, quorum),
            ProposalState::Defeated
        );
        // Abstain weight counts toward quorum but not the majority
        assert_eq!(
            resolve_outcome(5_000, 4_000, 40_000, quorum),
            ProposalState::Succeeded
        );
    }

    #[tokio::test]
    async fn test_vote_requires_active_window() {
        let h = harness().await;
        let p = h
            .store
            .propose(PROPOSER, "t", "d", Vec::new())
            .await
            .unwrap();

        let err = h
            .engine
            .cast_vote(VOTER, p.id, Support::For)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::VotingClosed(_)));

        h.clock.set(2_200);
        let err = h
            .engine
            .cast_vote(VOTER, p.id, Support::For)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::VotingClosed(_)));
    }

    #[tokio::test]
    async fn test_vote_requires_eligibility() {
        let h = harness().await;
        let p = h
            .store
            .propose(PROPOSER, "t", "d", Vec::new())
            .await
            .unwrap();
        h.clock.set(1_100);

        let err = h
            .engine
            .cast_vote(OUTSIDER, p.id, Support::For)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_double_vote_rejected_and_tally_unchanged() {
        let h = harness().await;
        let p = h
            .store
            .propose(PROPOSER, "t", "d", Vec::new())
            .await
            .unwrap();
        h.clock.set(1_100);

        h.engine.cast_vote(VOTER, p.id, Support::For).await.unwrap();
        let before = h.store.get(p.id).await.unwrap();
        assert_eq!(before.votes_for, 50_000);

        let err = h
            .engine
            .cast_vote(VOTER, p.id, Support::Against)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::AlreadyVoted { .. }));

        let after = h.store.get(p.id).await.unwrap();
        assert_eq!(after.votes_for, 50_000);
        assert_eq!(after.votes_against, 0);
        assert!(h.engine.has_voted(VOTER, p.id).await);
    }

    #[tokio::test]
    async fn test_weight_fixed_at_snapshot() {
        let h = harness().await;
        let p = h
            .store
            .propose(PROPOSER, "t", "d", Vec::new())
            .await
            .unwrap();

        // Tokens acquired after the snapshot add nothing
        h.clock.set(1_050);
        h.ledger.mint(VOTER, 500_000).await.unwrap();

        h.clock.set(1_100);
        let record = h.engine.cast_vote(VOTER, p.id, Support::For).await.unwrap();
        assert_eq!(record.weight, 50_000);
        assert_eq!(h.store.get(p.id).await.unwrap().votes_for, 50_000);
    }

    #[tokio::test]
    async fn test_zero_weight_vote_recorded() {
        let h = harness().await;
        let fresh = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";
        h.registry
            .register_agent(fresh, ModelType::Claude, "pay-fresh")
            .await
            .unwrap();
        h.registry.verify(fresh, ModelType::Claude).await.unwrap();

        let p = h
            .store
            .propose(PROPOSER, "t", "d", Vec::new())
            .await
            .unwrap();
        h.clock.set(1_100);

        let record = h.engine.cast_vote(fresh, p.id, Support::For).await.unwrap();
        assert_eq!(record.weight, 0);
        assert_eq!(h.store.get(p.id).await.unwrap().votes_for, 0);
        assert!(h.engine.has_voted(fresh, p.id).await);
        assert_eq!(h.engine.votes_of(p.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_full_vote_to_resolution() {
        let h = harness().await;
        let p = h
            .store
            .propose(PROPOSER, "t", "d", Vec::new())
            .await
            .unwrap();
        h.clock.set(1_100);

        h.engine
            .cast_vote(PROPOSER, p.id, Support::For)
            .await
            .unwrap();
        h.engine
            .cast_vote(VOTER, p.id, Support::Against)
            .await
            .unwrap();

        h.clock.set(2_100);
        // Supply 200k, quorum 8k; 150k for vs 50k against
        let resolved = h.store.get(p.id).await.unwrap();
        assert_eq!(resolved.state, ProposalState::Succeeded);
        assert_eq!(h.store.list(ProposalFilter::Succeeded).await.len(), 1);
    }
}
