//! End-to-end governance flows assembled from the public engine surface

use anyhow::Result;
use cortex_governance::clock::ManualClock;
use cortex_governance::config::{FeeSchedule, GovernanceParams};
use cortex_governance::error::GovernanceError;
use cortex_governance::factory::DAOFactory;
use cortex_governance::payment::X402Gateway;
use cortex_governance::proposals::{ProposalAction, ProposalFilter, ProposalState};
use cortex_governance::registry::AgentRegistry;
use cortex_governance::types::{ModelType, Support};
use cortex_governance::ModelDAO;
use std::sync::Arc;

const DEPLOYER: &str = "0x9988776655443322110011223344556677889900";

const AGENT_A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const AGENT_B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
const AGENT_C: &str = "0xcccccccccccccccccccccccccccccccccccccccc";
const AGENT_D: &str = "0xdddddddddddddddddddddddddddddddddddddddd";

struct Env {
    clock: Arc<ManualClock>,
    registry: Arc<AgentRegistry>,
    factory: Arc<DAOFactory>,
}

fn env() -> Env {
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let gateway = Arc::new(X402Gateway::new(FeeSchedule::default(), clock.clone()));
    let registry = Arc::new(AgentRegistry::new(clock.clone(), gateway.clone()));
    let factory = Arc::new(DAOFactory::new(
        registry.clone(),
        gateway,
        clock.clone(),
        GovernanceParams::default(),
    ));
    Env {
        clock,
        registry,
        factory,
    }
}

/// Register, verify and claim the default grant for one agent
async fn onboard(env: &Env, dao: &ModelDAO, agent: &str) -> Result<()> {
    let payment_id = format!("pay:{}:{}", dao.model(), agent);
    env.registry
        .register_agent(agent, dao.model(), &payment_id)
        .await?;
    dao.verify_agent(agent).await?;
    dao.claim_tokens(agent).await?;
    Ok(())
}

#[tokio::test]
async fn test_quorum_met_for_majority_succeeds() -> Result<()> {
    let env = env();
    let dao = env.factory.deploy_dao("claude", DEPLOYER, "deploy-1").await?;

    // Four grants of 250k put the supply at exactly 1,000,000; the 4%
    // quorum threshold is therefore 40,000.
    for agent in [AGENT_A, AGENT_B, AGENT_C, AGENT_D] {
        onboard(&env, &dao, agent).await?;
    }
    assert_eq!(dao.ledger().total_supply().await, 1_000_000);

    // Shape balances before the snapshot: 245k / 18k / 12k voters, the
    // remainder parked with a non-voter
    dao.ledger().transfer(AGENT_A, AGENT_D, 5_000).await?;
    dao.ledger().transfer(AGENT_B, AGENT_D, 232_000).await?;
    dao.ledger().transfer(AGENT_C, AGENT_D, 238_000).await?;

    let proposal = dao
        .propose(
            AGENT_A,
            "Establish safety review board",
            "Five elected agent representatives review proposals",
            Vec::new(),
        )
        .await?;
    assert_eq!(proposal.state, ProposalState::Pending);

    env.clock.set(proposal.voting_start);
    dao.cast_vote(AGENT_A, proposal.id, Support::For).await?;
    dao.cast_vote(AGENT_B, proposal.id, Support::Against).await?;
    dao.cast_vote(AGENT_C, proposal.id, Support::Abstain).await?;

    let tally = dao.get_proposal(proposal.id).await?;
    assert_eq!(tally.votes_for, 245_000);
    assert_eq!(tally.votes_against, 18_000);
    assert_eq!(tally.votes_abstain, 12_000);

    env.clock.set(proposal.voting_end);
    let resolved = dao.get_proposal(proposal.id).await?;
    assert_eq!(resolved.state, ProposalState::Succeeded);
    Ok(())
}

#[tokio::test]
async fn test_against_majority_defeats_regardless_of_quorum() -> Result<()> {
    let env = env();
    let dao = env.factory.deploy_dao("gpt", DEPLOYER, "deploy-1").await?;

    for agent in [AGENT_A, AGENT_B, AGENT_C, AGENT_D] {
        onboard(&env, &dao, agent).await?;
    }

    // 45k for / 320k against / 60k abstain at the snapshot
    dao.ledger().transfer(AGENT_A, AGENT_D, 205_000).await?;
    dao.ledger().transfer(AGENT_C, AGENT_B, 70_000).await?;
    dao.ledger().transfer(AGENT_C, AGENT_D, 120_000).await?;
    assert_eq!(dao.ledger().balance_of(AGENT_A).await, 45_000);
    assert_eq!(dao.ledger().balance_of(AGENT_B).await, 320_000);
    assert_eq!(dao.ledger().balance_of(AGENT_C).await, 60_000);

    let proposal = dao
        .propose(
            AGENT_B,
            "Treasury diversification",
            "Convert 30% of reserves into other governance tokens",
            Vec::new(),
        )
        .await?;

    env.clock.set(proposal.voting_start);
    dao.cast_vote(AGENT_A, proposal.id, Support::For).await?;
    dao.cast_vote(AGENT_B, proposal.id, Support::Against).await?;
    dao.cast_vote(AGENT_C, proposal.id, Support::Abstain).await?;

    env.clock.set(proposal.voting_end);
    let resolved = dao.get_proposal(proposal.id).await?;
    assert_eq!(resolved.state, ProposalState::Defeated);
    assert_eq!(
        env.factory
            .list_proposals(Some(ModelType::Gpt), ProposalFilter::Defeated)
            .await
            .len(),
        1
    );
    Ok(())
}

#[tokio::test]
async fn test_proposal_threshold_gate() -> Result<()> {
    let env = env();
    let dao = env.factory.deploy_dao("gemini", DEPLOYER, "deploy-1").await?;
    onboard(&env, &dao, AGENT_A).await?;
    onboard(&env, &dao, AGENT_B).await?;

    // 80,000 voting power sits below the 100,000 threshold
    dao.ledger().transfer(AGENT_A, AGENT_B, 170_000).await?;
    assert_eq!(dao.ledger().current_voting_power(AGENT_A).await, 80_000);

    let err = dao
        .propose(AGENT_A, "Lower the threshold", "", Vec::new())
        .await
        .unwrap_err();
    match err {
        GovernanceError::ThresholdNotMet { power, threshold } => {
            assert_eq!(power, 80_000);
            assert_eq!(threshold, 100_000);
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_mint_over_cap_rejected_via_governance() -> Result<()> {
    let env = env();
    let dao = env.factory.deploy_dao("grok", DEPLOYER, "deploy-1").await?;
    onboard(&env, &dao, AGENT_A).await?;
    let supply_before = dao.ledger().total_supply().await;

    let proposal = dao
        .propose(
            AGENT_A,
            "Mint beyond the cap",
            "",
            vec![ProposalAction::MintTokens {
                to: AGENT_B.to_string(),
                amount: 1_000_000_000,
            }],
        )
        .await?;

    env.clock.set(proposal.voting_start);
    dao.cast_vote(AGENT_A, proposal.id, Support::For).await?;
    env.clock.set(proposal.voting_end);
    dao.queue(proposal.id).await?;
    env.clock
        .set(proposal.voting_end + GovernanceParams::default().timelock_delay);

    let err = dao.execute(proposal.id).await.unwrap_err();
    assert!(matches!(err, GovernanceError::SupplyCapExceeded { .. }));
    assert_eq!(dao.ledger().total_supply().await, supply_before);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_deployment_rejected() -> Result<()> {
    let env = env();
    env.factory.deploy_dao("Claude", DEPLOYER, "deploy-1").await?;
    let before = env.factory.get_dao(ModelType::Claude).await.unwrap();

    let err = env
        .factory
        .deploy_dao("Claude", DEPLOYER, "deploy-2")
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::DuplicateDeployment(_)));

    let after = env.factory.get_dao(ModelType::Claude).await.unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    Ok(())
}

#[tokio::test]
async fn test_vote_weight_ignores_post_snapshot_transfers() -> Result<()> {
    let env = env();
    let dao = env.factory.deploy_dao("mistral", DEPLOYER, "deploy-1").await?;
    onboard(&env, &dao, AGENT_A).await?;
    onboard(&env, &dao, AGENT_B).await?;

    let proposal = dao
        .propose(AGENT_A, "Snapshot consistency", "", Vec::new())
        .await?;

    // Flash-loan style: B sends everything to A after the snapshot
    env.clock.advance(10);
    dao.ledger().transfer(AGENT_B, AGENT_A, 250_000).await?;
    assert_eq!(dao.ledger().current_voting_power(AGENT_A).await, 500_000);

    env.clock.set(proposal.voting_start);
    let record = dao.cast_vote(AGENT_A, proposal.id, Support::For).await?;
    assert_eq!(record.weight, 250_000);

    // B still votes with its snapshot weight despite the empty balance
    let record = dao.cast_vote(AGENT_B, proposal.id, Support::Against).await?;
    assert_eq!(record.weight, 250_000);
    Ok(())
}

#[tokio::test]
async fn test_delegation_concentrates_voting_power() -> Result<()> {
    let env = env();
    let dao = env.factory.deploy_dao("llama", DEPLOYER, "deploy-1").await?;
    onboard(&env, &dao, AGENT_A).await?;
    onboard(&env, &dao, AGENT_B).await?;

    // B hands its power to A before the snapshot
    dao.ledger().delegate(AGENT_B, AGENT_A).await?;

    let proposal = dao
        .propose(AGENT_A, "Delegated weight", "", Vec::new())
        .await?;
    env.clock.set(proposal.voting_start);

    let record = dao.cast_vote(AGENT_A, proposal.id, Support::For).await?;
    assert_eq!(record.weight, 500_000);

    // The delegator's own vote carries nothing
    let record = dao.cast_vote(AGENT_B, proposal.id, Support::Against).await?;
    assert_eq!(record.weight, 0);

    env.clock.set(proposal.voting_end);
    assert_eq!(
        dao.get_proposal(proposal.id).await?.state,
        ProposalState::Succeeded
    );
    Ok(())
}

#[tokio::test]
async fn test_verify_is_idempotent_through_the_dao() -> Result<()> {
    let env = env();
    let dao = env.factory.deploy_dao("qwen", DEPLOYER, "deploy-1").await?;
    env.registry
        .register_agent(AGENT_A, ModelType::Qwen, "pay-a")
        .await?;

    let first = dao.verify_agent(AGENT_A).await?;
    let second = dao.verify_agent(AGENT_A).await?;
    assert!(first.verified && second.verified);
    assert!(env.registry.is_eligible(AGENT_A, ModelType::Qwen).await);
    Ok(())
}

#[tokio::test]
async fn test_full_lifecycle_with_execution() -> Result<()> {
    let env = env();
    let dao = env.factory.deploy_dao("deepseek", DEPLOYER, "deploy-1").await?;
    onboard(&env, &dao, AGENT_A).await?;

    let params = GovernanceParams::default();
    let proposal = dao
        .propose(
            AGENT_A,
            "Fund interoperability research",
            "Grant 500k to the research collective",
            vec![ProposalAction::MintTokens {
                to: AGENT_C.to_string(),
                amount: 500_000,
            }],
        )
        .await?;

    env.clock.set(proposal.voting_start);
    dao.cast_vote(AGENT_A, proposal.id, Support::For).await?;

    env.clock.set(proposal.voting_end);
    dao.queue(proposal.id).await?;
    env.clock.advance(params.timelock_delay);

    let executed = dao.execute(proposal.id).await?;
    assert_eq!(executed.state, ProposalState::Executed);
    assert!(executed.executed);
    assert_eq!(dao.ledger().balance_of(AGENT_C).await, 500_000);

    // Ledger invariants hold after the whole flow
    dao.ledger().verify_integrity().await?;
    Ok(())
}

#[tokio::test]
async fn test_succeeded_proposal_expires_in_grace_window() -> Result<()> {
    let env = env();
    let dao = env.factory.deploy_dao("kimi", DEPLOYER, "deploy-1").await?;
    onboard(&env, &dao, AGENT_A).await?;

    let params = GovernanceParams::default();
    let proposal = dao.propose(AGENT_A, "Never executed", "", Vec::new()).await?;
    env.clock.set(proposal.voting_start);
    dao.cast_vote(AGENT_A, proposal.id, Support::For).await?;

    env.clock.set(proposal.voting_end + params.grace_period + 1);
    assert_eq!(
        dao.get_proposal(proposal.id).await?.state,
        ProposalState::Expired
    );

    // Expired proposals can no longer be queued
    assert!(matches!(
        dao.queue(proposal.id).await.unwrap_err(),
        GovernanceError::InvalidProposalState { .. }
    ));
    Ok(())
}

#[tokio::test]
async fn test_proposal_ids_are_global_across_daos() -> Result<()> {
    let env = env();
    let claude = env.factory.deploy_dao("claude", DEPLOYER, "deploy-1").await?;
    let gpt = env.factory.deploy_dao("gpt", DEPLOYER, "deploy-2").await?;
    onboard(&env, &claude, AGENT_A).await?;
    onboard(&env, &gpt, AGENT_B).await?;

    let p1 = claude.propose(AGENT_A, "first", "", Vec::new()).await?;
    let p2 = gpt.propose(AGENT_B, "second", "", Vec::new()).await?;
    assert_ne!(p1.id, p2.id);

    assert_eq!(env.factory.get_proposal(p1.id).await?.model, ModelType::Claude);
    assert_eq!(env.factory.get_proposal(p2.id).await?.model, ModelType::Gpt);
    assert_eq!(
        env.factory
            .list_proposals(None, ProposalFilter::All)
            .await
            .len(),
        2
    );
    Ok(())
}
