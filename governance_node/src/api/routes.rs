//! HTTP routes over the governance engine
//!
//! Thin JSON adapters: every handler parses its inputs, calls one engine
//! operation, and maps the engine error onto an HTTP status. Callers are
//! identified by the addresses they submit; authentication lives with the
//! external execution environment, not here.

use crate::api::errors::{ApiError, ApiResult};
use crate::dao::DaoSummary;
use crate::factory::DAOFactory;
use crate::ledger::TokenInfo;
use crate::payment::{SubscriptionStatus, X402Gateway};
use crate::proposals::{Proposal, ProposalAction, ProposalFilter};
use crate::registry::{AgentRecord, AgentRegistry};
use crate::types::{ModelType, Support};
use crate::voting::VoteRecord;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub factory: Arc<DAOFactory>,
    pub registry: Arc<AgentRegistry>,
    pub gateway: Arc<X402Gateway>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/models", get(list_models))
        .route("/daos", get(list_daos).post(deploy_dao))
        .route("/daos/:model", get(get_dao))
        .route("/daos/:model/token", get(get_token))
        .route("/daos/:model/agents", get(list_agents))
        .route("/daos/:model/agents/:address", get(get_agent))
        .route("/daos/:model/agents/:address/verify", post(verify_agent))
        .route("/daos/:model/claims", post(claim_tokens))
        .route("/daos/:model/token/transfer", post(transfer))
        .route("/daos/:model/token/burn", post(burn))
        .route("/daos/:model/token/delegate", post(delegate))
        .route("/daos/:model/token/power/:address", get(voting_power))
        .route("/agents/register", post(register_agent))
        .route("/proposals", get(list_proposals).post(create_proposal))
        .route("/proposals/:id", get(get_proposal))
        .route("/proposals/:id/votes", get(list_votes).post(cast_vote))
        .route("/proposals/:id/queue", post(queue_proposal))
        .route("/proposals/:id/execute", post(execute_proposal))
        .route("/proposals/:id/cancel", post(cancel_proposal))
        .route("/payments/subscriptions", post(purchase_subscription))
        .route("/payments/subscriptions/:address", get(subscription_status))
        .route("/payments/calls", post(pay_for_call))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn parse_model(raw: &str) -> ApiResult<ModelType> {
    Ok(ModelType::from_str(raw)?)
}

/// Proposal as exposed to readers, token symbol included
#[derive(Debug, Serialize)]
struct ProposalView {
    token: String,
    #[serde(flatten)]
    proposal: Proposal,
}

impl From<Proposal> for ProposalView {
    fn from(proposal: Proposal) -> Self {
        Self {
            token: proposal.model.token_symbol(),
            proposal,
        }
    }
}

#[derive(Debug, Serialize)]
struct ModelEntry {
    model: ModelType,
    token_symbol: String,
    deployed: bool,
}

async fn list_models(State(state): State<AppState>) -> ApiResult<Json<Vec<ModelEntry>>> {
    let mut entries = Vec::new();
    for model in state.factory.get_supported_models() {
        entries.push(ModelEntry {
            model: *model,
            token_symbol: model.token_symbol(),
            deployed: state.factory.get_dao(*model).await.is_some(),
        });
    }
    Ok(Json(entries))
}

async fn list_daos(State(state): State<AppState>) -> Json<Vec<DaoSummary>> {
    Json(state.factory.get_all_daos().await)
}

#[derive(Debug, Deserialize)]
struct DeployRequest {
    model: String,
    deployer: String,
    payment_id: String,
}

async fn deploy_dao(
    State(state): State<AppState>,
    Json(req): Json<DeployRequest>,
) -> ApiResult<Json<DaoSummary>> {
    let dao = state
        .factory
        .deploy_dao(&req.model, &req.deployer, &req.payment_id)
        .await?;
    Ok(Json(dao.summary().await))
}

async fn get_dao(
    State(state): State<AppState>,
    Path(model): Path<String>,
) -> ApiResult<Json<DaoSummary>> {
    let model = parse_model(&model)?;
    let dao = state.factory.dao(model).await?;
    Ok(Json(dao.summary().await))
}

async fn get_token(
    State(state): State<AppState>,
    Path(model): Path<String>,
) -> ApiResult<Json<TokenInfo>> {
    let model = parse_model(&model)?;
    let dao = state.factory.dao(model).await?;
    Ok(Json(dao.token_info().await))
}

async fn list_agents(
    State(state): State<AppState>,
    Path(model): Path<String>,
) -> ApiResult<Json<Vec<AgentRecord>>> {
    let model = parse_model(&model)?;
    Ok(Json(state.registry.agents_of_model(model).await))
}

#[derive(Debug, Serialize)]
struct AgentView {
    #[serde(flatten)]
    record: AgentRecord,
    eligible: bool,
    claimed: bool,
}

async fn get_agent(
    State(state): State<AppState>,
    Path((model, address)): Path<(String, String)>,
) -> ApiResult<Json<AgentView>> {
    let model = parse_model(&model)?;
    let record = state
        .registry
        .agent_info(&address, model)
        .await
        .ok_or_else(|| ApiError::not_found("agent not registered"))?;
    let eligible = state.registry.is_eligible(&address, model).await;
    let claimed = match state.factory.get_dao(model).await {
        Some(dao) => dao.has_claimed(&address).await,
        None => false,
    };
    Ok(Json(AgentView {
        record,
        eligible,
        claimed,
    }))
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    address: String,
    model: String,
    payment_id: String,
}

async fn register_agent(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<AgentRecord>> {
    let model = parse_model(&req.model)?;
    let record = state
        .registry
        .register_agent(&req.address, model, &req.payment_id)
        .await?;
    Ok(Json(record))
}

async fn verify_agent(
    State(state): State<AppState>,
    Path((model, address)): Path<(String, String)>,
) -> ApiResult<Json<AgentRecord>> {
    let model = parse_model(&model)?;
    let dao = state.factory.dao(model).await?;
    Ok(Json(dao.verify_agent(&address).await?))
}

#[derive(Debug, Deserialize)]
struct ClaimRequest {
    address: String,
}

#[derive(Debug, Serialize)]
struct ClaimResponse {
    address: String,
    amount: u128,
}

async fn claim_tokens(
    State(state): State<AppState>,
    Path(model): Path<String>,
    Json(req): Json<ClaimRequest>,
) -> ApiResult<Json<ClaimResponse>> {
    let model = parse_model(&model)?;
    let dao = state.factory.dao(model).await?;
    let amount = dao.claim_tokens(&req.address).await?;
    Ok(Json(ClaimResponse {
        address: req.address,
        amount,
    }))
}

#[derive(Debug, Deserialize)]
struct TransferRequest {
    from: String,
    to: String,
    amount: u128,
}

#[derive(Debug, Serialize)]
struct BalanceResponse {
    address: String,
    balance: u128,
}

async fn transfer(
    State(state): State<AppState>,
    Path(model): Path<String>,
    Json(req): Json<TransferRequest>,
) -> ApiResult<Json<BalanceResponse>> {
    let model = parse_model(&model)?;
    let dao = state.factory.dao(model).await?;
    let from = crate::types::normalize_address(&req.from)?;
    let to = crate::types::normalize_address(&req.to)?;
    dao.ledger().transfer(&from, &to, req.amount).await?;
    Ok(Json(BalanceResponse {
        balance: dao.ledger().balance_of(&from).await,
        address: from,
    }))
}

#[derive(Debug, Deserialize)]
struct BurnRequest {
    owner: String,
    amount: u128,
}

async fn burn(
    State(state): State<AppState>,
    Path(model): Path<String>,
    Json(req): Json<BurnRequest>,
) -> ApiResult<Json<BalanceResponse>> {
    let model = parse_model(&model)?;
    let dao = state.factory.dao(model).await?;
    let owner = crate::types::normalize_address(&req.owner)?;
    dao.ledger().burn(&owner, req.amount).await?;
    Ok(Json(BalanceResponse {
        balance: dao.ledger().balance_of(&owner).await,
        address: owner,
    }))
}

#[derive(Debug, Deserialize)]
struct DelegateRequest {
    delegator: String,
    delegatee: String,
}

#[derive(Debug, Serialize)]
struct DelegateResponse {
    delegator: String,
    delegatee: String,
}

async fn delegate(
    State(state): State<AppState>,
    Path(model): Path<String>,
    Json(req): Json<DelegateRequest>,
) -> ApiResult<Json<DelegateResponse>> {
    let model = parse_model(&model)?;
    let dao = state.factory.dao(model).await?;
    let delegator = crate::types::normalize_address(&req.delegator)?;
    let delegatee = crate::types::normalize_address(&req.delegatee)?;
    dao.ledger().delegate(&delegator, &delegatee).await?;
    Ok(Json(DelegateResponse {
        delegator,
        delegatee,
    }))
}

#[derive(Debug, Deserialize)]
struct PowerQuery {
    at: Option<u64>,
}

#[derive(Debug, Serialize)]
struct PowerResponse {
    address: String,
    power: u128,
    at: Option<u64>,
}

async fn voting_power(
    State(state): State<AppState>,
    Path((model, address)): Path<(String, String)>,
    Query(query): Query<PowerQuery>,
) -> ApiResult<Json<PowerResponse>> {
    let model = parse_model(&model)?;
    let dao = state.factory.dao(model).await?;
    let address = crate::types::normalize_address(&address)?;
    let power = match query.at {
        Some(timestamp) => dao.ledger().voting_power_at(&address, timestamp).await,
        None => dao.ledger().current_voting_power(&address).await,
    };
    Ok(Json(PowerResponse {
        address,
        power,
        at: query.at,
    }))
}

#[derive(Debug, Deserialize)]
struct ProposalRequest {
    model: String,
    proposer: String,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    actions: Vec<ProposalAction>,
}

async fn create_proposal(
    State(state): State<AppState>,
    Json(req): Json<ProposalRequest>,
) -> ApiResult<Json<ProposalView>> {
    let model = parse_model(&req.model)?;
    let dao = state.factory.dao(model).await?;
    let proposal = dao
        .propose(&req.proposer, &req.title, &req.description, req.actions)
        .await?;
    Ok(Json(proposal.into()))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    model: Option<String>,
    filter: Option<String>,
}

async fn list_proposals(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<ProposalView>>> {
    let model = match query.model {
        Some(raw) => Some(parse_model(&raw)?),
        None => None,
    };
    let filter = match query.filter {
        Some(raw) => ProposalFilter::from_str(&raw)
            .map_err(|_| ApiError::bad_request("filter must be one of all|pending|active|succeeded|defeated"))?,
        None => ProposalFilter::All,
    };
    let proposals = state.factory.list_proposals(model, filter).await;
    Ok(Json(proposals.into_iter().map(ProposalView::from).collect()))
}

async fn get_proposal(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<ProposalView>> {
    Ok(Json(state.factory.get_proposal(id).await?.into()))
}

#[derive(Debug, Deserialize)]
struct VoteRequest {
    voter: String,
    /// 0 = Against, 1 = For, 2 = Abstain
    support: u8,
}

async fn cast_vote(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<VoteRequest>,
) -> ApiResult<Json<VoteRecord>> {
    let support = Support::from_u8(req.support)
        .ok_or_else(|| ApiError::bad_request("support must be 0 (against), 1 (for) or 2 (abstain)"))?;
    let dao = state.factory.dao_of_proposal(id).await?;
    Ok(Json(dao.cast_vote(&req.voter, id, support).await?))
}

async fn list_votes(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Vec<VoteRecord>>> {
    let dao = state.factory.dao_of_proposal(id).await?;
    Ok(Json(dao.votes_of(id).await))
}

async fn queue_proposal(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<ProposalView>> {
    let dao = state.factory.dao_of_proposal(id).await?;
    Ok(Json(dao.queue(id).await?.into()))
}

async fn execute_proposal(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<ProposalView>> {
    let dao = state.factory.dao_of_proposal(id).await?;
    Ok(Json(dao.execute(id).await?.into()))
}

#[derive(Debug, Deserialize)]
struct CancelRequest {
    caller: String,
}

async fn cancel_proposal(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<CancelRequest>,
) -> ApiResult<Json<ProposalView>> {
    let dao = state.factory.dao_of_proposal(id).await?;
    Ok(Json(dao.cancel(&req.caller, id).await?.into()))
}

#[derive(Debug, Deserialize)]
struct SubscriptionRequest {
    payer: String,
    amount: u128,
}

#[derive(Debug, Serialize)]
struct SubscriptionResponse {
    payer: String,
    expires_at: u64,
}

async fn purchase_subscription(
    State(state): State<AppState>,
    Json(req): Json<SubscriptionRequest>,
) -> ApiResult<Json<SubscriptionResponse>> {
    let payer = crate::types::normalize_address(&req.payer)?;
    let expires_at = state.gateway.purchase_subscription(&payer, req.amount).await?;
    Ok(Json(SubscriptionResponse { payer, expires_at }))
}

async fn subscription_status(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<SubscriptionStatus>> {
    let address = crate::types::normalize_address(&address)?;
    Ok(Json(state.gateway.subscription_status(&address).await))
}

#[derive(Debug, Deserialize)]
struct CallPaymentRequest {
    payer: String,
    payment_id: String,
    amount: u128,
}

#[derive(Debug, Serialize)]
struct CallPaymentResponse {
    payer: String,
    payment_id: String,
}

async fn pay_for_call(
    State(state): State<AppState>,
    Json(req): Json<CallPaymentRequest>,
) -> ApiResult<Json<CallPaymentResponse>> {
    let payer = crate::types::normalize_address(&req.payer)?;
    state
        .gateway
        .pay_for_call(&payer, &req.payment_id, req.amount)
        .await?;
    Ok(Json(CallPaymentResponse {
        payer,
        payment_id: req.payment_id,
    }))
}
