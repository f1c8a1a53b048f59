//! DAO factory
//!
//! Deploys the bound (token ledger, proposal store) pair for a model exactly
//! once and tracks every deployed DAO. Deployment is gated on the payment
//! collaborator's fee authorization; a second deployment for the same model
//! is an explicit error, never a silent no-op.

use crate::clock::GovernanceClock;
use crate::config::GovernanceParams;
use crate::dao::{DaoSummary, ModelDAO};
use crate::error::{GovernanceError, Result};
use crate::ledger::TokenInfo;
use crate::payment::PaymentAuthorizer;
use crate::proposals::{Proposal, ProposalFilter};
use crate::registry::AgentRegistry;
use crate::types::{normalize_address, ModelType};
use log::info;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct DAOFactory {
    registry: Arc<AgentRegistry>,
    payment: Arc<dyn PaymentAuthorizer>,
    clock: Arc<dyn GovernanceClock>,
    defaults: GovernanceParams,
    /// Proposal ids are allocated from one counter across every DAO, so an
    /// id identifies a proposal globally
    proposal_ids: Arc<AtomicU64>,
    daos: RwLock<HashMap<ModelType, Arc<ModelDAO>>>,
}

impl DAOFactory {
    pub fn new(
        registry: Arc<AgentRegistry>,
        payment: Arc<dyn PaymentAuthorizer>,
        clock: Arc<dyn GovernanceClock>,
        defaults: GovernanceParams,
    ) -> Self {
        Self {
            registry,
            payment,
            clock,
            defaults,
            proposal_ids: Arc::new(AtomicU64::new(1)),
            daos: RwLock::new(HashMap::new()),
        }
    }

    /// Deploy the DAO for `model`
    ///
    /// The fee authorization and the registration of the new DAO happen under
    /// one guard: either the fee is collected and the DAO exists afterwards,
    /// or neither happened.
    pub async fn deploy_dao(
        &self,
        model: &str,
        deployer: &str,
        payment_id: &str,
    ) -> Result<Arc<ModelDAO>> {
        let model = ModelType::from_str(model)?;
        let deployer = normalize_address(deployer)?;

        let mut daos = self.daos.write().await;
        if daos.contains_key(&model) {
            return Err(GovernanceError::DuplicateDeployment(model));
        }

        self.payment.authorize_deployment(&deployer, payment_id).await?;

        let dao = Arc::new(ModelDAO::new(
            model,
            self.defaults.clone(),
            self.registry.clone(),
            self.clock.clone(),
            self.proposal_ids.clone(),
        ));
        daos.insert(model, dao.clone());

        info!("DAO deployed for {} by {}", model, deployer);
        Ok(dao)
    }

    pub async fn get_dao(&self, model: ModelType) -> Option<Arc<ModelDAO>> {
        self.daos.read().await.get(&model).cloned()
    }

    /// Like `get_dao`, but an error when the DAO is missing
    pub async fn dao(&self, model: ModelType) -> Result<Arc<ModelDAO>> {
        self.get_dao(model)
            .await
            .ok_or(GovernanceError::DaoNotDeployed(model))
    }

    pub async fn get_token(&self, model: ModelType) -> Option<TokenInfo> {
        let dao = self.get_dao(model).await?;
        Some(dao.token_info().await)
    }

    pub async fn get_all_daos(&self) -> Vec<DaoSummary> {
        let daos: Vec<Arc<ModelDAO>> = self.daos.read().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(daos.len());
        for dao in daos {
            summaries.push(dao.summary().await);
        }
        summaries.sort_by_key(|s| s.model);
        summaries
    }

    pub fn get_supported_models(&self) -> &'static [ModelType] {
        &ModelType::ALL
    }

    /// Find a proposal by its global id across every deployed DAO
    pub async fn get_proposal(&self, proposal_id: u64) -> Result<Proposal> {
        let daos: Vec<Arc<ModelDAO>> = self.daos.read().await.values().cloned().collect();
        for dao in daos {
            match dao.get_proposal(proposal_id).await {
                Ok(proposal) => return Ok(proposal),
                Err(GovernanceError::ProposalNotFound(_)) => continue,
                Err(other) => return Err(other),
            }
        }
        Err(GovernanceError::ProposalNotFound(proposal_id))
    }

    /// DAO owning the proposal with this global id
    pub async fn dao_of_proposal(&self, proposal_id: u64) -> Result<Arc<ModelDAO>> {
        let daos: Vec<Arc<ModelDAO>> = self.daos.read().await.values().cloned().collect();
        for dao in daos {
            match dao.get_proposal(proposal_id).await {
                Ok(_) => return Ok(dao),
                Err(GovernanceError::ProposalNotFound(_)) => continue,
                Err(other) => return Err(other),
            }
        }
        Err(GovernanceError::ProposalNotFound(proposal_id))
    }

    /// List proposals across every DAO, optionally restricted to one model
    pub async fn list_proposals(
        &self,
        model: Option<ModelType>,
        filter: ProposalFilter,
    ) -> Vec<Proposal> {
        let daos: Vec<Arc<ModelDAO>> = match model {
            Some(model) => self.get_dao(model).await.into_iter().collect(),
            None => self.daos.read().await.values().cloned().collect(),
        };
        let mut out = Vec::new();
        for dao in daos {
            out.extend(dao.list_proposals(filter).await);
        }
        out.sort_by_key(|p| p.id);
        out
    }
}
