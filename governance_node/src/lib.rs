//! Per-AI-model DAO governance engine
//!
//! Each supported model family gets an isolated DAO: a governance token
//! ledger with delegation and historical voting-power checkpoints, an agent
//! registry scope, and a proposal lifecycle with time-gated phases resolved
//! against quorum and threshold rules. All mutating operations apply
//! atomically in a strict per-DAO order; reads observe the most recently
//! committed state.

pub mod api;
pub mod clock;
pub mod config;
pub mod dao;
pub mod error;
pub mod factory;
pub mod ledger;
pub mod payment;
pub mod proposals;
pub mod registry;
pub mod types;
pub mod voting;

pub use clock::{GovernanceClock, ManualClock, SystemClock};
pub use config::{FeeSchedule, GovernanceParams, NodeConfig};
pub use dao::{DaoSummary, ModelDAO};
pub use error::{GovernanceError, Result};
pub use factory::DAOFactory;
pub use ledger::{Checkpoint, TokenInfo, TokenLedger};
pub use payment::{PaymentAuthorizer, X402Gateway};
pub use proposals::{Proposal, ProposalAction, ProposalFilter, ProposalState, ProposalStore};
pub use registry::{AgentRecord, AgentRegistry};
pub use types::{normalize_address, Address, ModelType, Support};
pub use voting::{resolve_outcome, VoteRecord, VotingEngine};
