use crate::proposals::ProposalState;
use crate::types::ModelType;

#[derive(Debug, thiserror::Error)]
pub enum GovernanceError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Insufficient balance: need {required}, have {available}")]
    InsufficientBalance { required: u128, available: u128 },

    #[error("Supply cap exceeded: minting {amount} onto supply {total_supply} would pass cap {max_supply}")]
    SupplyCapExceeded {
        amount: u128,
        total_supply: u128,
        max_supply: u128,
    },

    #[error("Proposal threshold not met: voting power {power} below threshold {threshold}")]
    ThresholdNotMet { power: u128, threshold: u128 },

    #[error("Agent {address} already registered for model {model}")]
    DuplicateRegistration { address: String, model: ModelType },

    #[error("Agent {voter} already voted on proposal {proposal_id}")]
    AlreadyVoted { proposal_id: u64, voter: String },

    #[error("Voting closed: {0}")]
    VotingClosed(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("DAO already deployed for model {0}")]
    DuplicateDeployment(ModelType),

    #[error("Payment authorization failed: {0}")]
    PaymentAuthorizationFailed(String),

    #[error("Ledger integrity fault: {0}")]
    IntegrityFault(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Proposal {0} not found")]
    ProposalNotFound(u64),

    #[error("Agent {address} not registered for model {model}")]
    AgentNotFound { address: String, model: ModelType },

    #[error("No DAO deployed for model {0}")]
    DaoNotDeployed(ModelType),

    #[error("Proposal is {state}, cannot {action}")]
    InvalidProposalState {
        state: ProposalState,
        action: &'static str,
    },

    #[error("Timelock active: executable at {ready_at}, now {now}")]
    TimelockActive { ready_at: u64, now: u64 },

    #[error("Agent {0} already claimed their token grant")]
    AlreadyClaimed(String),

    #[error("Invalid governance parameter: {0}")]
    InvalidParameter(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GovernanceError>;
