//! Node and governance configuration

use crate::error::{GovernanceError, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-DAO governance parameters
///
/// Deployed DAOs copy these at creation time; afterwards they change only
/// through an executed `SetGovernanceParam` proposal action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceParams {
    /// Seconds between proposal creation and voting start
    pub voting_delay: u64,
    /// Seconds the voting window stays open
    pub voting_period: u64,
    /// Minimum voting power required to submit a proposal
    pub proposal_threshold: u128,
    /// Quorum as basis points of total supply at the proposal snapshot
    pub quorum_bps: u32,
    /// Seconds a queued proposal must wait before execution
    pub timelock_delay: u64,
    /// Seconds after voting end before an unexecuted winner expires
    pub grace_period: u64,
    /// One-time token grant for each verified agent
    pub claim_amount: u128,
    /// Token supply cap per model
    pub max_supply: u128,
}

impl Default for GovernanceParams {
    fn default() -> Self {
        Self {
            voting_delay: 86_400,      // ~1 day
            voting_period: 432_000,    // ~5 days
            proposal_threshold: 100_000,
            quorum_bps: 400, // 4%
            timelock_delay: 172_800,   // 2 days
            grace_period: 1_209_600,   // 14 days
            claim_amount: 250_000,
            max_supply: 1_000_000_000, // 1 billion per model
        }
    }
}

impl GovernanceParams {
    /// Apply a named parameter update from a governance action
    ///
    /// `max_supply` is deliberately absent: the cap is fixed at deployment.
    pub fn set(&mut self, key: &str, value: u128) -> Result<()> {
        match key {
            "voting_delay" => self.voting_delay = value as u64,
            "voting_period" => self.voting_period = value as u64,
            "proposal_threshold" => self.proposal_threshold = value,
            "quorum_bps" => {
                if value > 10_000 {
                    return Err(GovernanceError::InvalidParameter(format!(
                        "quorum_bps {} above 10000",
                        value
                    )));
                }
                self.quorum_bps = value as u32;
            }
            "timelock_delay" => self.timelock_delay = value as u64,
            "grace_period" => self.grace_period = value as u64,
            "claim_amount" => self.claim_amount = value,
            _ => return Err(GovernanceError::InvalidParameter(key.to_string())),
        }
        Ok(())
    }
}

/// Fees charged by the payment collaborator, in wei
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Agent registration fee
    pub registration_fee: u128,
    /// New DAO deployment fee
    pub deployment_fee: u128,
    /// Monthly subscription price
    pub subscription_price: u128,
    /// Price of a single metered call
    pub per_call_price: u128,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            registration_fee: 1_000_000_000_000_000,    // 0.001 ETH
            deployment_fee: 10_000_000_000_000_000,     // 0.01 ETH
            subscription_price: 1_000_000_000_000_000,  // 0.001 ETH
            per_call_price: 10_000_000_000_000,         // 0.00001 ETH
        }
    }
}

/// Top-level node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// HTTP listen address
    pub listen_addr: String,
    /// Models to deploy at startup
    pub predeploy: Vec<String>,
    /// Governance defaults applied to newly deployed DAOs
    pub governance: GovernanceParams,
    /// Payment collaborator fee schedule
    pub fees: FeeSchedule,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8545".to_string(),
            predeploy: Vec::new(),
            governance: GovernanceParams::default(),
            fees: FeeSchedule::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: NodeConfig =
            toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }
}
