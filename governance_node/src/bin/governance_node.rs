//! Governance node entry point

use anyhow::Result;
use clap::Parser;
use cortex_governance::api::{self, AppState};
use cortex_governance::clock::SystemClock;
use cortex_governance::config::NodeConfig;
use cortex_governance::factory::DAOFactory;
use cortex_governance::payment::X402Gateway;
use cortex_governance::registry::AgentRegistry;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

/// Per-AI-model DAO governance node
#[derive(Debug, Parser)]
#[command(name = "governance_node", version, about)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured listen address
    #[arg(long)]
    listen: Option<String>,
}

/// Operator address charged with genesis deployments
const GENESIS_DEPLOYER: &str = "0x0000000000000000000000000000000000000001";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }

    let clock = Arc::new(SystemClock);
    let gateway = Arc::new(X402Gateway::new(config.fees.clone(), clock.clone()));
    let registry = Arc::new(AgentRegistry::new(clock.clone(), gateway.clone()));
    let factory = Arc::new(DAOFactory::new(
        registry.clone(),
        gateway.clone(),
        clock,
        config.governance.clone(),
    ));

    for model in &config.predeploy {
        let payment_id = format!("genesis:{}", model);
        match factory
            .deploy_dao(model, GENESIS_DEPLOYER, &payment_id)
            .await
        {
            Ok(dao) => info!("Predeployed DAO for {}", dao.model()),
            Err(err) => warn!("Skipping predeploy of {}: {}", model, err),
        }
    }

    let state = AppState {
        factory,
        registry,
        gateway,
    };
    api::serve(state, &config.listen_addr).await
}
