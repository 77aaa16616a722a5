// src/lib.rs

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub mod api;
pub mod blockchain;
pub mod config;
pub mod mcp;
pub mod provisioning;
pub mod utils;

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: config::Config,
    /// Runs the create/fund/deploy pipeline
    pub orchestrator: Arc<provisioning::ProvisioningOrchestrator>,
    /// Address derivation for the read-only precompute tool
    pub precomputer: Arc<dyn blockchain::services::AddressPrecomputer>,
    /// Cancelled on shutdown; every run waits on a child token
    pub shutdown: CancellationToken,
}
