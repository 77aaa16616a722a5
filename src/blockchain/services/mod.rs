// src/blockchain/services/mod.rs

//! The five steps of account provisioning, leaf first.

pub mod address;
pub mod deployment;
pub mod funding;
pub mod keys;
pub mod settlement;

pub use address::{AddressPrecomputer, StarkAddressPrecomputer};
pub use deployment::{DeploymentService, HttpDeploymentRequester};
pub use funding::FundingExecutor;
pub use keys::{KeyMaterialGenerator, StarkKeyGenerator};
pub use settlement::{DeploymentWaiter, Settlement, SettlementPolicy, TransactionStatusSource};
