// src/provisioning/mod.rs

//! Account provisioning pipeline: state machine, failure taxonomy, result
//! surface and the orchestrator tying the blockchain services together.

pub mod error;
pub mod orchestrator;
pub mod result;
pub mod state;

pub use error::{ProvisioningError, Stage};
pub use orchestrator::{ProvisioningOrchestrator, SuppliedCredentials};
pub use result::{Credentials, ProvisioningReport, ProvisioningResult};
pub use state::{Outcome, ProvisioningState, StateMachine};
