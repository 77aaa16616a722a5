// src/provisioning/error.rs

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Everything that can stop a provisioning run.
///
/// Variants carry the verbatim cause so the tool layer can hand it back to
/// the agent untouched; `reason()` returns that cause without the prefix added
/// by `Display`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningError {
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
    #[error("invalid account template: {0}")]
    InvalidTemplate(String),
    #[error("entropy source unavailable: {0}")]
    FatalEntropyError(String),
    #[error("precomputed address {0} is already being provisioned")]
    AddressInUse(String),
    #[error("address {0} was already sent funds; retry the deployment instead")]
    AlreadyFunded(String),
    #[error("address {0} has not been funded by this server")]
    NotFunded(String),
    #[error("funding failed: {0}")]
    FundingFailed(String),
    #[error("funding transaction was not accepted by the network: {0}")]
    FundingReverted(String),
    #[error("settlement not observed after {attempts} attempts")]
    TimedOut { attempts: u32 },
    #[error("settlement wait cancelled")]
    SettlementCancelled,
    #[error("deployment service unavailable: {0}")]
    DeploymentUnavailable(String),
    #[error("deployment rejected: {0}")]
    DeploymentRejected(String),
    #[error("malformed deployment response: {0}")]
    MalformedResponse(String),
}

impl ProvisioningError {
    /// Stable snake_case tag for structured results.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCredentials(_) => "invalid_credentials",
            Self::InvalidTemplate(_) => "invalid_template",
            Self::FatalEntropyError(_) => "fatal_entropy_error",
            Self::AddressInUse(_) => "address_in_use",
            Self::AlreadyFunded(_) => "already_funded",
            Self::NotFunded(_) => "not_funded",
            Self::FundingFailed(_) => "funding_failed",
            Self::FundingReverted(_) => "funding_reverted",
            Self::TimedOut { .. } => "timed_out",
            Self::SettlementCancelled => "settlement_cancelled",
            Self::DeploymentUnavailable(_) => "deployment_unavailable",
            Self::DeploymentRejected(_) => "deployment_rejected",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }

    pub fn reason(&self) -> String {
        match self {
            Self::InvalidCredentials(r)
            | Self::InvalidTemplate(r)
            | Self::FatalEntropyError(r)
            | Self::FundingFailed(r)
            | Self::FundingReverted(r)
            | Self::DeploymentUnavailable(r)
            | Self::DeploymentRejected(r)
            | Self::MalformedResponse(r) => r.clone(),
            other => other.to_string(),
        }
    }
}

/// Pipeline phase a run failed in. Decides the recovery path: a `Setup`
/// failure moved no value and can simply be retried. Once a run reaches
/// `Funding` its address is never funded again; the only way forward for
/// those keys is a deployment retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Setup,
    Funding,
    Waiting,
    Deployment,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::Funding => "funding",
            Stage::Waiting => "waiting",
            Stage::Deployment => "deployment",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
