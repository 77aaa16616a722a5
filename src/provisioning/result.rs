// src/provisioning/result.rs

use std::fmt;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::blockchain::models::{to_hex, KeyPair};
use crate::provisioning::{
    error::{ProvisioningError, Stage},
    state::ProvisioningState,
};

/// Credentials of the new account. Only rendered by the final result.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub public_key: String,
    private_key: SecretString,
}

impl Credentials {
    pub fn new(public_key: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            private_key: SecretString::new(private_key.into()),
        }
    }

    pub fn expose_private_key(&self) -> &str {
        self.private_key.expose_secret()
    }
}

impl From<&KeyPair> for Credentials {
    fn from(kp: &KeyPair) -> Self {
        Credentials::new(to_hex(&kp.public_key), kp.expose_private_key())
    }
}

impl PartialEq for Credentials {
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key
            && self.private_key.expose_secret() == other.private_key.expose_secret()
    }
}

impl Eq for Credentials {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningResult {
    Success {
        contract_address: String,
        transaction_hash: String,
        credentials: Credentials,
    },
    Failure {
        stage: Stage,
        error: ProvisioningError,
    },
}

impl ProvisioningResult {
    pub fn failure(stage: Stage, error: ProvisioningError) -> Self {
        ProvisioningResult::Failure { stage, error }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProvisioningResult::Success { .. })
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            ProvisioningResult::Failure { stage, .. } => Some(*stage),
            ProvisioningResult::Success { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<String> {
        match self {
            ProvisioningResult::Failure { error, .. } => Some(error.reason()),
            ProvisioningResult::Success { .. } => None,
        }
    }

    /// Structured form handed to agents and HTTP clients.
    pub fn to_json(&self) -> Value {
        match self {
            ProvisioningResult::Success {
                contract_address,
                transaction_hash,
                credentials,
            } => json!({
                "status": "success",
                "contract_address": contract_address,
                "transaction_hash": transaction_hash,
                "public_key": credentials.public_key,
                "private_key": credentials.expose_private_key(),
            }),
            ProvisioningResult::Failure { stage, error } => json!({
                "status": "failure",
                "stage": stage,
                "error_kind": error.kind(),
                "reason": error.reason(),
            }),
        }
    }
}

impl fmt::Display for ProvisioningResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisioningResult::Success {
                contract_address,
                transaction_hash,
                credentials,
            } => write!(
                f,
                "Your account has been successfully deployed at {} transaction_hash : {}, Credentials : public key {}, private key {}",
                contract_address,
                transaction_hash,
                credentials.public_key,
                credentials.expose_private_key()
            ),
            ProvisioningResult::Failure { stage, error } => {
                write!(f, "Account provisioning failed during {}: {}", stage, error.reason())
            }
        }
    }
}

/// Result of a run plus what a caller needs to diagnose it.
#[derive(Debug, Clone)]
pub struct ProvisioningReport {
    pub run_id: Uuid,
    pub result: ProvisioningResult,
    pub states: Vec<ProvisioningState>,
    pub finished_at: DateTime<Utc>,
}

impl ProvisioningReport {
    pub fn to_json(&self) -> Value {
        let mut value = self.result.to_json();
        if let Value::Object(map) = &mut value {
            map.insert("run_id".into(), json!(self.run_id.to_string()));
            map.insert("finished_at".into(), json!(self.finished_at.to_rfc3339()));
            map.insert(
                "states".into(),
                json!(self.states.iter().map(|s| s.to_string()).collect::<Vec<_>>()),
            );
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_json_carries_stage_and_reason() {
        let result = ProvisioningResult::failure(
            Stage::Funding,
            ProvisioningError::FundingFailed("insufficient balance".into()),
        );
        assert_eq!(
            result.to_json(),
            json!({
                "status": "failure",
                "stage": "funding",
                "error_kind": "funding_failed",
                "reason": "insufficient balance"
            })
        );
        assert_eq!(
            result.to_string(),
            "Account provisioning failed during funding: insufficient balance"
        );
    }

    #[test]
    fn success_message_includes_credentials() {
        let result = ProvisioningResult::Success {
            contract_address: "0xccc".into(),
            transaction_hash: "0xeee".into(),
            credentials: Credentials::new("0xaaa", "0xbbb"),
        };
        let text = result.to_string();
        assert!(text.contains("0xccc") && text.contains("0xeee") && text.contains("0xbbb"));
        assert_eq!(result.to_json()["private_key"], "0xbbb");
        assert_eq!(result.stage(), None);
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = Credentials::new("0xaaa", "0xbbb");
        assert!(!format!("{:?}", creds).contains("0xbbb"));
    }
}
