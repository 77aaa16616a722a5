// src/api/account.rs

//! Account tools shared by the HTTP routes and the MCP dispatcher.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use starknet::core::types::Felt;
use thiserror::Error;
use tracing::{error, info};
use validator::Validate;

use crate::{
    blockchain::models::{parse_felt, to_hex, AccountKind},
    mcp::protocol::error_codes,
    provisioning::{ProvisioningReport, SuppliedCredentials},
    AppState,
};

// --- Request Models ---

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAccountRequest {
    /// "openzeppelin" or "argent"
    #[validate(length(min = 1))]
    pub account_type: String,
    /// Argent guardian, defaults to none
    pub guardian: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DeployAccountRequest {
    #[validate(length(min = 1))]
    pub account_type: String,
    pub public_key: Option<String>,
    pub private_key: Option<String>,
    pub precalculate_address: Option<String>,
    /// Rejected when set: the deployment service only builds guardian-less
    /// accounts.
    pub guardian: Option<String>,
    /// Base units of the funding token; the configured amount when absent.
    pub funding_amount: Option<String>,
    /// Resubmit the deployment for already funded credentials.
    #[serde(default)]
    pub retry_deployment: bool,
}

impl DeployAccountRequest {
    /// Credentials from an earlier `create_account`, if any were passed.
    fn supplied_credentials(&self) -> Option<SuppliedCredentials> {
        let given = [&self.public_key, &self.private_key, &self.precalculate_address];
        if given.iter().all(|v| v.as_deref().map_or(true, |s| s.trim().is_empty())) {
            return None;
        }
        Some(SuppliedCredentials {
            public_key: self.public_key.clone().unwrap_or_default(),
            private_key: self.private_key.clone().unwrap_or_default(),
            precomputed_address: self.precalculate_address.clone().unwrap_or_default(),
        })
    }
}

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("{0}")]
    InvalidParams(String),
    #[error("{0}")]
    Internal(String),
}

impl ToolError {
    pub fn rpc_code(&self) -> i32 {
        match self {
            ToolError::InvalidParams(_) => error_codes::INVALID_PARAMS,
            ToolError::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ToolError::InvalidParams(_) => StatusCode::BAD_REQUEST,
            ToolError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn parse_kind(account_type: &str) -> Result<AccountKind, ToolError> {
    account_type.parse().map_err(ToolError::InvalidParams)
}

fn extra_args(guardian: &Option<String>) -> Result<Vec<Felt>, ToolError> {
    match guardian.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
        Some(g) => parse_felt(g)
            .map(|felt| vec![felt])
            .map_err(|e| ToolError::InvalidParams(format!("guardian: {}", e))),
        None => Ok(Vec::new()),
    }
}

fn validate<T: Validate>(input: &T) -> Result<(), ToolError> {
    input
        .validate()
        .map_err(|e| ToolError::InvalidParams(e.to_string()))
}

// --- Operations ---

/// Generates keys and the precomputed address; nothing is sent on chain.
pub fn create_account(state: &AppState, input: &CreateAccountRequest) -> Result<Value, ToolError> {
    validate(input)?;
    let kind = parse_kind(&input.account_type)?;
    let extra = extra_args(&input.guardian)?;

    let (key_pair, precomputed) = state
        .orchestrator
        .create_account(kind, &extra)
        .map_err(|e| ToolError::Internal(e.to_string()))?;

    info!("Created {} account at {}", kind, to_hex(&precomputed.address));
    Ok(json!({
        "status": "success",
        "wallet": kind.label(),
        "new_account_publickey": to_hex(&key_pair.public_key),
        "new_account_privatekey": key_pair.expose_private_key(),
        "precalculate_address": to_hex(&precomputed.address),
    }))
}

/// Funds and deploys an account, either from supplied credentials or fresh
/// keys. Pipeline failures come back inside the report, not as `Err`.
pub async fn deploy_account(
    state: &AppState,
    input: &DeployAccountRequest,
) -> Result<ProvisioningReport, ToolError> {
    validate(input)?;
    let kind = parse_kind(&input.account_type)?;
    if !extra_args(&input.guardian)?.is_empty() {
        return Err(ToolError::InvalidParams(
            "guardian is not supported by deploy_account: the deployment service deploys \
             accounts without a guardian"
                .to_string(),
        ));
    }

    if input.retry_deployment {
        let credentials = input.supplied_credentials().ok_or_else(|| {
            ToolError::InvalidParams(
                "retry_deployment needs the public_key, private_key and precalculate_address \
                 of the funded account"
                    .to_string(),
            )
        })?;
        return Ok(state.orchestrator.redeploy(kind, &credentials, &[]).await);
    }

    let funding_amount = match input.funding_amount.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => match raw.parse::<u128>() {
            Ok(amount) if amount > 0 => amount,
            _ => {
                return Err(ToolError::InvalidParams(format!(
                    "funding_amount must be a positive integer, got '{}'",
                    raw
                )))
            }
        },
        _ => state.config.funding_amount,
    };

    let cancel = state.shutdown.child_token();
    let report = match input.supplied_credentials() {
        Some(credentials) => {
            state
                .orchestrator
                .resume(kind, &credentials, &[], funding_amount, &cancel)
                .await
        }
        None => {
            state
                .orchestrator
                .provision(kind, &[], funding_amount, &cancel)
                .await
        }
    };
    Ok(report)
}

// --- Handlers ---

pub async fn create_account_handler(
    State(state): State<AppState>,
    Json(input): Json<CreateAccountRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    create_account(&state, &input).map(Json).map_err(|e| {
        error!("Failed to create account: {}", e);
        (e.status_code(), e.to_string())
    })
}

pub async fn deploy_account_handler(
    State(state): State<AppState>,
    Json(input): Json<DeployAccountRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let report = deploy_account(&state, &input)
        .await
        .map_err(|e| (e.status_code(), e.to_string()))?;

    let mut body = report.to_json();
    body["message"] = json!(report.result.to_string());
    Ok(Json(body))
}
