// src/blockchain/services/deployment.rs

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{info, warn};
use url::Url;

use crate::blockchain::models::{to_hex, DeployOutcome, DeployPayload};
use crate::provisioning::error::ProvisioningError;

pub const CALL_DATA_PATH: &str = "/api/wallet/call_data";

/// Remote service that turns a funded precomputed address into a deployed account.
#[async_trait]
pub trait DeploymentService: Send + Sync {
    async fn request_deploy(&self, payload: &DeployPayload)
        -> Result<DeployOutcome, ProvisioningError>;
}

/// Talks to the deployment endpoint over HTTP with an `x-api-key` header.
#[derive(Clone)]
pub struct HttpDeploymentRequester {
    client: Client,
    endpoint: Url,
    api_key: SecretString,
}

impl HttpDeploymentRequester {
    pub fn new(endpoint: Url, api_key: SecretString, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build deployment HTTP client")?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    fn call_data_url(&self) -> String {
        format!("{}{}", self.endpoint.as_str().trim_end_matches('/'), CALL_DATA_PATH)
    }
}

#[async_trait]
impl DeploymentService for HttpDeploymentRequester {
    async fn request_deploy(
        &self,
        payload: &DeployPayload,
    ) -> Result<DeployOutcome, ProvisioningError> {
        info!(
            "Requesting {} account deployment at {}",
            payload.kind,
            to_hex(&payload.precomputed_address)
        );

        let resp = self
            .client
            .post(self.call_data_url())
            .header("x-api-key", self.api_key.expose_secret())
            .json(&json!({ "request": payload.command() }))
            .send()
            .await
            .map_err(|e| {
                let cause = if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.without_url().to_string()
                };
                ProvisioningError::DeploymentUnavailable(cause)
            })?;

        let http_status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ProvisioningError::DeploymentUnavailable(e.without_url().to_string()))?;

        let body: Option<Value> = serde_json::from_str(&text).ok();
        if !http_status.is_success() {
            let reason = body
                .as_ref()
                .and_then(failure_reason)
                .unwrap_or_else(|| format!("HTTP {}: {}", http_status, text.trim()));
            warn!("Deployment endpoint answered {}", http_status);
            return Err(ProvisioningError::DeploymentRejected(reason));
        }

        let body = body.ok_or_else(|| {
            ProvisioningError::MalformedResponse(format!("response is not JSON: {}", text.trim()))
        })?;
        interpret_response(&body)
    }
}

/// Maps a decoded response body to an outcome. `"failure"` is a rejection,
/// any other status must carry both the address and the hash.
pub fn interpret_response(body: &Value) -> Result<DeployOutcome, ProvisioningError> {
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| ProvisioningError::MalformedResponse("missing 'status' field".to_string()))?;

    if status == "failure" {
        let reason = failure_reason(body).unwrap_or_else(|| status.to_string());
        return Err(ProvisioningError::DeploymentRejected(reason));
    }

    let field = |name: &str| {
        body.get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                ProvisioningError::MalformedResponse(format!(
                    "status '{}' without '{}' field",
                    status, name
                ))
            })
    };

    Ok(DeployOutcome {
        contract_address: field("contract_address")?,
        transaction_hash: field("transaction_hash")?,
    })
}

fn failure_reason(body: &Value) -> Option<String> {
    ["error", "message"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}
