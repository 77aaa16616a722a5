//! Raw JSON-RPC client for read-only Starknet node queries.
//!
//! Status polling does not need an account, so it talks to the node directly
//! with `reqwest` and a bounded per-request timeout.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use starknet::core::types::Felt;
use url::Url;

use crate::blockchain::{
    models::{to_hex, TxStatus},
    services::settlement::TransactionStatusSource,
};

/// Starknet JSON-RPC `TXN_HASH_NOT_FOUND` error code.
const TXN_HASH_NOT_FOUND: i64 = 29;

#[derive(Clone)]
pub struct StarknetRpcClient {
    client: Client,
    rpc_url: Url,
}

impl StarknetRpcClient {
    pub fn new(rpc_url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build RPC HTTP client")?;
        Ok(Self { client, rpc_url })
    }

    /// Queries `starknet_getTransactionStatus` and folds the answer into the
    /// three states settlement cares about.
    pub async fn get_transaction_status(&self, tx_hash: &Felt) -> Result<TxStatus> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": "starknet_getTransactionStatus",
            "params": [to_hex(tx_hash)],
            "id": 1
        });

        let resp: Value = self
            .client
            .post(self.rpc_url.clone())
            .json(&payload)
            .send()
            .await
            .context("Failed to reach Starknet RPC")?
            .json()
            .await
            .context("Invalid JSON from Starknet RPC")?;

        if let Some(error) = resp.get("error") {
            if error.get("code").and_then(Value::as_i64) == Some(TXN_HASH_NOT_FOUND) {
                return Ok(TxStatus::Pending);
            }
            return Err(anyhow!("RPC Error getting transaction status: {}", error));
        }

        let result = resp
            .get("result")
            .ok_or_else(|| anyhow!("RPC response missing 'result' field: {}", resp))?;
        Ok(parse_status(result))
    }
}

fn parse_status(result: &Value) -> TxStatus {
    let finality = result["finality_status"].as_str().unwrap_or_default();
    let execution = result["execution_status"].as_str().unwrap_or_default();
    let failure_reason = result["failure_reason"].as_str();

    match finality {
        "REJECTED" => TxStatus::Rejected(failure_reason.unwrap_or("rejected").to_string()),
        "ACCEPTED_ON_L2" | "ACCEPTED_ON_L1" if execution == "REVERTED" => {
            TxStatus::Rejected(failure_reason.unwrap_or("reverted").to_string())
        }
        "ACCEPTED_ON_L2" | "ACCEPTED_ON_L1" => TxStatus::Accepted,
        _ => TxStatus::Pending,
    }
}

#[async_trait]
impl TransactionStatusSource for StarknetRpcClient {
    async fn transaction_status(&self, tx_hash: &Felt) -> Result<TxStatus> {
        self.get_transaction_status(tx_hash).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc_client(server: &mockito::ServerGuard) -> StarknetRpcClient {
        StarknetRpcClient::new(Url::parse(&server.url()).unwrap(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn status_folding() {
        assert_eq!(
            parse_status(&json!({"finality_status": "ACCEPTED_ON_L2", "execution_status": "SUCCEEDED"})),
            TxStatus::Accepted
        );
        assert_eq!(
            parse_status(&json!({"finality_status": "ACCEPTED_ON_L1", "execution_status": "SUCCEEDED"})),
            TxStatus::Accepted
        );
        assert_eq!(
            parse_status(&json!({"finality_status": "ACCEPTED_ON_L2", "execution_status": "REVERTED", "failure_reason": "u256_sub Overflow"})),
            TxStatus::Rejected("u256_sub Overflow".to_string())
        );
        assert_eq!(
            parse_status(&json!({"finality_status": "REJECTED"})),
            TxStatus::Rejected("rejected".to_string())
        );
        assert_eq!(parse_status(&json!({"finality_status": "RECEIVED"})), TxStatus::Pending);
        assert_eq!(parse_status(&json!({"finality_status": "PRE_CONFIRMED"})), TxStatus::Pending);
    }

    #[tokio::test]
    async fn reads_status_over_json_rpc() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(mockito::Matcher::PartialJson(json!({
                "method": "starknet_getTransactionStatus",
                "params": ["0xddd"]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"finality_status":"ACCEPTED_ON_L2","execution_status":"SUCCEEDED"}}"#)
            .expect(1)
            .create_async()
            .await;

        let status = rpc_client(&server)
            .get_transaction_status(&Felt::from_hex("0xddd").unwrap())
            .await
            .unwrap();
        assert_eq!(status, TxStatus::Accepted);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unknown_hash_is_pending() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":29,"message":"Transaction hash not found"}}"#)
            .create_async()
            .await;

        let status = rpc_client(&server)
            .get_transaction_status(&Felt::from_hex("0xddd").unwrap())
            .await
            .unwrap();
        assert_eq!(status, TxStatus::Pending);
    }

    #[tokio::test]
    async fn other_rpc_errors_surface() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"Invalid params"}}"#)
            .create_async()
            .await;

        let err = rpc_client(&server)
            .get_transaction_status(&Felt::ONE)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid params"));
    }
}
