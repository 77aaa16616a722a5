//! Funding wallet collaborator.
//!
//! The pipeline only needs "submit this call from a funded account and tell me
//! the transaction hash". `WalletClient` is that seam; `AccountWalletClient`
//! backs it with a single-owner Starknet account talking to a JSON-RPC node.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use starknet::{
    accounts::{Account, ExecutionEncoding, SingleOwnerAccount},
    core::{
        types::{Call, Felt},
        utils::get_selector_from_name,
    },
    providers::{
        jsonrpc::{HttpTransport, JsonRpcClient},
        Provider,
    },
    signers::{LocalWallet, SigningKey},
};
use tracing::info;
use url::Url;

use crate::blockchain::models::{to_hex, TransactionIntent, TransactionResult};

#[async_trait]
pub trait WalletClient: Send + Sync {
    /// Address of the account that pays; keys the single-writer lock.
    fn address(&self) -> String;

    /// Signs and submits the intent, returning once the node accepted it.
    async fn execute(&self, intent: TransactionIntent) -> Result<TransactionResult>;
}

/// Operator account used to fund new accounts.
pub struct AccountWalletClient {
    account: SingleOwnerAccount<JsonRpcClient<HttpTransport>, LocalWallet>,
    address: Felt,
}

impl AccountWalletClient {
    /// Builds the account, asking the node for its chain id.
    pub async fn connect(rpc_url: &Url, address: Felt, private_key: Felt) -> Result<Self> {
        let provider = JsonRpcClient::new(HttpTransport::new(rpc_url.clone()));
        let chain_id = provider
            .chain_id()
            .await
            .context("Failed to fetch chain id from Starknet RPC")?;

        let signer = LocalWallet::from(SigningKey::from_secret_scalar(private_key));
        let account =
            SingleOwnerAccount::new(provider, signer, address, chain_id, ExecutionEncoding::New);

        info!("Funding wallet {} connected (chain {})", to_hex(&address), to_hex(&chain_id));
        Ok(Self { account, address })
    }
}

#[async_trait]
impl WalletClient for AccountWalletClient {
    fn address(&self) -> String {
        to_hex(&self.address)
    }

    async fn execute(&self, intent: TransactionIntent) -> Result<TransactionResult> {
        let selector = get_selector_from_name(&intent.entrypoint)
            .map_err(|e| anyhow!("Invalid entrypoint '{}': {}", intent.entrypoint, e))?;

        let result = self
            .account
            .execute_v3(vec![Call {
                to: intent.contract_address,
                selector,
                calldata: intent.calldata,
            }])
            .send()
            .await
            .map_err(|e| anyhow!("{}", e))?;

        Ok(TransactionResult {
            transaction_hash: result.transaction_hash,
        })
    }
}
