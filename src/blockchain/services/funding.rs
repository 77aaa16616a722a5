// src/blockchain/services/funding.rs

use std::time::Duration;

use starknet::core::types::Felt;
use tracing::{info, warn};

use crate::blockchain::{
    models::{is_valid_contract_address, to_hex, FundingOutcome, TransactionIntent},
    wallet::WalletClient,
    wallet_locks::WalletLocks,
};
use crate::provisioning::error::ProvisioningError;

/// Sends the funding transfer to a precomputed address.
///
/// Never retries: a submission that timed out may still land, and a second
/// attempt would fund the address twice.
#[derive(Clone)]
pub struct FundingExecutor {
    token_address: Felt,
    locks: WalletLocks,
    timeout: Duration,
}

impl FundingExecutor {
    pub fn new(token_address: Felt, locks: WalletLocks, timeout: Duration) -> Self {
        Self {
            token_address,
            locks,
            timeout,
        }
    }

    pub async fn fund(
        &self,
        wallet: &dyn WalletClient,
        destination: &Felt,
        amount: u128,
    ) -> Result<FundingOutcome, ProvisioningError> {
        if !is_valid_contract_address(destination) {
            return Err(ProvisioningError::FundingFailed(format!(
                "destination {} is not a valid contract address",
                to_hex(destination)
            )));
        }
        if amount == 0 {
            return Err(ProvisioningError::FundingFailed(
                "funding amount must be positive".to_string(),
            ));
        }

        let intent = TransactionIntent::erc20_transfer(self.token_address, *destination, amount);
        let wallet_address = wallet.address();

        // Held until the node answers, so the next submission sees the bumped nonce.
        let _guard = self.locks.acquire(&wallet_address).await;
        info!("Funding {} with {} from {}", to_hex(destination), amount, wallet_address);

        match tokio::time::timeout(self.timeout, wallet.execute(intent)).await {
            Ok(Ok(result)) => {
                info!("Funding tx {} accepted", to_hex(&result.transaction_hash));
                Ok(FundingOutcome {
                    tx_hash: result.transaction_hash,
                })
            }
            Ok(Err(e)) => {
                warn!("Funding {} failed: {}", to_hex(destination), e);
                Err(ProvisioningError::FundingFailed(e.to_string()))
            }
            Err(_) => Err(ProvisioningError::FundingFailed(format!(
                "wallet did not answer within {:?}; the transfer may still be pending, check {} before retrying",
                self.timeout,
                to_hex(destination)
            ))),
        }
    }
}
