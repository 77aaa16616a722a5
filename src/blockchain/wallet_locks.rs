// src/blockchain/wallet_locks.rs

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes submissions per funding wallet so two provisioning runs sharing
/// a wallet never race on its nonce.
#[derive(Debug, Clone, Default)]
pub struct WalletLocks {
    // Each wallet gets its own lock. The DashMap lets runs on different
    // wallets proceed without contending.
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl WalletLocks {
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Waits until no other submission holds `wallet`, then returns a guard
    /// that releases it on drop.
    pub async fn acquire(&self, wallet: &str) -> OwnedMutexGuard<()> {
        let wallet_lock = self
            .locks
            .entry(wallet.to_lowercase())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        wallet_lock.lock_owned().await
    }
}
