//! Scripted collaborators for driving the provisioning pipeline without a
//! node or a deployment service.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use starknet::core::types::Felt;
use tokio_util::sync::CancellationToken;

use starknet_provision_mcp::{
    blockchain::{
        models::{
            AccountTemplate, DeployOutcome, DeployPayload, KeyPair, PrecomputedAddress,
            TransactionIntent, TransactionResult, TxStatus,
        },
        services::{
            AddressPrecomputer, DeploymentService, DeploymentWaiter, FundingExecutor,
            KeyMaterialGenerator, SettlementPolicy, StarkAddressPrecomputer,
            TransactionStatusSource,
        },
        wallet::WalletClient,
        wallet_locks::WalletLocks,
    },
    config::Config,
    provisioning::{ProvisioningError, ProvisioningOrchestrator},
    AppState,
};

pub const PUBLIC_KEY: u64 = 0xaaa;
pub const PRIVATE_KEY: u64 = 0xbbb;
pub const ADDRESS: u64 = 0xccc;
pub const FUNDING_TX: u64 = 0xddd;
pub const TOKEN: u64 = 0x7;

/// Ordered record of which collaborator was called.
pub type EventLog = Arc<Mutex<Vec<&'static str>>>;

pub fn events(log: &EventLog) -> Vec<&'static str> {
    log.lock().unwrap().clone()
}

pub struct FixedKeys;

impl KeyMaterialGenerator for FixedKeys {
    fn generate(&self) -> Result<KeyPair, ProvisioningError> {
        Ok(KeyPair::new(Felt::from(PUBLIC_KEY), &Felt::from(PRIVATE_KEY)))
    }
}

pub struct BrokenEntropy;

impl KeyMaterialGenerator for BrokenEntropy {
    fn generate(&self) -> Result<KeyPair, ProvisioningError> {
        Err(ProvisioningError::FatalEntropyError("no entropy".into()))
    }
}

pub struct FixedAddress;

impl AddressPrecomputer for FixedAddress {
    fn precompute(
        &self,
        public_key: Felt,
        template: &AccountTemplate,
        _extra: &[Felt],
    ) -> Result<PrecomputedAddress, ProvisioningError> {
        Ok(PrecomputedAddress {
            address: Felt::from(ADDRESS),
            template: *template,
            public_key,
        })
    }
}

pub struct MockWallet {
    log: EventLog,
    failure: Option<String>,
    delay: Duration,
    pub calls: AtomicUsize,
    pub intents: Mutex<Vec<TransactionIntent>>,
}

#[async_trait]
impl WalletClient for MockWallet {
    fn address(&self) -> String {
        "0x123".to_string()
    }

    async fn execute(&self, intent: TransactionIntent) -> Result<TransactionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push("fund");
        self.intents.lock().unwrap().push(intent);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.failure {
            Some(reason) => Err(anyhow!("{}", reason)),
            None => Ok(TransactionResult {
                transaction_hash: Felt::from(FUNDING_TX),
            }),
        }
    }
}

pub struct MockStatus {
    log: EventLog,
    scripted: Mutex<VecDeque<TxStatus>>,
    fallback: TxStatus,
    pub calls: AtomicUsize,
}

#[async_trait]
impl TransactionStatusSource for MockStatus {
    async fn transaction_status(&self, _tx_hash: &Felt) -> Result<TxStatus> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push("status");
        let next = self.scripted.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

pub struct MockDeployer {
    log: EventLog,
    response: Result<DeployOutcome, ProvisioningError>,
    pub calls: AtomicUsize,
    pub commands: Mutex<Vec<String>>,
}

#[async_trait]
impl DeploymentService for MockDeployer {
    async fn request_deploy(
        &self,
        payload: &DeployPayload,
    ) -> Result<DeployOutcome, ProvisioningError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push("deploy");
        self.commands.lock().unwrap().push(payload.command());
        self.response.clone()
    }
}

/// Builder for an orchestrator wired to mocks. Every collaborator defaults to
/// the happy path.
pub struct Harness {
    pub log: EventLog,
    pub keys: Arc<dyn KeyMaterialGenerator>,
    pub precomputer: Arc<dyn AddressPrecomputer>,
    pub wallet: Arc<MockWallet>,
    pub status: Arc<MockStatus>,
    pub deployer: Arc<MockDeployer>,
    pub policy: SettlementPolicy,
}

impl Harness {
    pub fn new() -> Self {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        Self {
            keys: Arc::new(FixedKeys),
            precomputer: Arc::new(FixedAddress),
            wallet: Arc::new(MockWallet {
                log: log.clone(),
                failure: None,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                intents: Mutex::new(Vec::new()),
            }),
            status: Arc::new(MockStatus {
                log: log.clone(),
                scripted: Mutex::new(VecDeque::new()),
                fallback: TxStatus::Accepted,
                calls: AtomicUsize::new(0),
            }),
            deployer: Arc::new(MockDeployer {
                log: log.clone(),
                response: Ok(DeployOutcome {
                    contract_address: "0xccc".into(),
                    transaction_hash: "0xeee".into(),
                }),
                calls: AtomicUsize::new(0),
                commands: Mutex::new(Vec::new()),
            }),
            policy: SettlementPolicy::Poll {
                interval: Duration::from_millis(1),
                max_attempts: 5,
            },
            log,
        }
    }

    /// Real key generation and address derivation.
    pub fn with_real_crypto(mut self) -> Self {
        self.keys = Arc::new(starknet_provision_mcp::blockchain::services::StarkKeyGenerator::new());
        self.precomputer = Arc::new(StarkAddressPrecomputer::new());
        self
    }

    pub fn with_keys(mut self, keys: Arc<dyn KeyMaterialGenerator>) -> Self {
        self.keys = keys;
        self
    }

    pub fn wallet_fails(mut self, reason: &str) -> Self {
        self.wallet = Arc::new(MockWallet {
            log: self.log.clone(),
            failure: Some(reason.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            intents: Mutex::new(Vec::new()),
        });
        self
    }

    pub fn wallet_delay(mut self, delay: Duration) -> Self {
        self.wallet = Arc::new(MockWallet {
            log: self.log.clone(),
            failure: None,
            delay,
            calls: AtomicUsize::new(0),
            intents: Mutex::new(Vec::new()),
        });
        self
    }

    pub fn statuses(mut self, scripted: Vec<TxStatus>, fallback: TxStatus) -> Self {
        self.status = Arc::new(MockStatus {
            log: self.log.clone(),
            scripted: Mutex::new(scripted.into()),
            fallback,
            calls: AtomicUsize::new(0),
        });
        self
    }

    pub fn deploy_response(mut self, response: Result<DeployOutcome, ProvisioningError>) -> Self {
        self.deployer = Arc::new(MockDeployer {
            log: self.log.clone(),
            response,
            calls: AtomicUsize::new(0),
            commands: Mutex::new(Vec::new()),
        });
        self
    }

    pub fn policy(mut self, policy: SettlementPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn orchestrator(&self) -> ProvisioningOrchestrator {
        ProvisioningOrchestrator::new(
            self.keys.clone(),
            self.precomputer.clone(),
            self.wallet.clone(),
            FundingExecutor::new(Felt::from(TOKEN), WalletLocks::new(), Duration::from_secs(5)),
            DeploymentWaiter::new(self.status.clone()),
            self.deployer.clone(),
            self.policy,
        )
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            config: Config::default(),
            orchestrator: Arc::new(self.orchestrator()),
            precomputer: self.precomputer.clone(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn wallet_calls(&self) -> usize {
        self.wallet.calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status.calls.load(Ordering::SeqCst)
    }

    pub fn deploy_calls(&self) -> usize {
        self.deployer.calls.load(Ordering::SeqCst)
    }
}
