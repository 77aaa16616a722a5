//! Provisioning orchestrator.
//!
//! Drives one run through
//! `Init -> KeysGenerated -> AddressPrecomputed -> Funding -> Funded ->
//! AwaitingSettlement -> Deploying -> Done`, strictly in that order. Any step
//! failing ends the run with a `Failure` naming the stage; nothing is retried
//! across stage boundaries.
//!
//! An address is funded at most once per process. Keys whose run got as far
//! as `Funding` can only go through `redeploy`, which skips straight to
//! `Deploying` without touching the wallet.

use std::sync::Arc;

use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use starknet::core::types::Felt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::blockchain::{
    models::{
        parse_felt, to_hex, AccountKind, DeployPayload, KeyPair, PrecomputedAddress,
        ProvisioningRequest,
    },
    services::{
        keys::{is_valid_private_key, StarkKeyGenerator},
        AddressPrecomputer, DeploymentService, DeploymentWaiter,
        FundingExecutor, KeyMaterialGenerator, SettlementPolicy,
    },
    wallet::WalletClient,
};
use crate::provisioning::{
    error::{ProvisioningError, Stage},
    result::{ProvisioningReport, ProvisioningResult},
    state::{Outcome, ProvisioningState, StateMachine},
};

/// Credentials an agent obtained from `create_account` and hands back for
/// deployment. Raw strings: they are validated before anything happens.
#[derive(Debug, Clone, Default)]
pub struct SuppliedCredentials {
    pub public_key: String,
    pub private_key: String,
    pub precomputed_address: String,
}

pub struct ProvisioningOrchestrator {
    keys: Arc<dyn KeyMaterialGenerator>,
    precomputer: Arc<dyn AddressPrecomputer>,
    wallet: Arc<dyn WalletClient>,
    funding: FundingExecutor,
    waiter: DeploymentWaiter,
    deployer: Arc<dyn DeploymentService>,
    policy: SettlementPolicy,
    // Precomputed addresses currently owned by a run.
    in_flight: Arc<DashMap<Felt, Uuid>>,
    // Addresses a run started funding, with the run that did it.
    funded: DashMap<Felt, Uuid>,
}

impl ProvisioningOrchestrator {
    pub fn new(
        keys: Arc<dyn KeyMaterialGenerator>,
        precomputer: Arc<dyn AddressPrecomputer>,
        wallet: Arc<dyn WalletClient>,
        funding: FundingExecutor,
        waiter: DeploymentWaiter,
        deployer: Arc<dyn DeploymentService>,
        policy: SettlementPolicy,
    ) -> Self {
        Self {
            keys,
            precomputer,
            wallet,
            funding,
            waiter,
            deployer,
            policy,
            in_flight: Arc::new(DashMap::new()),
            funded: DashMap::new(),
        }
    }

    pub fn policy(&self) -> SettlementPolicy {
        self.policy
    }

    /// Generates key material and the matching future address without
    /// touching the network.
    pub fn create_account(
        &self,
        kind: AccountKind,
        extra_constructor_args: &[Felt],
    ) -> Result<(KeyPair, PrecomputedAddress), ProvisioningError> {
        let key_pair = self.keys.generate()?;
        let address =
            self.precomputer
                .precompute(key_pair.public_key, &kind.template(), extra_constructor_args)?;
        Ok((key_pair, address))
    }

    /// Full pipeline from fresh keys.
    pub async fn provision(
        &self,
        kind: AccountKind,
        extra_constructor_args: &[Felt],
        funding_amount: u128,
        cancel: &CancellationToken,
    ) -> ProvisioningReport {
        let mut run = Run::new();
        let span = info_span!("provisioning", run_id = %run.id, kind = %kind);

        async {
            info!("Starting provisioning run");

            let key_pair = match self.keys.generate() {
                Ok(kp) => kp,
                Err(e) => return run.fail(Stage::Setup, e),
            };
            run.enter(ProvisioningState::KeysGenerated);

            let precomputed = match self.precomputer.precompute(
                key_pair.public_key,
                &kind.template(),
                extra_constructor_args,
            ) {
                Ok(p) => p,
                Err(e) => return run.fail(Stage::Setup, e),
            };
            run.enter(ProvisioningState::AddressPrecomputed);
            info!("Precomputed account address {}", to_hex(&precomputed.address));

            let request = ProvisioningRequest {
                key_pair,
                precomputed_address: precomputed,
                funding_amount,
            };
            self.execute(run, request, cancel).await
        }
        .instrument(span)
        .await
    }

    /// Pipeline for credentials produced earlier by `create_account`.
    pub async fn resume(
        &self,
        kind: AccountKind,
        credentials: &SuppliedCredentials,
        extra_constructor_args: &[Felt],
        funding_amount: u128,
        cancel: &CancellationToken,
    ) -> ProvisioningReport {
        let mut run = Run::new();
        let span = info_span!("provisioning", run_id = %run.id, kind = %kind, resumed = true);

        async {
            info!("Resuming provisioning run with supplied credentials");
            let request = match self.validate_credentials(
                kind,
                credentials,
                extra_constructor_args,
                funding_amount,
            ) {
                Ok(r) => r,
                Err(e) => return run.fail(Stage::Setup, e),
            };
            run.enter(ProvisioningState::AddressPrecomputed);
            self.execute(run, request, cancel).await
        }
        .instrument(span)
        .await
    }

    /// Resubmits the deployment for an address an earlier run already funded.
    /// The wallet is never called.
    pub async fn redeploy(
        &self,
        kind: AccountKind,
        credentials: &SuppliedCredentials,
        extra_constructor_args: &[Felt],
    ) -> ProvisioningReport {
        let mut run = Run::new();
        let span = info_span!("provisioning", run_id = %run.id, kind = %kind, redeploy = true);

        async {
            info!("Retrying deployment for supplied credentials");
            let request =
                match self.validate_credentials(kind, credentials, extra_constructor_args, 0) {
                    Ok(r) => r,
                    Err(e) => return run.fail(Stage::Setup, e),
                };
            run.enter(ProvisioningState::AddressPrecomputed);

            let address = request.precomputed_address.address;
            let _claim = match self.claim(address, run.id) {
                Ok(claim) => claim,
                Err(e) => return run.fail(Stage::Setup, e),
            };
            match self.funded.get(&address) {
                Some(funded_by) => {
                    info!("Address {} was funded by run {}", to_hex(&address), *funded_by)
                }
                None => {
                    let error = ProvisioningError::NotFunded(to_hex(&address));
                    return run.fail(Stage::Setup, error);
                }
            }

            self.deploy(run, &request).await
        }
        .instrument(span)
        .await
    }

    /// Checks supplied credentials are complete and belong together before any
    /// value moves.
    pub fn validate_credentials(
        &self,
        kind: AccountKind,
        credentials: &SuppliedCredentials,
        extra_constructor_args: &[Felt],
        funding_amount: u128,
    ) -> Result<ProvisioningRequest, ProvisioningError> {
        let field = |name: &str, value: &str| {
            if value.trim().is_empty() {
                return Err(ProvisioningError::InvalidCredentials(format!("missing {}", name)));
            }
            parse_felt(value)
                .map_err(|e| ProvisioningError::InvalidCredentials(format!("{}: {}", name, e)))
        };

        let public_key = field("public key", &credentials.public_key)?;
        let private_key = field("private key", &credentials.private_key)?;
        let address = field("precomputed address", &credentials.precomputed_address)?;

        if !is_valid_private_key(&private_key) {
            return Err(ProvisioningError::InvalidCredentials(
                "private key is not in the range of the curve order".to_string(),
            ));
        }
        if StarkKeyGenerator::public_key_for(&private_key) != Some(public_key) {
            return Err(ProvisioningError::InvalidCredentials(
                "public key does not belong to the private key".to_string(),
            ));
        }

        let precomputed =
            self.precomputer
                .precompute(public_key, &kind.template(), extra_constructor_args)?;
        if precomputed.address != address {
            return Err(ProvisioningError::InvalidCredentials(format!(
                "address {} is not the {} account address for this key (expected {})",
                to_hex(&address),
                kind,
                to_hex(&precomputed.address)
            )));
        }

        Ok(ProvisioningRequest {
            key_pair: KeyPair::new(public_key, &private_key),
            precomputed_address: precomputed,
            funding_amount,
        })
    }

    /// Funding through deployment. Owns the precomputed address for its whole
    /// duration.
    async fn execute(
        &self,
        mut run: Run,
        request: ProvisioningRequest,
        cancel: &CancellationToken,
    ) -> ProvisioningReport {
        let address = request.precomputed_address.address;
        let _claim = match self.claim(address, run.id) {
            Ok(claim) => claim,
            Err(e) => return run.fail(Stage::Setup, e),
        };
        if let Some(funded_by) = self.funded.get(&address) {
            warn!("Address {} was already funded by run {}", to_hex(&address), *funded_by);
            return run.fail(Stage::Setup, ProvisioningError::AlreadyFunded(to_hex(&address)));
        }

        // Recorded before the transfer: a failed or unanswered call may still
        // have moved funds.
        self.funded.insert(address, run.id);
        run.enter(ProvisioningState::Funding);
        let funded = match self
            .funding
            .fund(self.wallet.as_ref(), &address, request.funding_amount)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => return run.fail(Stage::Funding, e),
        };
        run.enter(ProvisioningState::Funded);

        run.enter(ProvisioningState::AwaitingSettlement);
        if let Err(e) = self
            .waiter
            .await_settlement(&funded.tx_hash, &self.policy, cancel)
            .await
        {
            return run.fail(Stage::Waiting, e);
        }

        self.deploy(run, &request).await
    }

    async fn deploy(&self, mut run: Run, request: &ProvisioningRequest) -> ProvisioningReport {
        let address = request.precomputed_address.address;
        run.enter(ProvisioningState::Deploying);
        let payload = DeployPayload::from_request(request);
        let deployed = match self.deployer.request_deploy(&payload).await {
            Ok(outcome) => outcome,
            Err(e) => return run.fail(Stage::Deployment, e),
        };

        if parse_felt(&deployed.contract_address).ok() != Some(address) {
            warn!(
                "Deployment service reported address {} for precomputed {}",
                deployed.contract_address,
                to_hex(&address)
            );
        }
        info!(
            "Account deployed at {} (tx {})",
            deployed.contract_address, deployed.transaction_hash
        );

        run.succeed(ProvisioningResult::Success {
            contract_address: deployed.contract_address,
            transaction_hash: deployed.transaction_hash,
            credentials: (&request.key_pair).into(),
        })
    }

    fn claim(&self, address: Felt, run_id: Uuid) -> Result<AddressClaim, ProvisioningError> {
        match self.in_flight.entry(address) {
            Entry::Occupied(_) => Err(ProvisioningError::AddressInUse(to_hex(&address))),
            Entry::Vacant(slot) => {
                slot.insert(run_id);
                Ok(AddressClaim {
                    address,
                    in_flight: self.in_flight.clone(),
                })
            }
        }
    }
}

/// Releases a precomputed address when its run ends.
struct AddressClaim {
    address: Felt,
    in_flight: Arc<DashMap<Felt, Uuid>>,
}

impl Drop for AddressClaim {
    fn drop(&mut self) {
        self.in_flight.remove(&self.address);
    }
}

struct Run {
    id: Uuid,
    machine: StateMachine,
}

impl Run {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            machine: StateMachine::new(),
        }
    }

    fn enter(&mut self, state: ProvisioningState) {
        if let Err(e) = self.machine.advance(state) {
            error!("{}", e);
        }
    }

    fn fail(self, stage: Stage, error: ProvisioningError) -> ProvisioningReport {
        warn!(stage = %stage, kind = error.kind(), "Provisioning failed: {}", error);
        self.finish(Outcome::Failure, ProvisioningResult::failure(stage, error))
    }

    fn succeed(self, result: ProvisioningResult) -> ProvisioningReport {
        self.finish(Outcome::Success, result)
    }

    fn finish(mut self, outcome: Outcome, result: ProvisioningResult) -> ProvisioningReport {
        if let Err(e) = self.machine.finish(outcome) {
            error!("{}", e);
        }
        ProvisioningReport {
            run_id: self.id,
            result,
            states: self.machine.history().to_vec(),
            finished_at: Utc::now(),
        }
    }
}
