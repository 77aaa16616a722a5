// src/blockchain/services/address.rs

use starknet::core::{types::Felt, utils::get_contract_address};

use crate::blockchain::models::{parse_felt, AccountTemplate, PrecomputedAddress};
use crate::provisioning::error::ProvisioningError;

/// Deployer address used by self-deploying accounts.
pub const CANONICAL_DEPLOYER: Felt = Felt::ZERO;

/// Computes where an account will land before it exists on chain.
pub trait AddressPrecomputer: Send + Sync {
    fn precompute(
        &self,
        public_key: Felt,
        template: &AccountTemplate,
        extra_constructor_args: &[Felt],
    ) -> Result<PrecomputedAddress, ProvisioningError>;
}

/// Starknet address derivation: pedersen chain over
/// (prefix, deployer, salt, class hash, calldata hash), with the public key as
/// salt and the zero deployer. Pure, no network access.
#[derive(Debug, Clone, Default)]
pub struct StarkAddressPrecomputer;

impl StarkAddressPrecomputer {
    pub fn new() -> Self {
        Self
    }
}

impl AddressPrecomputer for StarkAddressPrecomputer {
    fn precompute(
        &self,
        public_key: Felt,
        template: &AccountTemplate,
        extra_constructor_args: &[Felt],
    ) -> Result<PrecomputedAddress, ProvisioningError> {
        let class_hash = parse_felt(template.class_hash)
            .map_err(|e| ProvisioningError::InvalidTemplate(format!("class hash {}", e)))?;
        if class_hash == Felt::ZERO {
            return Err(ProvisioningError::InvalidTemplate(
                "class hash must not be zero".to_string(),
            ));
        }

        let calldata = (template.constructor_args)(public_key, extra_constructor_args);
        let address = get_contract_address(public_key, class_hash, &calldata, CANONICAL_DEPLOYER);

        Ok(PrecomputedAddress {
            address,
            template: *template,
            public_key,
        })
    }
}
