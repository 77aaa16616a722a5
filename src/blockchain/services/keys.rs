// src/blockchain/services/keys.rs

use rand::{rngs::OsRng, RngCore};
use starknet::{core::types::Felt, signers::SigningKey};
use tracing::debug;
use zeroize::Zeroizing;

use crate::blockchain::models::{to_hex, KeyPair};
use crate::provisioning::error::ProvisioningError;

/// Order of the STARK curve generator, big-endian.
const CURVE_ORDER: [u8; 32] = [
    0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xb7, 0x81, 0x12, 0x6d, 0xca, 0xe7, 0xb2, 0x32, 0x1e, 0x66, 0xa2, 0x41, 0xad, 0xc6, 0x4d, 0x2f,
];

/// A private scalar must lie in `[1, n)`; anything else has no public point.
pub fn is_valid_private_key(private_key: &Felt) -> bool {
    *private_key != Felt::ZERO && private_key.to_bytes_be() < CURVE_ORDER
}

/// Source of fresh account key material.
pub trait KeyMaterialGenerator: Send + Sync {
    fn generate(&self) -> Result<KeyPair, ProvisioningError>;
}

/// Draws Stark private keys from the operating system CSPRNG.
#[derive(Debug, Clone, Default)]
pub struct StarkKeyGenerator;

impl StarkKeyGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Derives the Stark public key for a private scalar, or `None` when the
    /// scalar is not a usable key (zero, or not below the curve order).
    pub fn public_key_for(private_key: &Felt) -> Option<Felt> {
        if !is_valid_private_key(private_key) {
            return None;
        }
        Some(
            SigningKey::from_secret_scalar(*private_key)
                .verifying_key()
                .scalar(),
        )
    }
}

impl KeyMaterialGenerator for StarkKeyGenerator {
    fn generate(&self) -> Result<KeyPair, ProvisioningError> {
        let mut bytes = Zeroizing::new([0u8; 32]);
        loop {
            OsRng
                .try_fill_bytes(&mut bytes[..])
                .map_err(|e| ProvisioningError::FatalEntropyError(e.to_string()))?;
            // Clear the top five bits so the scalar stays below 2^251 and
            // therefore below the curve order.
            bytes[0] &= 0x07;
            let private_key = Felt::from_bytes_be(&bytes);
            // Only zero is rejected at this width; draw again.
            if let Some(public_key) = Self::public_key_for(&private_key) {
                debug!("Generated key pair with public key {}", to_hex(&public_key));
                return Ok(KeyPair::new(public_key, &private_key));
            }
        }
    }
}
