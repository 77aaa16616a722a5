// src/blockchain/models.rs
use std::fmt;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use starknet::core::types::Felt;

/// Canonical 0x-prefixed lowercase hex rendering used for every felt that
/// leaves the crate (logs, wire payloads, tool results).
pub fn to_hex(value: &Felt) -> String {
    format!("{:#x}", value)
}

/// Parses a 0x-prefixed hex felt, returning a readable message on failure.
pub fn parse_felt(input: &str) -> Result<Felt, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("value is empty".to_string());
    }
    Felt::from_hex(trimmed).map_err(|e| format!("'{}' is not a valid felt: {}", trimmed, e))
}

/// Contract addresses live below 2^251. Zero is never a deployable account.
pub fn is_valid_contract_address(address: &Felt) -> bool {
    *address != Felt::ZERO && address.to_bytes_be()[0] < 0x08
}

// --- Key Models ---

/// Freshly generated Stark key material. The private key only leaves this
/// struct through `expose_private_key`, and its `Debug` output is redacted.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public_key: Felt,
    private_key: SecretString,
}

impl KeyPair {
    pub fn new(public_key: Felt, private_key: &Felt) -> Self {
        Self {
            public_key,
            private_key: SecretString::new(to_hex(private_key)),
        }
    }

    pub fn expose_private_key(&self) -> &str {
        self.private_key.expose_secret()
    }

    pub fn private_scalar(&self) -> Result<Felt, String> {
        parse_felt(self.private_key.expose_secret())
    }
}

// --- Account Templates ---

/// Builds the ordered constructor calldata from the public key and any extra
/// per-kind arguments.
pub type ConstructorArgsBuilder = fn(Felt, &[Felt]) -> Vec<Felt>;

pub const OPENZEPPELIN_CLASS_HASH: &str =
    "0x061dac032f228abef9c6626f995015233097ae253a7f72d68552db02f2971b8f";
pub const ARGENT_CLASS_HASH: &str =
    "0x1a736d6ed154502257f02b1ccdf4d9d1089f80811cd6acad48e6b6a9d1f2003";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    OpenZeppelin,
    Argent,
}

impl AccountKind {
    /// Human readable wallet name, also used in the deploy command string.
    pub fn label(&self) -> &'static str {
        match self {
            AccountKind::OpenZeppelin => "OpenZeppelin",
            AccountKind::Argent => "Argent",
        }
    }

    pub fn template(&self) -> AccountTemplate {
        match self {
            AccountKind::OpenZeppelin => AccountTemplate {
                kind: *self,
                class_hash: OPENZEPPELIN_CLASS_HASH,
                constructor_args: openzeppelin_constructor_args,
            },
            AccountKind::Argent => AccountTemplate {
                kind: *self,
                class_hash: ARGENT_CLASS_HASH,
                constructor_args: argent_constructor_args,
            },
        }
    }
}

impl FromStr for AccountKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect();
        match normalized.as_str() {
            "openzeppelin" | "oz" => Ok(AccountKind::OpenZeppelin),
            "argent" | "argentx" | "ax" => Ok(AccountKind::Argent),
            _ => Err(format!(
                "Unsupported account type '{}'. Expected 'openzeppelin' or 'argent'",
                s
            )),
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn openzeppelin_constructor_args(public_key: Felt, _extra: &[Felt]) -> Vec<Felt> {
    vec![public_key]
}

// owner, guardian
fn argent_constructor_args(public_key: Felt, extra: &[Felt]) -> Vec<Felt> {
    vec![public_key, extra.first().copied().unwrap_or(Felt::ZERO)]
}

/// Class hash plus constructor shape of one account-contract kind.
#[derive(Debug, Clone, Copy)]
pub struct AccountTemplate {
    pub kind: AccountKind,
    pub class_hash: &'static str,
    pub constructor_args: ConstructorArgsBuilder,
}

/// Address an account will occupy once deployed, with the inputs it was
/// derived from.
#[derive(Debug, Clone)]
pub struct PrecomputedAddress {
    pub address: Felt,
    pub template: AccountTemplate,
    pub public_key: Felt,
}

/// Inputs of one orchestration run. Built once, never mutated after funding
/// starts.
#[derive(Debug, Clone)]
pub struct ProvisioningRequest {
    pub key_pair: KeyPair,
    pub precomputed_address: PrecomputedAddress,
    pub funding_amount: u128,
}

// --- Transaction Models ---

/// A single contract call handed to the funding wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionIntent {
    pub contract_address: Felt,
    pub entrypoint: String,
    pub calldata: Vec<Felt>,
}

impl TransactionIntent {
    /// ERC-20 `transfer(recipient, amount: u256)`; the amount fits in the low limb.
    pub fn erc20_transfer(token: Felt, recipient: Felt, amount: u128) -> Self {
        Self {
            contract_address: token,
            entrypoint: "transfer".to_string(),
            calldata: vec![recipient, Felt::from(amount), Felt::ZERO],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResult {
    pub transaction_hash: Felt,
}

/// The funding transfer was accepted by the wallet's node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingOutcome {
    pub tx_hash: Felt,
}

/// Network view of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// Not yet indexed, or received but not accepted yet.
    Pending,
    Accepted,
    Rejected(String),
}

// --- Deployment Models ---

#[derive(Debug, Clone)]
pub struct DeployPayload {
    pub kind: AccountKind,
    pub public_key: Felt,
    pub private_key: SecretString,
    pub precomputed_address: Felt,
}

impl DeployPayload {
    pub fn from_request(request: &ProvisioningRequest) -> Self {
        Self {
            kind: request.precomputed_address.template.kind,
            public_key: request.key_pair.public_key,
            private_key: SecretString::new(request.key_pair.expose_private_key().to_string()),
            precomputed_address: request.precomputed_address.address,
        }
    }

    /// Whitespace separated command understood by the deployment service.
    pub fn command(&self) -> String {
        format!(
            "Deploy {} Account {} {} {}",
            self.kind.label(),
            to_hex(&self.public_key),
            self.private_key.expose_secret(),
            to_hex(&self.precomputed_address)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployOutcome {
    pub contract_address: String,
    pub transaction_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_kind_aliases() {
        assert_eq!("OpenZeppelin".parse::<AccountKind>().unwrap(), AccountKind::OpenZeppelin);
        assert_eq!("open zeppelin".parse::<AccountKind>().unwrap(), AccountKind::OpenZeppelin);
        assert_eq!("oz".parse::<AccountKind>().unwrap(), AccountKind::OpenZeppelin);
        assert_eq!("ArgentX".parse::<AccountKind>().unwrap(), AccountKind::Argent);
        assert_eq!("argent_x".parse::<AccountKind>().unwrap(), AccountKind::Argent);
        assert!("braavos".parse::<AccountKind>().is_err());
    }

    #[test]
    fn constructor_shapes() {
        let pk = Felt::from_hex("0xabc").unwrap();
        let oz = AccountKind::OpenZeppelin.template();
        assert_eq!((oz.constructor_args)(pk, &[]), vec![pk]);

        let argent = AccountKind::Argent.template();
        assert_eq!((argent.constructor_args)(pk, &[]), vec![pk, Felt::ZERO]);
        let guardian = Felt::from_hex("0x123").unwrap();
        assert_eq!((argent.constructor_args)(pk, &[guardian]), vec![pk, guardian]);
    }

    #[test]
    fn key_pair_debug_hides_private_key() {
        let kp = KeyPair::new(Felt::from_hex("0xaaa").unwrap(), &Felt::from_hex("0xbbb").unwrap());
        let rendered = format!("{:?}", kp);
        assert!(!rendered.contains("0xbbb"));
        assert_eq!(kp.expose_private_key(), "0xbbb");
    }

    #[test]
    fn deploy_command_format() {
        let payload = DeployPayload {
            kind: AccountKind::Argent,
            public_key: Felt::from_hex("0xaaa").unwrap(),
            private_key: SecretString::new("0xbbb".to_string()),
            precomputed_address: Felt::from_hex("0xccc").unwrap(),
        };
        assert_eq!(payload.command(), "Deploy Argent Account 0xaaa 0xbbb 0xccc");
    }

    #[test]
    fn erc20_transfer_calldata() {
        let token = Felt::from_hex("0x1").unwrap();
        let to = Felt::from_hex("0x2").unwrap();
        let intent = TransactionIntent::erc20_transfer(token, to, 500);
        assert_eq!(intent.entrypoint, "transfer");
        assert_eq!(intent.calldata, vec![to, Felt::from(500u128), Felt::ZERO]);
    }

    #[test]
    fn contract_address_bounds() {
        assert!(!is_valid_contract_address(&Felt::ZERO));
        assert!(is_valid_contract_address(&Felt::from_hex("0xccc").unwrap()));
        let too_big = Felt::from_hex(
            "0x0800000000000000000000000000000000000000000000000000000000000000",
        )
        .unwrap();
        assert!(!is_valid_contract_address(&too_big));
    }

    #[test]
    fn parse_felt_rejects_garbage() {
        assert!(parse_felt("").is_err());
        assert!(parse_felt("0xzz").is_err());
        assert_eq!(parse_felt(" 0x10 ").unwrap(), Felt::from(16u64));
    }
}
