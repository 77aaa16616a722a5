// src/config.rs

use std::env;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use secrecy::SecretString;
use starknet::core::types::Felt;
use url::{Host, Url};

use crate::blockchain::{models::parse_felt, services::SettlementPolicy};

/// STRK fee token, same address on mainnet and Sepolia.
pub const STRK_TOKEN_ADDRESS: &str =
    "0x04718f5a0fc34cc1af16a1cdee98ffb20c31f5cd61d6ab07201858f4287c938d";

// A struct to hold all configuration, loaded once at startup from the .env file.
#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub port: u16,

    // Starknet node and funding wallet
    pub rpc_url: Url,
    pub account_address: Option<Felt>,
    pub account_private_key: Option<SecretString>,

    // Deployment service
    pub deploy_api_url: Url,
    pub deploy_api_key: SecretString,

    // Funding
    pub funding_token_address: Felt,
    pub funding_amount: u128,

    // Settlement and timeouts
    pub settlement_policy: SettlementPolicy,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            rpc_url: Url::parse("http://127.0.0.1:5050/rpc").expect("static url"),
            account_address: None,
            account_private_key: None,
            deploy_api_url: Url::parse("http://127.0.0.1:3000").expect("static url"),
            deploy_api_key: SecretString::new(String::new()),
            funding_token_address: Felt::from_hex(STRK_TOKEN_ADDRESS).expect("static felt"),
            funding_amount: 1_000_000_000_000_000,
            settlement_policy: SettlementPolicy::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load variables from the .env file into the environment
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let rpc_url = get("STARKNET_RPC_URL")
            .context("STARKNET_RPC_URL must be set to a Starknet JSON-RPC endpoint")?;
        let rpc_url = Url::parse(&rpc_url).context("STARKNET_RPC_URL must be a valid URL")?;

        let account_address = get("STARKNET_ACCOUNT_ADDRESS")
            .map(|v| parse_felt(&v).map_err(|e| anyhow!("STARKNET_ACCOUNT_ADDRESS: {}", e)))
            .transpose()?;
        let account_private_key = get("STARKNET_PRIVATE_KEY").map(SecretString::new);

        let deploy_api_url = match get("DEPLOY_API_URL") {
            Some(v) => Url::parse(&v).context("DEPLOY_API_URL must be a valid URL")?,
            None => defaults.deploy_api_url,
        };
        ensure_confidential_transport(&deploy_api_url)?;

        let funding_token_address = match get("FUNDING_TOKEN_ADDRESS") {
            Some(v) => parse_felt(&v).map_err(|e| anyhow!("FUNDING_TOKEN_ADDRESS: {}", e))?,
            None => defaults.funding_token_address,
        };

        let funding_amount = parse_or(&get, "FUNDING_AMOUNT", defaults.funding_amount)?;
        if funding_amount == 0 {
            bail!("FUNDING_AMOUNT must be positive");
        }

        let settlement_policy = match get("SETTLEMENT_POLICY")
            .unwrap_or_else(|| "poll".to_string())
            .to_lowercase()
            .as_str()
        {
            "poll" => SettlementPolicy::Poll {
                interval: Duration::from_millis(parse_or(&get, "SETTLEMENT_POLL_INTERVAL_MS", 3_000u64)?),
                max_attempts: parse_or(&get, "SETTLEMENT_MAX_ATTEMPTS", 40u32)?,
            },
            "fixed" => SettlementPolicy::FixedDelay(Duration::from_secs(parse_or(
                &get,
                "SETTLEMENT_FIXED_DELAY_SECS",
                20u64,
            )?)),
            other => bail!("SETTLEMENT_POLICY must be 'poll' or 'fixed', got '{}'", other),
        };

        Ok(Config {
            port: parse_or(&get, "PORT", defaults.port)?,
            rpc_url,
            account_address,
            account_private_key,
            deploy_api_url,
            deploy_api_key: SecretString::new(get("DEPLOY_API_KEY").unwrap_or_default()),
            funding_token_address,
            funding_amount,
            settlement_policy,
            request_timeout: Duration::from_secs(parse_or(&get, "REQUEST_TIMEOUT_SECS", 30u64)?),
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| anyhow!("{} must be a valid number", key)),
        None => Ok(default),
    }
}

/// Deploy requests carry the new account's private key, so anything but a
/// loopback endpoint must use TLS.
fn ensure_confidential_transport(url: &Url) -> Result<()> {
    if url.scheme() == "https" {
        return Ok(());
    }
    let loopback = match url.host() {
        Some(Host::Domain(d)) => d.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    };
    if !loopback {
        bail!(
            "DEPLOY_API_URL must use https for non-local hosts (got {})",
            url
        );
    }
    Ok(())
}
