// src/blockchain/mod.rs

pub mod client;
pub use client::StarknetRpcClient;

pub mod models;
pub mod services;
pub mod wallet;
pub mod wallet_locks;

pub use starknet::core::types::Felt;
