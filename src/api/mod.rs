//! # API Module
//!
//! HTTP handlers for the provisioning server.
//!
//! ## Available Endpoints
//!
//! - `GET /health` - Liveness check
//! - `POST /account/create` - Generate keys and the precomputed account address
//! - `POST /account/deploy` - Fund and deploy an account (fresh keys or supplied credentials)
//! - `POST /rpc` - JSON-RPC endpoint for MCP tool calls

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

pub mod account;
pub mod health;

/// Routes mounted under `/api`, without the JSON-RPC endpoint.
pub fn create_account_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/account/create", post(account::create_account_handler))
        .route("/account/deploy", post(account::deploy_account_handler))
}
