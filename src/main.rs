// src/main.rs

use anyhow::{anyhow, Context, Result};
use axum::{extract::State, routing::post, Json, Router};
use secrecy::ExposeSecret;
use starknet_provision_mcp::{
    api,
    blockchain::{
        models::parse_felt,
        services::{
            DeploymentWaiter, FundingExecutor, HttpDeploymentRequester, StarkAddressPrecomputer,
            StarkKeyGenerator,
        },
        wallet::AccountWalletClient,
        wallet_locks::WalletLocks,
        StarknetRpcClient,
    },
    config::Config,
    mcp::{
        handler::handle_mcp_request,
        protocol::{error_codes, Request, Response},
    },
    provisioning::ProvisioningOrchestrator,
    AppState,
};
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// --- HTTP Server Logic ---
async fn run_http_server(state: AppState) -> Result<()> {
    let api_router = api::create_account_router()
        // JSON-RPC endpoint for MCP tool calls
        .route("/rpc", post(rpc_handler));

    // Create the main app with the API router under /api
    let app = Router::new()
        .nest("/api", api_router)
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([127, 0, 0, 1], state.config.port));
    info!("🚀 HTTP Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let shutdown = state.shutdown.clone();
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server error")
}

// Forward JSON-RPC requests over HTTP to the MCP handler
async fn rpc_handler(State(state): State<AppState>, Json(req): Json<Request>) -> Json<Response> {
    match handle_mcp_request(req, state).await {
        Some(resp) => Json(resp),
        None => Json(Response::error(
            serde_json::Value::Null,
            error_codes::INVALID_REQUEST,
            "Notifications are not supported over HTTP".into(),
        )),
    }
}

// --- MCP Server Logic ---
async fn run_mcp_server(state: AppState) {
    info!("🚀 Starting MCP server on stdin/stdout...");

    let mut stdin = io::BufReader::new(io::stdin());
    let mut stdout = io::stdout();

    loop {
        let mut line = String::new();

        let read = tokio::select! {
            read = stdin.read_line(&mut line) => read,
            _ = state.shutdown.cancelled() => break,
        };

        match read {
            Ok(0) => {
                info!("EOF received, shutting down MCP server");
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                // Requests may carry private keys, so only the size is logged
                debug!("Received {} bytes", line.len());

                let response = match serde_json::from_str::<Request>(line) {
                    Ok(request) => handle_mcp_request(request, state.clone()).await,
                    Err(parse_error) => {
                        error!("JSON parse error: {}", parse_error);
                        Some(Response::error(
                            serde_json::Value::Null,
                            error_codes::PARSE_ERROR,
                            format!("Parse error: {}", parse_error),
                        ))
                    }
                };

                if let Some(response) = response {
                    if let Ok(response_json) = serde_json::to_string(&response) {
                        if let Err(e) = stdout
                            .write_all(format!("{}\n", response_json).as_bytes())
                            .await
                        {
                            error!("Failed to write response: {}", e);
                            break;
                        }
                        if let Err(e) = stdout.flush().await {
                            error!("Failed to flush response: {}", e);
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                error!("Failed to read from stdin: {}", e);
                break;
            }
        }
    }

    info!("MCP server shutting down");
}

async fn build_state(config: Config) -> Result<AppState> {
    let account_address = config
        .account_address
        .ok_or_else(|| anyhow!("STARKNET_ACCOUNT_ADDRESS must be set to the funding account"))?;
    let private_key = config
        .account_private_key
        .as_ref()
        .ok_or_else(|| anyhow!("STARKNET_PRIVATE_KEY must be set for the funding account"))?;
    let private_key = parse_felt(private_key.expose_secret())
        .map_err(|e| anyhow!("STARKNET_PRIVATE_KEY: {}", e))?;

    let wallet = AccountWalletClient::connect(&config.rpc_url, account_address, private_key).await?;
    let rpc = StarknetRpcClient::new(config.rpc_url.clone(), config.request_timeout)?;
    let deployer = HttpDeploymentRequester::new(
        config.deploy_api_url.clone(),
        config.deploy_api_key.clone(),
        config.request_timeout,
    )?;

    let precomputer = Arc::new(StarkAddressPrecomputer::new());
    let funding = FundingExecutor::new(
        config.funding_token_address,
        WalletLocks::new(),
        config.request_timeout,
    );

    let orchestrator = ProvisioningOrchestrator::new(
        Arc::new(StarkKeyGenerator::new()),
        precomputer.clone(),
        Arc::new(wallet),
        funding,
        DeploymentWaiter::new(Arc::new(rpc)),
        Arc::new(deployer),
        config.settlement_policy,
    );

    info!(
        "Provisioning ready: deploy service {}, settlement {:?}",
        config.deploy_api_url, config.settlement_policy
    );

    Ok(AppState {
        config,
        orchestrator: Arc::new(orchestrator),
        precomputer,
        shutdown: CancellationToken::new(),
    })
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "starknet_provision_mcp=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("❌ Failed to load configuration: {:#}", e);
            return;
        }
    };

    let app_state = match build_state(config).await {
        Ok(state) => state,
        Err(e) => {
            error!("❌ Failed to initialize provisioning services: {:#}", e);
            return;
        }
    };

    // In-flight runs observe this through their child tokens
    let shutdown = app_state.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    // Check if running in MCP mode (stdin/stdout) or HTTP server mode
    let args: Vec<String> = env::args().collect();
    if args.contains(&"--mcp".to_string()) || env::var("MCP_MODE").is_ok() {
        run_mcp_server(app_state).await;
    } else if let Err(e) = run_http_server(app_state).await {
        error!("❌ {:#}", e);
    }
}
