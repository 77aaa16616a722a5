//! # MCP Handler Module
//!
//! This module implements the Model Context Protocol (MCP) for the Starknet
//! provisioning server. It handles incoming MCP requests and dispatches them
//! to the account tools.
//!
//! ## Supported Tools
//!
//! - `create_account` - Generate keys and the precomputed address of a new account
//! - `deploy_account` - Fund and deploy an account, optionally from `create_account` output
//! - `precompute_account_address` - Derive the address an account would deploy to

use crate::{
    api::account::{self, CreateAccountRequest, DeployAccountRequest, ToolError},
    blockchain::models::{parse_felt, to_hex, AccountKind},
    mcp::protocol::{error_codes, Request, Response},
    utils, AppState,
};
use serde_json::{json, Value};
use tracing::{error, info};

// Helper: produce a result Value that always contains a text content array
// and preserves structured data for JSON-friendly clients.
fn make_texty_result(text: String, payload: Value) -> Value {
    let content = json!([{ "type": "text", "text": text }]);
    match payload {
        Value::Object(mut map) => {
            // Do not overwrite if caller already set content
            if !map.contains_key("content") {
                map.insert("content".into(), content);
            }
            Value::Object(map)
        }
        other => json!({
            "data": other,
            "content": content
        }),
    }
}

fn tool_error(req_id: &Value, err: ToolError) -> Response {
    Response::error(req_id.clone(), err.rpc_code(), err.to_string())
}

/// This is the main dispatcher for all incoming MCP requests.
pub async fn handle_mcp_request(req: Request, state: AppState) -> Option<Response> {
    info!("Handling MCP request for method: {}", req.method);

    if req.is_notification() {
        return None;
    }

    let response = match req.method.as_str() {
        "initialize" => handle_initialize(&req),
        "tools/list" => handle_tools_list(&req),
        "tools/call" => handle_tool_call(req, state).await,
        // Direct method calls are rewritten into tools/call
        "create_account" | "deploy_account" | "precompute_account_address" => {
            let name = req.method.clone();
            let wrapped = Request {
                jsonrpc: req.jsonrpc.clone(),
                id: req.id.clone(),
                method: "tools/call".to_string(),
                params: Some(json!({
                    "name": name,
                    "arguments": req.params.clone().unwrap_or_else(|| json!({}))
                })),
            };
            handle_tool_call(wrapped, state).await
        }
        _ => Response::error(
            req.id,
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", req.method),
        ),
    };

    Some(response)
}

/// Handles a 'tools/call' request by dispatching it to the correct tool logic.
async fn handle_tool_call(req: Request, state: AppState) -> Response {
    let params = match req.params.as_ref() {
        Some(p) => p,
        None => {
            return Response::error(
                req.id,
                error_codes::INVALID_PARAMS,
                "Missing 'params' object".into(),
            )
        }
    };

    let tool_name = match params.get("name").and_then(|n| n.as_str()) {
        Some(name) => name,
        None => {
            return Response::error(
                req.id,
                error_codes::INVALID_PARAMS,
                "Missing 'name' field in params".into(),
            )
        }
    };

    let empty_args = json!({});
    let args = params.get("arguments").unwrap_or(&empty_args);
    let req_id = &req.id;

    match tool_name {
        "create_account" => {
            let res: Result<Response, Response> = (async {
                let input = CreateAccountRequest {
                    account_type: utils::get_required_arg(args, "account_type", req_id)?,
                    guardian: utils::get_optional_str(args, "guardian"),
                };
                let payload =
                    account::create_account(&state, &input).map_err(|e| tool_error(req_id, e))?;
                let summary = format!(
                    "Created {} account. Public key {}, private key {}, precalculated address {}. \
                     Pass these to deploy_account to fund and deploy it.",
                    payload["wallet"].as_str().unwrap_or_default(),
                    payload["new_account_publickey"].as_str().unwrap_or_default(),
                    payload["new_account_privatekey"].as_str().unwrap_or_default(),
                    payload["precalculate_address"].as_str().unwrap_or_default(),
                );
                Ok(Response::success(
                    req_id.clone(),
                    make_texty_result(summary, payload),
                ))
            })
            .await;
            res.unwrap_or_else(|err_resp| err_resp)
        }
        "deploy_account" => {
            let res: Result<Response, Response> = (async {
                let input = DeployAccountRequest {
                    account_type: utils::get_required_arg(args, "account_type", req_id)?,
                    public_key: utils::get_optional_str(args, "public_key"),
                    private_key: utils::get_optional_str(args, "private_key"),
                    precalculate_address: utils::get_optional_str(args, "precalculate_address"),
                    guardian: utils::get_optional_str(args, "guardian"),
                    funding_amount: utils::get_optional_str(args, "funding_amount"),
                    retry_deployment: args
                        .get("retry_deployment")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                };
                let report = account::deploy_account(&state, &input)
                    .await
                    .map_err(|e| tool_error(req_id, e))?;

                let mut payload = report.to_json();
                if !report.result.is_success() {
                    payload["isError"] = json!(true);
                }
                Ok(Response::success(
                    req_id.clone(),
                    make_texty_result(report.result.to_string(), payload),
                ))
            })
            .await;
            res.unwrap_or_else(|err_resp| err_resp)
        }
        "precompute_account_address" => {
            let res: Result<Response, Response> = (async {
                let account_type: String = utils::get_required_arg(args, "account_type", req_id)?;
                let public_key: String = utils::get_required_arg(args, "public_key", req_id)?;
                let invalid = |msg: String| {
                    Response::error(req_id.clone(), error_codes::INVALID_PARAMS, msg)
                };

                let kind: AccountKind = account_type.parse().map_err(invalid)?;
                let public_key =
                    parse_felt(&public_key).map_err(|e| invalid(format!("public_key: {}", e)))?;
                let extra = match utils::get_optional_str(args, "guardian") {
                    Some(g) => {
                        vec![parse_felt(&g).map_err(|e| invalid(format!("guardian: {}", e)))?]
                    }
                    None => Vec::new(),
                };

                let precomputed = state
                    .precomputer
                    .precompute(public_key, &kind.template(), &extra)
                    .map_err(|e| {
                        error!("Address precomputation failed: {}", e);
                        Response::error(req_id.clone(), error_codes::INTERNAL_ERROR, e.to_string())
                    })?;

                let address = to_hex(&precomputed.address);
                Ok(Response::success(
                    req_id.clone(),
                    make_texty_result(
                        format!("The {} account for this key deploys to {}", kind, address),
                        json!({
                            "wallet": kind.label(),
                            "class_hash": precomputed.template.class_hash,
                            "precalculate_address": address,
                        }),
                    ),
                ))
            })
            .await;
            res.unwrap_or_else(|err_resp| err_resp)
        }
        _ => Response::error(
            req_id.clone(),
            error_codes::METHOD_NOT_FOUND,
            format!("Tool not found: {}", tool_name),
        ),
    }
}

/// Handles the 'initialize' request.
fn handle_initialize(req: &Request) -> Response {
    let server_info = json!({
        "name": "starknet_provision_mcp",
        "version": env!("CARGO_PKG_VERSION")
    });
    let capabilities = json!({ "tools": { "listChanged": false } });
    let instructions =
        "Starknet account provisioning server. Creates OpenZeppelin and Argent accounts, funds them from the server wallet and deploys them.";

    Response::success(
        req.id.clone(),
        json!({
            "serverInfo": server_info,
            "protocolVersion": "2025-06-18",
            "capabilities": capabilities,
            "instructions": instructions
        }),
    )
}

/// Handles the 'tools/list' request by returning a JSON definition of all available tools.
fn handle_tools_list(req: &Request) -> Response {
    let tools = json!([
        {
            "name": "create_account",
            "description": "Generate a new Starknet account key pair and its precalculated address. Nothing is sent on chain; call deploy_account with the returned values to deploy it.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "account_type": {"type": "string", "description": "'openzeppelin' or 'argent'"},
                    "guardian": {"type": "string", "description": "Argent guardian public key (optional, defaults to none)"}
                },
                "required": ["account_type"],
                "additionalProperties": false
            }
        },
        {
            "name": "deploy_account",
            "description": "Fund a Starknet account address from the server wallet, wait for the transfer to settle, then deploy the account. Without credentials a fresh key pair is generated. An address is only ever funded once; if deployment failed after funding, call again with the same credentials and retry_deployment set to true.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "account_type": {"type": "string", "description": "'openzeppelin' or 'argent'"},
                    "public_key": {"type": "string", "description": "Public key returned by create_account"},
                    "private_key": {"type": "string", "description": "Private key returned by create_account"},
                    "precalculate_address": {"type": "string", "description": "Address returned by create_account"},
                    "funding_amount": {"type": "string", "description": "Amount in token base units (optional, server default otherwise)"},
                    "retry_deployment": {"type": "boolean", "description": "Only resubmit the deployment for credentials that were already funded (optional, defaults to false)"}
                },
                "required": ["account_type"],
                "additionalProperties": false
            }
        },
        {
            "name": "precompute_account_address",
            "description": "Compute the address an OpenZeppelin or Argent account would deploy to for a given public key.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "account_type": {"type": "string", "description": "'openzeppelin' or 'argent'"},
                    "public_key": {"type": "string", "description": "0x-prefixed Stark public key"},
                    "guardian": {"type": "string", "description": "Argent guardian public key (optional)"}
                },
                "required": ["account_type", "public_key"],
                "additionalProperties": false
            }
        }
    ]);

    Response::success(req.id.clone(), json!({ "tools": tools }))
}
