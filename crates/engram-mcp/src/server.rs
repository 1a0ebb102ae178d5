//! Tool Server Core
//!
//! Routes JSON-RPC requests (initialize, tools/list, tools/call) into the
//! tool registry and maps engine errors onto the wire error codes.

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use engram_core::EngineError;

use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};
use crate::router::AppContext;
use crate::tools;

/// JSON-RPC server over the shared engine
pub struct ToolServer {
    ctx: AppContext,
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Debug, Deserialize, Default)]
struct InitializeParams {
    #[serde(rename = "protocolVersion", default)]
    protocol_version: Option<String>,
}

impl ToolServer {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Handle one request; notifications return `None`.
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("Handling request: {}", request.method);

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_request("jsonrpc must be \"2.0\""),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "notifications/initialized" => return None,
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(request.params).await,
            "ping" => Ok(json!({})),
            method => {
                warn!("Unknown method: {}", method);
                Err(JsonRpcError::method_not_found())
            }
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    fn handle_initialize(&mut self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: InitializeParams = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => InitializeParams::default(),
        };

        info!(
            client_version = params.protocol_version.as_deref().unwrap_or("unspecified"),
            "Session initialized with protocol version {}", PROTOCOL_VERSION
        );

        Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {
                "name": "engram",
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {
                "tools": { "listChanged": false }
            },
            "instructions": "Engram is a persistent memory store. Use store_memory to save \
                important facts, search to retrieve them, relationships to link them, and \
                analysis to ask grounded questions over everything stored."
        }))
    }

    fn handle_tools_list(&self) -> Result<Value, JsonRpcError> {
        let tools = tools::descriptions();
        serde_json::to_value(json!({ "tools": tools }))
            .map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("missing params")),
        };

        match tools::call(&self.ctx, &params.name, params.arguments).await {
            Ok(result) => Ok(json!({
                "content": [{
                    "type": "text",
                    "text": serde_json::to_string_pretty(&result)
                        .unwrap_or_else(|_| result.to_string()),
                }],
                "isError": false,
            })),
            Err(error) => Err(map_engine_error(&error)),
        }
    }
}

/// Engine error kinds onto JSON-RPC codes: caller mistakes and missing
/// records are invalid params; everything else is internal.
fn map_engine_error(error: &EngineError) -> JsonRpcError {
    match error {
        EngineError::BadRequest(message) => JsonRpcError::invalid_params(message),
        EngineError::NotFound(message) => {
            JsonRpcError::invalid_params(&format!("not found: {}", message))
        }
        other => JsonRpcError::internal_error(&other.to_string()),
    }
}

// ============================================================================
// TESTS
// ============================================================================
