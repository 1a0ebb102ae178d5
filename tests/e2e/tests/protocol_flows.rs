//! JSON-RPC protocol flows
//!
//! Drives the tool server the way a stdio client would: initialize, list
//! tools, then exercise the full tool surface over one shared engine.

use serde_json::{Value, json};

use engram_e2e_tests::harness;
use engram_mcp::protocol::types::{JsonRpcRequest, JsonRpcResponse};
use engram_mcp::router::AppContext;
use engram_mcp::server::ToolServer;

struct Client {
    server: ToolServer,
    next_id: i64,
    _dir: tempfile::TempDir,
}

impl Client {
    fn new() -> Self {
        let t = harness::offline_engine();
        Self {
            server: ToolServer::new(AppContext::new(t.engine)),
            next_id: 0,
            _dir: t.dir,
        }
    }

    async fn request(&mut self, method: &str, params: Value) -> JsonRpcResponse {
        self.next_id += 1;
        self.server
            .handle_request(JsonRpcRequest {
                jsonrpc: "2.0".to_string(),
                id: Some(Value::Number(self.next_id.into())),
                method: method.to_string(),
                params: Some(params),
            })
            .await
            .expect("expected a response")
    }

    /// Call a tool and parse the text content back into JSON.
    async fn call_tool(&mut self, name: &str, arguments: Value) -> Value {
        let response = self
            .request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await;
        assert!(
            response.error.is_none(),
            "tool {} failed: {:?}",
            name,
            response.error
        );
        let result = response.result.unwrap();
        let text = result["content"][0]["text"].as_str().unwrap();
        serde_json::from_str(text).unwrap()
    }

    async fn call_tool_err(&mut self, name: &str, arguments: Value) -> i32 {
        let response = self
            .request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await;
        response.error.expect("expected an error").code
    }
}

#[tokio::test]
async fn initialize_then_full_memory_lifecycle() {
    let mut client = Client::new();

    let init = client
        .request("initialize", json!({ "protocolVersion": "2024-11-05" }))
        .await;
    let init = init.result.unwrap();
    assert_eq!(init["protocolVersion"], "2024-11-05");

    // Store
    let stored = client
        .call_tool(
            "store_memory",
            json!({
                "content": "The staging cluster lives in us-east-1",
                "importance": 7,
                "tags": ["Infra", "infra", " aws "],
                "domain": "Platform",
            }),
        )
        .await;
    let id = stored["memory"]["id"].as_str().unwrap().to_string();
    assert_eq!(stored["memory"]["importance"], 7);
    assert_eq!(stored["memory"]["tags"], json!(["infra", "aws"]));
    assert_eq!(stored["memory"]["domain"], "platform");

    // Get
    let fetched = client
        .call_tool("get_memory_by_id", json!({ "id": id }))
        .await;
    assert_eq!(fetched["memory"]["id"], id.as_str());

    // Search
    let search = client
        .call_tool("search", json!({ "query": "staging cluster" }))
        .await;
    assert_eq!(search["mode"], "keyword");
    assert!(search["total"].as_u64().unwrap() >= 1);

    // Update
    let updated = client
        .call_tool(
            "update_memory",
            json!({ "id": id, "importance": 2 }),
        )
        .await;
    assert_eq!(updated["memory"]["importance"], 2);

    // Stats reflect the write
    let stats = client.call_tool("stats", json!({})).await;
    assert_eq!(stats["stats"]["totalMemories"], 1);
    assert_eq!(stats["stats"]["totalDomains"], 1);

    // Domains listing and per-domain stats
    let domains = client.call_tool("domains", json!({})).await;
    assert_eq!(domains["total"], 1);
    let domain_stats = client
        .call_tool("domains", json!({ "name": "platform" }))
        .await;
    assert_eq!(domain_stats["memoryCount"], 1);

    // Sessions listing
    let sessions = client.call_tool("sessions", json!({})).await;
    assert_eq!(sessions["total"], 1);

    // Delete
    let deleted = client.call_tool("delete_memory", json!({ "id": id })).await;
    assert_eq!(deleted["deleted"], true);

    let empty = client
        .call_tool("get_memory_by_id", json!({ "id": id }))
        .await;
    assert!(empty["memory"].is_null());
}

#[tokio::test]
async fn relationships_tool_round_trip() {
    let mut client = Client::new();
    client.request("initialize", json!({})).await;

    let a = client
        .call_tool("store_memory", json!({ "content": "decision record" }))
        .await["memory"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    let b = client
        .call_tool("store_memory", json!({ "content": "follow-up task" }))
        .await["memory"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let created = client
        .call_tool(
            "relationships",
            json!({
                "action": "create",
                "source_id": a,
                "target_id": b,
                "relationship_type": "causes",
                "strength": 0.8,
            }),
        )
        .await;
    assert_eq!(created["relationship"]["relationshipType"], "causes");

    let related = client
        .call_tool(
            "relationships",
            json!({ "action": "related", "memory_id": a }),
        )
        .await;
    assert_eq!(related["total"], 1);
    assert_eq!(related["related"][0]["memory"]["id"], b.as_str());

    let map = client
        .call_tool(
            "relationships",
            json!({ "action": "map", "memory_id": a, "depth": 3 }),
        )
        .await;
    assert_eq!(map["totalNodes"], 2);
    assert_eq!(map["totalEdges"], 1);
}

#[tokio::test]
async fn error_codes_match_the_wire_contract() {
    let mut client = Client::new();
    client.request("initialize", json!({})).await;

    // Empty content: invalid params
    assert_eq!(
        client
            .call_tool_err("store_memory", json!({ "content": "   " }))
            .await,
        -32602
    );

    // Unknown relationship type: invalid params
    let id = client
        .call_tool("store_memory", json!({ "content": "peer" }))
        .await["memory"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(
        client
            .call_tool_err(
                "relationships",
                json!({
                    "action": "create",
                    "source_id": id,
                    "target_id": id,
                    "relationship_type": "similar",
                }),
            )
            .await,
        -32602
    );

    // Unknown tool name: invalid params (tools/call resolved, name did not)
    assert_eq!(client.call_tool_err("telepathy", json!({})).await, -32602);

    // Unknown method: method not found
    let response = client.request("tools/telepathy", json!({})).await;
    assert_eq!(response.error.unwrap().code, -32601);
}

#[tokio::test]
async fn analysis_tool_reports_empty_window() {
    let mut client = Client::new();
    client.request("initialize", json!({})).await;

    let analysis = client
        .call_tool(
            "analysis",
            json!({ "mode": "question", "question": "What changed last week?" }),
        )
        .await;
    assert_eq!(analysis["memoryCount"], 0);
    assert!(!analysis["answer"].as_str().unwrap().is_empty());
}
