//! Analysis Tool
//!
//! AI-mediated questions over the stored corpus.

use serde::Deserialize;
use serde_json::Value;

use engram_core::{AnalysisMode, AnalysisRequest, EngineError, Result, Timeframe};

use crate::router::AppContext;
use crate::tools::memory::parse_args;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "mode": {
                "type": "string",
                "enum": ["question", "summarize", "patterns", "temporal"],
                "description": "Kind of analysis to run"
            },
            "question": {
                "type": "string",
                "description": "The question to answer (required for mode=question)"
            },
            "timeframe": {
                "type": "string",
                "enum": ["today", "week", "month", "all"],
                "description": "Window of memories to analyze (default: all)"
            },
            "limit": {
                "type": "integer",
                "description": "Maximum memories in the window (default: 50)",
                "minimum": 1,
                "maximum": 200
            },
            "session_id": { "type": "string" },
            "domain": { "type": "string" }
        },
        "required": ["mode"]
    })
}

#[derive(Debug, Deserialize)]
struct AnalysisArgs {
    mode: String,
    question: Option<String>,
    timeframe: Option<String>,
    limit: Option<usize>,
    session_id: Option<String>,
    domain: Option<String>,
}

pub async fn execute(ctx: &AppContext, args: Option<Value>) -> Result<Value> {
    let args: AnalysisArgs = parse_args(args)?;
    let mode = AnalysisMode::parse_name(&args.mode)
        .ok_or_else(|| EngineError::BadRequest(format!("unknown analysis mode '{}'", args.mode)))?;
    let timeframe = match args.timeframe.as_deref() {
        Some(name) => Timeframe::parse_name(name)
            .ok_or_else(|| EngineError::BadRequest(format!("unknown timeframe '{}'", name)))?,
        None => Timeframe::All,
    };

    let response = ctx
        .engine
        .analysis
        .analyze(AnalysisRequest {
            mode,
            question: args.question,
            timeframe,
            limit: args.limit,
            session_id: args.session_id,
            domain: args.domain,
        })
        .await?;
    Ok(serde_json::to_value(response)?)
}
