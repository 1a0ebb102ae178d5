//! Analysis Orchestrator
//!
//! Pulls a filtered memory window, assembles a mode-specific prompt, and
//! shapes the model's tagged reply into a structured answer. An empty window
//! short-circuits without a model call.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::clients::OllamaClient;
use crate::error::{EngineError, Result};
use crate::memory::{Memory, MemoryListFilter, SessionFilterMode};
use crate::services::MemoryService;

/// Separator between context items inside a prompt.
const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Default window size.
const DEFAULT_LIMIT: usize = 50;

/// Canned reply for an empty window; the model is never consulted.
const EMPTY_WINDOW_ANSWER: &str =
    "I'm sorry, I don't have any stored memories matching that timeframe and filter, \
     so there is nothing to analyze yet.";

/// Analysis modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    Question,
    Summarize,
    Patterns,
    Temporal,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::Question => "question",
            AnalysisMode::Summarize => "summarize",
            AnalysisMode::Patterns => "patterns",
            AnalysisMode::Temporal => "temporal",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "question" => Some(AnalysisMode::Question),
            "summarize" => Some(AnalysisMode::Summarize),
            "patterns" => Some(AnalysisMode::Patterns),
            "temporal" => Some(AnalysisMode::Temporal),
            _ => None,
        }
    }
}

/// Window timeframes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Today,
    Week,
    Month,
    #[default]
    All,
}

impl Timeframe {
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "today" => Some(Timeframe::Today),
            "week" => Some(Timeframe::Week),
            "month" => Some(Timeframe::Month),
            "all" => Some(Timeframe::All),
            _ => None,
        }
    }

    /// Earliest creation time admitted into the window.
    pub fn floor(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Timeframe::Today => Some(
                now.date_naive()
                    .and_hms_opt(0, 0, 0)
                    .map(|naive| naive.and_utc())
                    .unwrap_or(now),
            ),
            Timeframe::Week => Some(now - Duration::days(7)),
            Timeframe::Month => Some(now - Duration::days(30)),
            Timeframe::All => None,
        }
    }
}

/// Analysis request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub mode: AnalysisMode,
    /// Question or topic the analysis centers on
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub timeframe: Timeframe,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
}

/// Structured analysis result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub mode: AnalysisMode,
    pub answer: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub key_themes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub confidence: f64,
    pub memory_count: usize,
    pub memories: Vec<Memory>,
}

/// Coordinates window selection, prompting, and response shaping
#[derive(Clone)]
pub struct AnalysisOrchestrator {
    memory: MemoryService,
    ollama: Arc<OllamaClient>,
}

impl AnalysisOrchestrator {
    pub fn new(memory: MemoryService, ollama: Arc<OllamaClient>) -> Self {
        Self { memory, ollama }
    }

    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResponse> {
        if request.mode == AnalysisMode::Question
            && request
                .question
                .as_deref()
                .map(str::trim)
                .is_none_or(str::is_empty)
        {
            return Err(EngineError::BadRequest(
                "question mode requires a question".to_string(),
            ));
        }

        let window = self.memory.list(&MemoryListFilter {
            session_id: request.session_id.clone(),
            session_mode: if request.session_id.is_some() {
                SessionFilterMode::SessionAndShared
            } else {
                SessionFilterMode::All
            },
            domain: request.domain.clone(),
            since: request.timeframe.floor(Utc::now()),
            limit: Some(request.limit.unwrap_or(DEFAULT_LIMIT)),
            ..Default::default()
        })?;

        if window.is_empty() {
            return Ok(AnalysisResponse {
                mode: request.mode,
                answer: EMPTY_WINDOW_ANSWER.to_string(),
                key_themes: Vec::new(),
                analysis_type: None,
                reasoning: None,
                confidence: 0.0,
                memory_count: 0,
                memories: Vec::new(),
            });
        }

        let prompt = build_prompt(&request, &window);
        let reply = self.ollama.generate(&prompt).await?;
        let parsed = parse_tagged_reply(&reply);

        let confidence = match request.mode {
            AnalysisMode::Question => {
                if parsed.found_any_tag {
                    0.8
                } else {
                    0.0
                }
            }
            _ => parsed.confidence.unwrap_or(if parsed.found_any_tag {
                0.8
            } else {
                0.0
            }),
        };

        Ok(AnalysisResponse {
            mode: request.mode,
            answer: parsed.summary.unwrap_or_else(|| reply.trim().to_string()),
            key_themes: parsed.key_themes,
            analysis_type: parsed.analysis_type,
            reasoning: parsed.reasoning,
            confidence,
            memory_count: window.len(),
            memories: window,
        })
    }
}

fn build_prompt(request: &AnalysisRequest, window: &[Memory]) -> String {
    let context = match request.mode {
        AnalysisMode::Temporal => window
            .iter()
            .map(|m| format!("[{}] {}", m.created_at.format("%Y-%m-%d"), m.content))
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR),
        _ => window
            .iter()
            .map(|m| m.content.clone())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR),
    };

    let instructions = "Reply using tagged lines:\n\
        SUMMARY: <one-paragraph answer>\n\
        KEY THEMES: <comma-separated themes>\n\
        TYPE: <kind of analysis performed>\n\
        CONFIDENCE: <0.0-1.0>\n\
        REASONING: <how you arrived at the answer>";

    match request.mode {
        AnalysisMode::Question => format!(
            "You are answering a question grounded only in the stored memories below.\n\n\
             Question: {}\n\nMemories:\n{}\n\n{}",
            request.question.as_deref().unwrap_or_default(),
            context,
            instructions,
        ),
        AnalysisMode::Summarize => format!(
            "Summarize the stored memories below into their essential points.\n\n\
             Memories:\n{}\n\n{}",
            context, instructions,
        ),
        AnalysisMode::Patterns => format!(
            "Identify recurring patterns, habits, and contradictions across the stored \
             memories below.\n\nMemories:\n{}\n\n{}",
            context, instructions,
        ),
        AnalysisMode::Temporal => format!(
            "Each memory below is prefixed with its creation date. Reason about how the \
             situation progressed over time.\n\nMemories:\n{}\n\n{}",
            context, instructions,
        ),
    }
}

#[derive(Debug, Default)]
struct ParsedReply {
    summary: Option<String>,
    key_themes: Vec<String>,
    analysis_type: Option<String>,
    confidence: Option<f64>,
    reasoning: Option<String>,
    found_any_tag: bool,
}

/// Parse the model reply by case-insensitive line-prefixed tags.
fn parse_tagged_reply(reply: &str) -> ParsedReply {
    let mut parsed = ParsedReply::default();
    for line in reply.lines() {
        let trimmed = line.trim();
        if let Some(value) = strip_tag(trimmed, "SUMMARY:") {
            parsed.summary = Some(value.to_string());
            parsed.found_any_tag = true;
        } else if let Some(value) = strip_tag(trimmed, "KEY THEMES:") {
            parsed.key_themes = value
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            parsed.found_any_tag = true;
        } else if let Some(value) = strip_tag(trimmed, "TYPE:") {
            parsed.analysis_type = Some(value.to_string());
            parsed.found_any_tag = true;
        } else if let Some(value) = strip_tag(trimmed, "CONFIDENCE:") {
            parsed.confidence = value.parse::<f64>().ok().map(|c| c.clamp(0.0, 1.0));
            parsed.found_any_tag = true;
        } else if let Some(value) = strip_tag(trimmed, "REASONING:") {
            parsed.reasoning = Some(value.to_string());
            parsed.found_any_tag = true;
        }
    }
    parsed
}

fn strip_tag<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    if line.len() >= tag.len() && line[..tag.len()].eq_ignore_ascii_case(tag) {
        Some(line[tag.len()..].trim())
    } else {
        None
    }
}

// ============================================================================
// TESTS
// ============================================================================
