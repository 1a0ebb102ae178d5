//! Engram CLI
//!
//! Command-line interface over the same durable store the daemon serves.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;

use engram_core::{
    AnalysisMode, AnalysisRequest, Config, CreateRelationshipInput, Engine, EngineError,
    MemoryListFilter, SearchMode, SearchOptions, SessionFilterMode, StoreMemoryInput, Timeframe,
    UpdateMemoryInput, normalize_tags,
};
use engram_mcp::daemon;
use engram_mcp::router::AppContext;

/// Engram - persistent memory for AI agents
#[derive(Parser)]
#[command(name = "engram")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CLI for the Engram memory engine")]
#[command(
    long_about = "Engram stores short text memories with metadata, retrieves them by keyword \
                  and semantic similarity, links them into a typed graph, and answers \
                  AI-mediated questions grounded in the stored corpus."
)]
struct Cli {
    /// Explicit configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a memory
    Store {
        /// Content to remember
        content: String,
        /// Importance 1-10
        #[arg(long)]
        importance: Option<i64>,
        /// Tags (comma-separated)
        #[arg(long)]
        tags: Option<String>,
        /// Organizational domain
        #[arg(long)]
        domain: Option<String>,
        /// Provenance label
        #[arg(long)]
        source: Option<String>,
        /// Explicit session identifier
        #[arg(long)]
        session: Option<String>,
    },

    /// Fetch a memory by id or slug
    Get {
        /// Memory identifier
        id: Option<String>,
        /// Memory slug
        #[arg(long)]
        slug: Option<String>,
    },

    /// Search memories
    Search {
        /// Search query
        query: String,
        /// Mode: keyword, semantic, hybrid, tags
        #[arg(long)]
        mode: Option<String>,
        /// Restrict to one domain
        #[arg(long)]
        domain: Option<String>,
        /// Maximum results
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// List memories
    List {
        /// Restrict to one domain
        #[arg(long)]
        domain: Option<String>,
        /// Restrict to one session
        #[arg(long)]
        session: Option<String>,
        /// Maximum results
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Update a memory
    Update {
        /// Memory identifier
        id: String,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        importance: Option<i64>,
        /// Tags (comma-separated, replaces the existing set)
        #[arg(long)]
        tags: Option<String>,
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        source: Option<String>,
    },

    /// Delete a memory and everything attached to it
    Delete {
        /// Memory identifier
        id: String,
    },

    /// Link two memories with a typed edge
    Relate {
        /// Source memory identifier
        source: String,
        /// Target memory identifier
        target: String,
        /// Edge type (references, contradicts, expands, similar, sequential, causes, enables)
        #[arg(long, default_value = "references")]
        r#type: String,
        /// Edge strength 0.0-1.0
        #[arg(long)]
        strength: Option<f64>,
        /// Free-text context
        #[arg(long)]
        context: Option<String>,
    },

    /// Show edges touching a memory
    Related {
        /// Memory identifier
        id: String,
        /// Restrict to one edge type
        #[arg(long)]
        r#type: Option<String>,
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Map the relationship graph around a memory
    Graph {
        /// Root memory identifier
        id: String,
        /// Traversal depth 1-5
        #[arg(long)]
        depth: Option<i64>,
        /// Minimum edge strength
        #[arg(long)]
        min_strength: Option<f64>,
    },

    /// Ask an AI-mediated question over stored memories
    Analysis {
        /// Mode: question, summarize, patterns, temporal
        #[arg(long, default_value = "question")]
        mode: String,
        /// The question (question mode)
        question: Option<String>,
        /// Timeframe: today, week, month, all
        #[arg(long, default_value = "all")]
        timeframe: String,
        #[arg(long)]
        domain: Option<String>,
    },

    /// Show store statistics
    Stats,

    /// List domains
    Domains,

    /// List sessions
    Sessions,

    /// Control the background daemon
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
}

#[derive(Subcommand)]
enum DaemonAction {
    /// Start the daemon in the background
    Start,
    /// Report whether the daemon is running
    Status,
    /// Stop a running daemon
    Stop,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            return ExitCode::from(1);
        }
    };

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(EngineError::Cancelled) => {
            eprintln!("{}", "cancelled".yellow());
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::from(1)
        }
    }
}

async fn run(command: Commands, config: Config) -> Result<(), EngineError> {
    // Daemon control operates on the lock files, not the engine
    if let Commands::Daemon { action } = &command {
        return match action {
            DaemonAction::Start => {
                let existing = daemon::status(&config);
                if existing.running {
                    println!(
                        "{} (pid {})",
                        "already running".yellow(),
                        existing.pid.unwrap_or_default()
                    );
                    return Ok(());
                }
                let binary = sibling_binary("engram-mcp");
                let child = std::process::Command::new(&binary)
                    .stdin(std::process::Stdio::null())
                    .stdout(std::process::Stdio::null())
                    .stderr(std::process::Stdio::null())
                    .spawn()
                    .map_err(|e| {
                        EngineError::Internal(format!(
                            "failed to spawn {}: {}",
                            binary.display(),
                            e
                        ))
                    })?;
                println!("{} (pid {})", "daemon started".green().bold(), child.id());
                Ok(())
            }
            DaemonAction::Status => {
                let status = daemon::status(&config);
                if status.running {
                    println!(
                        "{} (pid {}, up {}s)",
                        "running".green().bold(),
                        status.pid.unwrap_or_default(),
                        status.uptime_seconds.unwrap_or_default(),
                    );
                    if let Some(state) = status.state {
                        println!(
                            "  rest: {}  mcp: {}",
                            format_flag(state.rest_enabled),
                            format_flag(state.mcp_enabled)
                        );
                        if state.rest_enabled {
                            println!("  rest address: {}:{}", state.rest_host, state.rest_port);
                        }
                    }
                } else {
                    println!("{}", "not running".yellow());
                }
                Ok(())
            }
            DaemonAction::Stop => {
                if daemon::stop(&config).await? {
                    println!("{}", "daemon stopped".green());
                } else {
                    println!("{}", "daemon not running".yellow());
                }
                Ok(())
            }
        };
    }

    let engine = Arc::new(Engine::new(config)?);
    let ctx = AppContext::new(engine);

    match command {
        Commands::Store {
            content,
            importance,
            tags,
            domain,
            source,
            session,
        } => {
            ctx.admit("store_memory")?;
            let result = ctx
                .engine
                .memory
                .store(StoreMemoryInput {
                    content,
                    importance,
                    tags: split_tags(tags),
                    domain,
                    source,
                    session_id: session,
                    ..Default::default()
                })
                .await?;
            println!(
                "{} {} (session {})",
                "stored".green().bold(),
                result.memory.id,
                result.session_id
            );
            Ok(())
        }

        Commands::Get { id, slug } => {
            ctx.admit("get_memory")?;
            let memory = ctx.engine.memory.get(id.as_deref(), slug.as_deref())?;
            match memory {
                Some(memory) => {
                    println!("{}", serde_json::to_string_pretty(&memory)?);
                    Ok(())
                }
                None => Err(EngineError::NotFound("no matching memory".to_string())),
            }
        }

        Commands::Search {
            query,
            mode,
            domain,
            limit,
        } => {
            ctx.admit("search")?;
            let mode = match mode.as_deref() {
                Some(name) => Some(SearchMode::parse_name(name).ok_or_else(|| {
                    EngineError::BadRequest(format!("unknown search mode '{}'", name))
                })?),
                None => None,
            };
            let response = ctx
                .engine
                .search
                .search(SearchOptions {
                    query,
                    mode,
                    domain,
                    limit: Some(limit),
                    ..Default::default()
                })
                .await?;

            if response.degraded {
                eprintln!(
                    "{} vector service unavailable; ran {} search",
                    "note:".yellow(),
                    response.mode.as_str()
                );
            }
            if response.hits.is_empty() {
                println!("{}", "no results".yellow());
            }
            for hit in response.hits {
                println!(
                    "{:.3}  {}  {}",
                    hit.relevance,
                    hit.memory.id.dimmed(),
                    first_line(&hit.memory.content)
                );
            }
            Ok(())
        }

        Commands::List {
            domain,
            session,
            limit,
        } => {
            ctx.admit("list_memories")?;
            let memories = ctx.engine.memory.list(&MemoryListFilter {
                domain,
                session_id: session.clone(),
                session_mode: if session.is_some() {
                    SessionFilterMode::SessionAndShared
                } else {
                    SessionFilterMode::All
                },
                limit: Some(limit),
                ..Default::default()
            })?;
            for memory in memories {
                println!(
                    "{}  [{}]  {}",
                    memory.id.dimmed(),
                    memory.importance,
                    first_line(&memory.content)
                );
            }
            Ok(())
        }

        Commands::Update {
            id,
            content,
            importance,
            tags,
            domain,
            source,
        } => {
            ctx.admit("update_memory")?;
            let memory = ctx
                .engine
                .memory
                .update(
                    &id,
                    UpdateMemoryInput {
                        content,
                        importance,
                        tags: tags.map(|t| split_tags(Some(t))),
                        domain,
                        source,
                    },
                )
                .await?;
            println!("{} {}", "updated".green().bold(), memory.id);
            Ok(())
        }

        Commands::Delete { id } => {
            ctx.admit("delete_memory")?;
            ctx.engine.memory.delete(&id).await?;
            println!("{} {}", "deleted".green().bold(), id);
            Ok(())
        }

        Commands::Relate {
            source,
            target,
            r#type,
            strength,
            context,
        } => {
            ctx.admit("relationships")?;
            let relationship = ctx.engine.graph.create(CreateRelationshipInput {
                source_id: source,
                target_id: target,
                relationship_type: r#type,
                strength,
                context,
            })?;
            println!(
                "{} {} -[{} {:.2}]-> {}",
                "linked".green().bold(),
                relationship.source_id,
                relationship.relationship_type,
                relationship.strength,
                relationship.target_id
            );
            Ok(())
        }

        Commands::Related { id, r#type, limit } => {
            ctx.admit("relationships")?;
            let related = ctx
                .engine
                .graph
                .find_related(&id, Some(limit), r#type.as_deref())?;
            if related.is_empty() {
                println!("{}", "no relationships".yellow());
            }
            for item in related {
                println!(
                    "{} ({:.2})  {}  {}",
                    item.relationship.relationship_type,
                    item.relationship.strength,
                    item.memory.id.dimmed(),
                    first_line(&item.memory.content)
                );
            }
            Ok(())
        }

        Commands::Graph {
            id,
            depth,
            min_strength,
        } => {
            ctx.admit("relationships")?;
            let map = ctx.engine.graph.map_graph(&id, depth, min_strength, None)?;
            println!(
                "{} nodes, {} edges (depth {})",
                map.total_nodes, map.total_edges, map.max_depth
            );
            for node in map.nodes {
                println!(
                    "{}{}  {}",
                    "  ".repeat(node.distance as usize),
                    node.memory.id.dimmed(),
                    first_line(&node.memory.content)
                );
            }
            Ok(())
        }

        Commands::Analysis {
            mode,
            question,
            timeframe,
            domain,
        } => {
            ctx.admit("analysis")?;
            let mode = AnalysisMode::parse_name(&mode).ok_or_else(|| {
                EngineError::BadRequest(format!("unknown analysis mode '{}'", mode))
            })?;
            let timeframe = Timeframe::parse_name(&timeframe).ok_or_else(|| {
                EngineError::BadRequest(format!("unknown timeframe '{}'", timeframe))
            })?;
            let response = ctx
                .engine
                .analysis
                .analyze(AnalysisRequest {
                    mode,
                    question,
                    timeframe,
                    limit: None,
                    session_id: None,
                    domain,
                })
                .await?;

            println!("{}", response.answer);
            if !response.key_themes.is_empty() {
                println!("{} {}", "themes:".bold(), response.key_themes.join(", "));
            }
            println!(
                "{} {} memories, confidence {:.2}",
                "grounding:".dimmed(),
                response.memory_count,
                response.confidence
            );
            Ok(())
        }

        Commands::Stats => {
            ctx.admit("stats")?;
            let stats = ctx.engine.memory.stats()?;
            println!("{}", "Engram store".bold());
            println!("  memories:   {}", stats.total_memories);
            println!("  sessions:   {}", stats.total_sessions);
            println!("  domains:    {}", stats.total_domains);
            println!("  categories: {}", stats.total_categories);
            println!("  session:    {}", stats.current_session_id);
            Ok(())
        }

        Commands::Domains => {
            ctx.admit("domains")?;
            for domain in ctx.engine.store.list_domains()? {
                match ctx.engine.store.domain_stats(&domain.name)? {
                    Some(stats) => println!(
                        "{}  ({} memories, avg importance {:.1})",
                        domain.name, stats.memory_count, stats.avg_importance
                    ),
                    None => println!("{}", domain.name),
                }
            }
            Ok(())
        }

        Commands::Sessions => {
            ctx.admit("sessions")?;
            for session in ctx.engine.store.list_sessions()? {
                println!(
                    "{}  {}  last active {}",
                    session.id,
                    session.agent_type,
                    session.last_accessed.format("%Y-%m-%d %H:%M")
                );
            }
            Ok(())
        }

        Commands::Daemon { .. } => unreachable!("handled above"),
    }
}

fn format_flag(enabled: bool) -> String {
    if enabled {
        "enabled".green().to_string()
    } else {
        "disabled".yellow().to_string()
    }
}

/// Path to a binary installed next to this one, falling back to PATH lookup.
fn sibling_binary(name: &str) -> PathBuf {
    if let Ok(current) = std::env::current_exe() {
        if let Some(dir) = current.parent() {
            let candidate = dir.join(name);
            if candidate.exists() {
                return candidate;
            }
        }
    }
    PathBuf::from(name)
}

fn split_tags(tags: Option<String>) -> Vec<String> {
    match tags {
        Some(raw) => normalize_tags(raw.split(',')),
        None => Vec::new(),
    }
}

fn first_line(content: &str) -> String {
    let line = content.lines().next().unwrap_or_default();
    if line.len() > 80 {
        let cut: String = line.chars().take(77).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}
