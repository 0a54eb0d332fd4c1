use anyhow::Result;
use clap::Parser;
use deskwise::backend::{Backend, BackendStatus};
use deskwise::catalog::LocationCatalog;
use deskwise::config::Config;
use deskwise::llm::HistoryMessage;
use deskwise::prompts::PromptSet;
use deskwise::ticket::{ApiResponse, UNKNOWN_FIELD};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

#[derive(Parser)]
#[command(
    name = "deskwise",
    about = "LLM-backed support-ticket triage: analysis, follow-up questions, location normalization"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Analyze a support message into a structured ticket
    Analyze {
        /// The user's support message
        message: String,

        /// Path to config file
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Path to a JSON file with prior conversation history
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Generate a follow-up question for a partially filled ticket
    FollowUp {
        /// Path to a JSON file with the partial ticket
        ticket: PathBuf,

        /// Path to config file
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Path to a JSON file with prior conversation history
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Match a raw location string against the canonical catalog
    MatchLocation {
        /// The location string to normalize
        query: String,

        /// Path to config file
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Minimum similarity score (0-100) for a match
        #[arg(long)]
        cutoff: Option<u8>,
    },

    /// Report backend, prompt and catalog health
    Status {
        /// Path to config file
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deskwise=info".parse().unwrap()),
        )
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Analyze {
            message,
            config,
            history,
        } => {
            let cfg = load_config(&config)?;
            cfg.validate()?;
            let history = load_history(history.as_deref())?;
            run_analyze(&cfg, &message, &history).await
        }
        Command::FollowUp {
            ticket,
            config,
            history,
        } => {
            let cfg = load_config(&config)?;
            cfg.validate()?;
            let history = load_history(history.as_deref())?;
            run_follow_up(&cfg, &ticket, &history).await
        }
        Command::MatchLocation {
            query,
            config,
            cutoff,
        } => {
            let cfg = load_config(&config)?;
            run_match_location(&cfg, &query, cutoff)
        }
        Command::Status { config } => {
            let cfg = load_config(&config)?;
            run_status(&cfg)
        }
    }
}

/// Missing config file falls back to defaults; a present-but-broken file is
/// an error.
fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Ok(Config::load(path)?)
    } else {
        Ok(Config::default())
    }
}

fn load_history(path: Option<&Path>) -> Result<Vec<HistoryMessage>> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&content)?)
        }
        None => Ok(Vec::new()),
    }
}

async fn run_analyze(cfg: &Config, message: &str, history: &[HistoryMessage]) -> Result<()> {
    let prompts = Arc::new(PromptSet::load(&cfg.prompts.dir)?);
    let backend = Backend::from_config(cfg, prompts)?;
    let (catalog, diagnostic) =
        LocationCatalog::load(&cfg.locations.path, cfg.locations.column.clone());
    if let Some(diag) = diagnostic {
        warn!(%diag, "location normalization inactive");
    }

    let envelope = analyze_to_envelope(
        &backend,
        &catalog,
        cfg.locations.score_cutoff,
        message,
        history,
    )
    .await;
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

/// Caller-side pipeline: raw model text → JSON parse (soft-fail on invalid
/// output) → location normalization → uniform envelope.
async fn analyze_to_envelope(
    backend: &Backend,
    catalog: &LocationCatalog,
    cutoff: u8,
    message: &str,
    history: &[HistoryMessage],
) -> ApiResponse {
    match backend.analyze(message, history).await {
        Ok(raw) => match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(mut parsed) => {
                normalize_location(&mut parsed, catalog, cutoff);
                ApiResponse::success(parsed, "Ticket analyzed")
            }
            Err(e) => {
                warn!(error = %e, "model returned unparseable JSON");
                ApiResponse::invalid_model_output(raw, e.to_string())
            }
        },
        Err(e) => ApiResponse::failure("Analysis failed", e.to_string()),
    }
}

fn normalize_location(parsed: &mut serde_json::Value, catalog: &LocationCatalog, cutoff: u8) {
    let Some(raw_location) = parsed.get("location").and_then(|v| v.as_str()) else {
        return;
    };
    if raw_location.is_empty() || raw_location == UNKNOWN_FIELD {
        return;
    }
    if let Some(matched) = catalog.find_best_match(raw_location, cutoff) {
        parsed["location"] = serde_json::Value::String(matched.candidate);
    }
}

async fn run_follow_up(cfg: &Config, ticket_path: &Path, history: &[HistoryMessage]) -> Result<()> {
    let ticket: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(ticket_path)?)?;
    if !ticket.as_object().is_some_and(|o| !o.is_empty()) {
        anyhow::bail!("ticket must be a non-empty JSON object");
    }

    let prompts = Arc::new(PromptSet::load(&cfg.prompts.dir)?);
    let backend = Backend::from_config(cfg, prompts)?;

    let envelope = match backend.follow_up(&ticket, history).await {
        Ok(question) => ApiResponse::success(
            serde_json::json!({ "question": question }),
            "Follow-up question generated",
        ),
        Err(e) => ApiResponse::failure("Follow-up generation failed", e.to_string()),
    };
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

fn run_match_location(cfg: &Config, query: &str, cutoff: Option<u8>) -> Result<()> {
    let (catalog, diagnostic) =
        LocationCatalog::load(&cfg.locations.path, cfg.locations.column.clone());
    if let Some(diag) = diagnostic {
        warn!(%diag, "location catalog is empty");
    }

    let cutoff = cutoff.unwrap_or(cfg.locations.score_cutoff);
    match catalog.find_best_match(query, cutoff) {
        Some(matched) => println!("{}", serde_json::to_string_pretty(&matched)?),
        None => println!("null"),
    }
    Ok(())
}

#[derive(Serialize)]
struct StatusReport {
    status: &'static str,
    backend: BackendStatus,
    prompts_loaded: bool,
    locations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
}

fn run_status(cfg: &Config) -> Result<()> {
    let prompts = PromptSet::load(&cfg.prompts.dir);
    let prompts_loaded = prompts.is_ok();
    let backend = Backend::from_config(cfg, Arc::new(prompts.unwrap_or_default()))?;
    let (catalog, diagnostic) =
        LocationCatalog::load(&cfg.locations.path, cfg.locations.column.clone());

    let report = StatusReport {
        status: if prompts_loaded && diagnostic.is_none() {
            "healthy"
        } else {
            "degraded"
        },
        backend: backend.status(),
        prompts_loaded,
        locations: catalog.len(),
        warning: diagnostic.map(|d| d.to_string()),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
