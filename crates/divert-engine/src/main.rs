//! Divert command line.
//!
//! Usage:
//!   divert [--config engine.yaml] compile <snapshot.json>
//!   divert [--config engine.yaml] shim-rules <snapshot.json>
//!   divert [--config engine.yaml] test <snapshot.json> --url <URL> [--method GET]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use divert_engine::config::{EngineConfig, LogFormat, LoggingConfig};
use divert_engine::native::{build_update, compile, MemoryBackend};
use divert_engine::shim::ExecutionContext;
use divert_engine::store::{FileRuleStore, RuleStore};
use divert_engine::tester::test_url;
use divert_engine::{partition, Engine, RuleSnapshot};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "divert")]
#[command(
    author,
    version,
    about = "Compile and test request rules for the native backend and the runtime shim"
)]
struct Args {
    /// Engine configuration file (YAML)
    #[arg(short, long, env = "DIVERT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the directive update the native backend would receive
    Compile {
        /// Rule snapshot (JSON)
        snapshot: PathBuf,
    },
    /// Print the shim working list, in resolution order
    ShimRules {
        /// Rule snapshot (JSON)
        snapshot: PathBuf,
    },
    /// Show every rule matching a URL and what each path would do with it
    Test {
        /// Rule snapshot (JSON)
        snapshot: PathBuf,
        #[arg(short, long)]
        url: String,
        #[arg(short, long, default_value = "GET")]
        method: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    init_tracing(&config.logging);

    match args.command {
        Command::Compile { snapshot } => {
            let snapshot = load_snapshot(&snapshot).await?;
            let partition = partition(&snapshot);
            let compiled = compile(&partition.native, &config.backend);
            info!(
                "Compiled {} directives, skipped {}",
                compiled.directives.len(),
                compiled.skipped.len()
            );
            print_json(&build_update(&[], &compiled))?;
        }
        Command::ShimRules { snapshot } => {
            let snapshot = load_snapshot(&snapshot).await?;
            print_json(&partition(&snapshot).shim)?;
        }
        Command::Test {
            snapshot,
            url,
            method,
        } => {
            let snapshot = load_snapshot(&snapshot).await?;
            let matches = test_url(&snapshot, &url);

            let engine = Engine::new(Arc::new(MemoryBackend::new()), config);
            let context = Arc::new(ExecutionContext::new(None));
            engine.attach(&context);
            if let Err(e) = engine.apply_snapshot(snapshot).await {
                tracing::warn!("Native path unavailable: {}", e);
            }

            let native = engine.backend().evaluate(&url, &method, None);
            let shim = context
                .interceptor()
                .and_then(|interceptor| interceptor.resolve(&url, &method))
                .map(|decision| {
                    json!({
                        "ruleId": decision.rule_id,
                        "ruleName": decision.rule_name,
                        "delayMs": decision.delay().as_millis() as u64,
                        "blocks": decision.plan.request.is_block(),
                        "rewritesUrl": decision.plan.request.rewritten_url(),
                        "mocks": decision.plan.response.mock_response().is_some(),
                    })
                });

            print_json(&json!({
                "url": url,
                "method": method,
                "matches": matches,
                "native": native,
                "shim": shim,
            }))?;
        }
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn load_snapshot(path: &Path) -> Result<RuleSnapshot> {
    if !path.exists() {
        anyhow::bail!("snapshot file not found: {}", path.display());
    }
    FileRuleStore::new(path)
        .load()
        .await
        .with_context(|| format!("failed to read snapshot {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
