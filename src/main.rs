use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use govr::config::Config;
use govr::domain::DecisionRequest;
use govr::governor::Governor;
use govr::observability::init_tracing;
use govr::storage::build_store;

/// Payload files larger than this are rejected.
const MAX_PAYLOAD_BYTES: u64 = 1 << 20;

#[derive(Debug, Parser)]
#[command(name = "govr")]
#[command(about = "Evaluate a JSON payload against a governance rulepack")]
struct Cli {
    #[command(flatten)]
    config: Config,

    /// Rulepack identifier to evaluate
    #[arg(long, default_value = "default")]
    rulepack: String,

    /// Inline JSON payload to evaluate
    #[arg(long)]
    payload: Option<String>,

    /// Path to a file containing the JSON payload
    #[arg(long)]
    payload_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.config.log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        rulepack = %cli.rulepack,
        offline = cli.config.offline_mode,
        "Starting govr decision run"
    );

    let payload = resolve_payload(&cli)?;

    let store = build_store(&cli.config)?;
    let metrics_enabled = cli.config.metrics_enabled;
    let governor = Governor::new(cli.config, store)?;

    let cancel = CancellationToken::new();
    let result = governor
        .evaluate(&cancel, DecisionRequest::new(cli.rulepack, payload))
        .await?;

    let output = serde_json::json!({
        "allowed": result.allowed,
        "reason": result.reason,
        "latency_ms": result.latency_ms(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    if metrics_enabled {
        let metrics = governor.metrics();
        info!(
            decisions = metrics
                .decisions_total
                .load(std::sync::atomic::Ordering::Relaxed),
            cache_hits = metrics.cache_hits.load(std::sync::atomic::Ordering::Relaxed),
            fetches = metrics
                .fetches_total
                .load(std::sync::atomic::Ordering::Relaxed),
            "run complete"
        );
    }

    governor.close().await?;
    Ok(())
}

/// Resolve the payload from the inline flag or a file; defaults to `{}`.
fn resolve_payload(cli: &Cli) -> anyhow::Result<Vec<u8>> {
    if cli.payload.is_some() && cli.payload_file.is_some() {
        bail!("only one of --payload or --payload-file may be provided");
    }

    let data = if let Some(path) = &cli.payload_file {
        let len = std::fs::metadata(path)
            .with_context(|| format!("stat payload file {}", path.display()))?
            .len();
        if len > MAX_PAYLOAD_BYTES {
            bail!("payload file exceeds {} bytes", MAX_PAYLOAD_BYTES);
        }
        std::fs::read(path).with_context(|| format!("read payload file {}", path.display()))?
    } else {
        cli.payload.clone().unwrap_or_else(|| "{}".to_string()).into_bytes()
    };

    serde_json::from_slice::<Value>(&data).context("payload must be valid JSON")?;
    Ok(data)
}
