mod pipeline;
mod serve;
#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use logroute_ai::remote::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use logroute_ai::router::LEGACY_SOURCE;
use logroute_ai::{ClassifierContext, ModelPaths, RemoteConfig, Router, RouterPolicy};
use logroute_store::DEFAULT_OUTPUT;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::pipeline::DEFAULT_CONCURRENCY;

#[derive(Parser)]
#[command(
    name = "logroute",
    version,
    about = "Classify log lines with regex rules, sentence embeddings, and an LLM fallback"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct GlobalArgs {
    /// Directory holding model.onnx and tokenizer.json.
    #[arg(
        long,
        global = true,
        env = "LOGROUTE_MODEL_DIR",
        default_value = "models/all-MiniLM-L6-v2"
    )]
    model_dir: PathBuf,

    /// Trained predictor artifact (JSON).
    #[arg(
        long,
        global = true,
        env = "LOGROUTE_PREDICTOR",
        default_value = "models/log_classifier.json"
    )]
    predictor: PathBuf,

    /// Source routed only through the LLM classifier.
    #[arg(long, global = true, env = "LOGROUTE_LEGACY_SOURCE", default_value = LEGACY_SOURCE)]
    legacy_source: String,

    /// OpenAI-compatible API root.
    #[arg(long, global = true, env = "LOGROUTE_LLM_BASE_URL", default_value = DEFAULT_BASE_URL)]
    llm_base_url: String,

    #[arg(long, global = true, env = "LOGROUTE_LLM_MODEL", default_value = DEFAULT_MODEL)]
    llm_model: String,

    /// Records classified concurrently.
    #[arg(long, global = true, env = "LOGROUTE_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Classify a CSV with `source` and `log_message` columns.
    Classify {
        input: PathBuf,
        /// Labeled CSV destination [default: resources/output.csv].
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Classify a single log line and print its label.
    ClassifyOne {
        #[arg(long)]
        source: String,
        #[arg(long)]
        message: String,
    },
    /// Serve the HTTP API.
    Serve {
        #[arg(long, env = "LOGROUTE_HOST", default_value = "0.0.0.0")]
        host: String,
        #[arg(long, env = "LOGROUTE_PORT", default_value_t = 8000)]
        port: u16,
        /// Where each labeled upload is also written.
        #[arg(long, default_value = DEFAULT_OUTPUT)]
        output: PathBuf,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Build the shared classifier context and eagerly initialize its stages.
fn build_router(args: &GlobalArgs) -> anyhow::Result<Router> {
    let paths = ModelPaths {
        embedder_dir: args.model_dir.clone(),
        predictor: args.predictor.clone(),
    };
    let remote = RemoteConfig {
        base_url: args.llm_base_url.clone(),
        model: args.llm_model.clone(),
        ..RemoteConfig::default()
    };
    let ctx = ClassifierContext::from_config(paths, remote)
        .context("building classifier context")?;

    let ready = ctx.ensure_initialized();
    info!(
        embedding = ready.embedding,
        remote = ready.remote,
        "classifier stages initialized"
    );

    let policy = RouterPolicy {
        legacy_source: args.legacy_source.clone(),
        ..RouterPolicy::default()
    };
    Ok(Router::with_policy(Arc::new(ctx), policy))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing();
    info!("logroute v{}", env!("CARGO_PKG_VERSION"));

    let router = build_router(&cli.global)?;

    match cli.command {
        Command::Classify { input, output } => {
            let stats =
                pipeline::classify_csv(&router, &input, output.as_deref(), cli.global.concurrency)
                    .await?;
            eprintln!(
                "  Classified {} rows in {:.1}s -> {}",
                stats.total_rows,
                stats.elapsed_secs,
                stats.output.display()
            );
            for (label, count) in &stats.label_counts {
                eprintln!("    {label:<22} {count}");
            }
        }
        Command::ClassifyOne { source, message } => {
            println!("{}", router.route(&source, &message).await);
        }
        Command::Serve { host, port, output } => {
            let addr: SocketAddr = format!("{host}:{port}")
                .parse()
                .with_context(|| format!("invalid listen address {host}:{port}"))?;
            let state = serve::AppState::new(router, cli.global.concurrency, output);
            serve::serve(state, addr).await?;
        }
    }

    Ok(())
}
