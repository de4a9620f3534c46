//! commentlens command-line entry point.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commentlens::config::AppConfig;
use commentlens::models::OrderMode;
use commentlens::pipeline;
use commentlens::repository::RunStore;
use commentlens::server;
use commentlens::youtube;

#[derive(Parser)]
#[command(
    name = "commentlens",
    about = "YouTube comment collection and audience portrait system",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP dispatch server.
    Serve {
        /// Bind host (overrides configuration).
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides configuration).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Collect comment threads for a video URL into a new run.
    Collect {
        /// YouTube video URL.
        url: String,
        /// Sort order: hot (relevance) or time (latest).
        #[arg(long, default_value = "hot")]
        order: String,
        /// Total comment threads to fetch.
        #[arg(long)]
        max_results: Option<i64>,
        /// Only parse the URL and print the video id, no API call.
        #[arg(long)]
        dry_run: bool,
    },
    /// Normalize the raw threads of a run into clean comments.
    Clean {
        /// Collection run id (default: latest).
        #[arg(long)]
        run_id: Option<i64>,
    },
    /// Generate an audience portrait for a run.
    Portrait {
        /// Collection run id (default: latest).
        #[arg(long)]
        run_id: Option<i64>,
        /// Regenerate even if a portrait already exists.
        #[arg(long)]
        overwrite: bool,
    },
    /// List collection runs, newest first.
    Runs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { host, port } => {
            config.ensure_directories()?;
            let host = host.unwrap_or_else(|| config.host.clone());
            let port = port.unwrap_or(config.port);
            server::serve(config, &host, port).await?;
        }
        Command::Collect {
            url,
            order,
            max_results,
            dry_run,
        } => {
            if dry_run {
                println!("{}", youtube::parse_video_id(&url)?);
                return Ok(());
            }
            let order = OrderMode::parse(&order)?;
            let max = max_results.unwrap_or(config.youtube.default_max_comments);
            let (run_id, video_id, raw_count) =
                pipeline::collect(&config, &url, order, max).await?;
            println!("Collected. run_id={run_id} video_id={video_id} raw_count={raw_count}");
        }
        Command::Clean { run_id } => {
            let run_id = resolve_run_id(&config, run_id)?;
            let count = pipeline::clean_run(&config, run_id)?;
            println!("Clean done. run_id={run_id} inserted_or_ignored={count}");
        }
        Command::Portrait { run_id, overwrite } => {
            let run_id = resolve_run_id(&config, run_id)?;
            let result = pipeline::generate_portrait(&config, run_id, overwrite).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Runs => {
            let store = RunStore::open(&config.database_path())?;
            for run in store.list_collection_runs()? {
                println!(
                    "{}\t{}\t{}\t{}\tmax={}",
                    run.run_id, run.collected_at, run.video_id, run.order_mode, run.max_comments
                );
            }
        }
    }

    Ok(())
}

fn resolve_run_id(config: &AppConfig, requested: Option<i64>) -> anyhow::Result<i64> {
    if let Some(id) = requested {
        anyhow::ensure!(id > 0, "run_id must be a positive integer");
        return Ok(id);
    }
    let store = RunStore::open(&config.database_path())?;
    store
        .latest_run_id()?
        .ok_or_else(|| anyhow::anyhow!("no collection runs found; run collection first"))
}
