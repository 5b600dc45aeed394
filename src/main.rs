use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use tabscrub::config::{Config, MAX_FILE_AGE, SWEEP_INTERVAL};
use tabscrub::gate::PaymentGate;
use tabscrub::pipeline::{clean, CleanOptions, MissingValueStrategy, TextCase};
use tabscrub::server::{start_server, AppState};
use tabscrub::store::{DiskFileStore, FileStore};
use tabscrub::tasks::{spawn_sweeper, sweep_once};
use tabscrub::verify::PaystackVerifier;
use tabscrub::{logging, metrics, parser};

#[derive(Parser)]
#[command(name = "tabscrub")]
#[command(about = "Payment-gated cleaning service for uploaded tabular data")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service (upload, webhook, download)
    Serve {
        /// Listening port (overrides the PORT environment variable)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Clean a local file without the HTTP layer
    Clean {
        /// Input file (csv, tsv, txt or json)
        #[arg(long)]
        input: PathBuf,
        /// Where to write the cleaned CSV; stdout summary only if omitted
        #[arg(long)]
        output: Option<PathBuf>,
        /// Comma-separated columns to keep (all kept if omitted)
        #[arg(long)]
        columns: Option<String>,
        /// Missing-value strategy: fill or drop
        #[arg(long, default_value = "fill")]
        strategy: String,
        /// Keep exact-duplicate rows instead of dropping them
        #[arg(long)]
        keep_duplicates: bool,
        /// Text case: lowercase, uppercase or capitalize
        #[arg(long, default_value = "lowercase")]
        text_format: String,
    },
    /// Run a single age sweep over the scratch directory
    Sweep {
        /// Delete stored files older than this many hours
        #[arg(long, default_value_t = 24)]
        max_age_hours: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Serve { port } => serve(config, port).await?,
        Commands::Clean {
            input,
            output,
            columns,
            strategy,
            keep_duplicates,
            text_format,
        } => {
            clean_local(input, output, columns, &strategy, keep_duplicates, &text_format).await?
        }
        Commands::Sweep { max_age_hours } => {
            let store = DiskFileStore::new(&config.data_dir)?;
            let deleted = sweep_once(&store, Duration::from_secs(max_age_hours * 3600)).await?;
            println!("🧹 Sweep removed {deleted} expired file(s) from {}", config.data_dir.display());
        }
    }
    Ok(())
}

async fn serve(config: Config, port_override: Option<u16>) -> anyhow::Result<()> {
    metrics::init_metrics();

    let secret = config.require_secret()?;
    let store: Arc<dyn FileStore> = Arc::new(DiskFileStore::new(&config.data_dir)?);
    let verifier = Arc::new(PaystackVerifier::new(secret)?);
    let gate = Arc::new(PaymentGate::new(store.clone(), verifier));

    let sweeper = spawn_sweeper(store.clone(), SWEEP_INTERVAL, MAX_FILE_AGE);

    let state = AppState { store, gate };
    let port = port_override.unwrap_or(config.port);
    let result = start_server(state, port).await;

    // The server only returns after the shutdown signal; stop the sweeper
    // before reporting the outcome.
    sweeper.shutdown().await;
    if let Err(e) = result {
        error!(error = %e, "HTTP server failed");
        return Err(e.into());
    }
    Ok(())
}

async fn clean_local(
    input: PathBuf,
    output: Option<PathBuf>,
    columns: Option<String>,
    strategy: &str,
    keep_duplicates: bool,
    text_format: &str,
) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(&input).await?;
    let filename = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let options = CleanOptions {
        columns: columns.map(|raw| {
            raw.split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect()
        }),
        missing: strategy.parse::<MissingValueStrategy>()?,
        dedup: !keep_duplicates,
        text_case: text_format.parse::<TextCase>()?,
    };

    let table = parser::parse_table(&bytes, &filename)?;
    let outcome = clean(table, &options)?;

    println!("\n📊 Cleaning results for {}:", input.display());
    println!("   Original rows: {}", outcome.original_rows);
    println!("   Cleaned rows:  {}", outcome.cleaned_rows);
    println!("   Columns:       {}", outcome.table.headers.join(", "));

    if let Some(path) = output {
        tokio::fs::write(&path, outcome.table.to_csv_bytes()?).await?;
        println!("   Output file:   {}", path.display());
    }
    Ok(())
}
