use anyhow::Result;
use artcc_sync::config::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser)]
#[command(name = "artcc-sync")]
#[command(version, about = "Keeps one ARTCC's online traffic and PIREPs in sync with VATSIM")]
struct Cli {
    /// Region TOML file (falls back to REGION_FILE, ./region.toml, then the built-in ZAB region)
    #[arg(long, global = true)]
    region: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the online poll and PIREP ingestion loops until interrupted
    Run,
    /// Run one online polling cycle and exit
    PollOnce {
        /// Keep the working set in memory and log events instead of using Redis/NATS
        #[arg(long)]
        no_broker: bool,
    },
    /// Run one PIREP ingestion cycle and exit
    PirepsOnce,
    /// Apply pending database migrations
    Migrate,
    /// Validate the region file and optionally test a point
    CheckRegion {
        #[arg(long, requires = "lon", allow_negative_numbers = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lon: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let _sentry = artcc_sync::telemetry::init_tracing("artcc-sync");

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => commands::handle_run(Config::from_env()?, cli.region).await,
        Commands::PollOnce { no_broker } => {
            commands::handle_poll_once(Config::from_env()?, cli.region, no_broker).await
        }
        Commands::PirepsOnce => commands::handle_pireps_once(Config::from_env()?, cli.region).await,
        Commands::Migrate => commands::handle_migrate(Config::from_env()?).await,
        Commands::CheckRegion { lat, lon } => {
            let region_file = cli
                .region
                .or_else(|| std::env::var_os("REGION_FILE").map(PathBuf::from));
            commands::handle_check_region(region_file, lat.zip(lon)).await
        }
    }
}
