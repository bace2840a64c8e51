use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod bench;
mod load;
mod verify;

#[derive(Debug, Parser)]
#[command(name = "awbench")]
#[command(about = "PostgreSQL vs MongoDB benchmark harness for product pricing data")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Bulk load the CSV dataset into one of the stores
    Load {
        #[command(subcommand)]
        target: LoadTarget,
    },
    /// Run the head-to-head benchmark and write the report artifacts
    Bench {
        /// Timed repetitions per query on each backend
        #[arg(long, default_value_t = 3)]
        iterations: u32,
        /// Benchmark against already-loaded data instead of reloading
        #[arg(long)]
        skip_load: bool,
        #[arg(long, default_value = "benchmark_data.json")]
        out_json: PathBuf,
        #[arg(long, default_value = "benchmark_results.png")]
        out_chart: PathBuf,
    },
    /// Check connectivity and report row/document counts on both stores
    Verify,
}

#[derive(Debug, Subcommand)]
enum LoadTarget {
    /// COPY the CSVs into PostgreSQL
    Postgres {
        /// Directory with the input CSVs, overriding AWBENCH_DATA_DIR
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Create tables and indexes before loading
        #[arg(long)]
        ensure_schema: bool,
    },
    /// Build embedded-array documents and insert them into MongoDB
    Mongo {
        /// Directory with the input CSVs, overriding AWBENCH_DATA_DIR
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = awbench_core::load_app_config_from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Load { target } => match target {
            LoadTarget::Postgres {
                data_dir,
                ensure_schema,
            } => {
                let dir = data_dir.unwrap_or_else(|| config.data_dir.clone());
                load::run_load_postgres(&config, &dir, ensure_schema).await
            }
            LoadTarget::Mongo { data_dir } => {
                let dir = data_dir.unwrap_or_else(|| config.data_dir.clone());
                load::run_load_mongo(&config, &dir).await
            }
        },
        Commands::Bench {
            iterations,
            skip_load,
            out_json,
            out_chart,
        } => bench::run_bench(&config, iterations, skip_load, &out_json, &out_chart).await,
        Commands::Verify => verify::run_verify(&config).await,
    }
}
