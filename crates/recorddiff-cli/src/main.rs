//! recorddiff CLI - row-level diff of two tables across database engines.

use clap::{Parser, Subcommand};
use recorddiff::{Config, Differ};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recorddiff")]
#[command(about = "Row-level diff of two tables across database engines")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON report to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare the configured table pairs
    Run {
        /// Override rows per transfer batch
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Test both database connections
    HealthCheck,
}

fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.verbosity.clone()));

    match cli.log_format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> recorddiff::Result<ExitCode> {
    let mut config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Run { batch_size } => {
            if let Some(batch_size) = batch_size {
                config.diff.batch_size = batch_size;
            }
            config.validate()?;

            let differ = Differ::new(config).await?;
            let report = differ.run().await?;
            differ.close().await;

            info!(
                "Run complete: {} pair(s), {} ok, {} failed",
                report.pairs_total, report.pairs_ok, report.pairs_failed
            );

            if cli.output_json {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{}", json),
                    Err(e) => error!("Failed to serialize report: {}", e),
                }
            } else {
                for pair in &report.pairs {
                    match (&pair.result, &pair.error) {
                        (Some(result), _) => {
                            info!(
                                "{} vs {}: appeared {} / disappeared {}",
                                pair.source_table,
                                pair.target_table,
                                result.appeared.summary(),
                                result.disappeared.summary()
                            );
                        }
                        (None, Some(err)) => {
                            error!("{} vs {}: {}", pair.source_table, pair.target_table, err);
                        }
                        (None, None) => {}
                    }
                }
            }

            if report.all_ok() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(1))
            }
        }
        Commands::HealthCheck => {
            config.validate()?;
            let differ = Differ::new(config).await?;
            differ.close().await;
            info!("Both connections healthy");
            println!("ok");
            Ok(ExitCode::SUCCESS)
        }
    }
}
