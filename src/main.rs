use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use tokio::runtime::Builder;

use s3_dir_backup::cli::Args;
use s3_dir_backup::cloud::client::create_s3_client;
use s3_dir_backup::cloud::s3::{S3Store, Uploader};
use s3_dir_backup::config::BackupConfig;
use s3_dir_backup::error::BackupError;
use s3_dir_backup::pipeline::BackupPipeline;

fn main() -> Result<()> {
    // Parse arguments; a missing --bucket exits here with a usage error
    let args = Args::parse();

    let config = match BackupConfig::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(e.exit_code());
        }
    };

    initialize_logging(LevelFilter::Info)?;

    // Single-threaded: the upload is the only async work and nothing is spawned
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;

    let exit_code = runtime.block_on(run_backup(&config));
    if exit_code != 0 {
        process::exit(exit_code);
    }

    Ok(())
}

/// Initialize terminal logging at the given level
fn initialize_logging(log_level: LevelFilter) -> Result<()> {
    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")?;
    Ok(())
}

/// Build the S3 client, run the pipeline and return the process exit code
async fn run_backup(config: &BackupConfig) -> i32 {
    info!(
        "Using region {} with {}",
        config.region.name(),
        config.credentials
    );

    let client = match create_s3_client(config.region.clone(), &config.credentials) {
        Ok(client) => client,
        Err(e) => return report_setup_error(e),
    };

    let pipeline = BackupPipeline::new(Uploader::new(S3Store::new(client)));
    let report = pipeline.run(&config.source, &config.bucket).await;

    report.exit_code()
}

fn report_setup_error(e: BackupError) -> i32 {
    error!("Failed to create S3 client: {}", e);
    e.exit_code()
}
