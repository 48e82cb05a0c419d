//! # s3-dir-backup
//!
//! Backs up a local directory to S3 (or any S3-compatible object store).
//!
//! ## Overview
//!
//! A run is three sequential steps:
//!
//! 1. **Compress** the directory into `archive_<YYYY-MM-DD>.zip` in the
//!    working directory
//! 2. **Upload** the archive to the bucket, keyed by its local path
//! 3. **Clean up** the local archive, whether or not the upload succeeded
//!
//! Each step's result is collected in a [`pipeline::RunReport`] which also
//! decides the process exit code.
//!
//! ## Usage
//!
//! ```no_run
//! use rusoto_core::Region;
//! use s3_dir_backup::cloud::client::{create_s3_client, CredentialSource};
//! use s3_dir_backup::cloud::s3::{S3Store, Uploader};
//! use s3_dir_backup::pipeline::BackupPipeline;
//! use std::path::Path;
//!
//! # async fn example() -> s3_dir_backup::error::Result<()> {
//! let client = create_s3_client(Region::default(), &CredentialSource::DefaultChain)?;
//! let pipeline = BackupPipeline::new(Uploader::new(S3Store::new(client)));
//!
//! let report = pipeline.run(Path::new("./data"), "my-bucket").await;
//! println!("exit code {}", report.exit_code());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`cli`]: Command-line interface definitions and argument parsing
//! - [`config`]: Run configuration resolved from the command line
//! - [`utils`]: Directory compression and archive naming
//! - [`cloud`]: S3 client construction and uploads
//! - [`pipeline`]: The compress → upload → cleanup run
//! - [`error`]: Typed error kinds and exit codes
//! - [`constants`]: Application-wide constants

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Run configuration
pub mod config;

/// Directory compression and archive naming
pub mod utils;

/// Cloud storage integration (S3)
pub mod cloud;

/// Backup orchestration
pub mod pipeline;

/// Error types
pub mod error;

/// Application constants and configuration values
pub mod constants;
