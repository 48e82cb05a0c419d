//! Cloud storage integration for archive uploads.
//!
//! ## Usage Example
//!
//! ```no_run
//! use rusoto_core::Region;
//! use s3_dir_backup::cloud::client::{create_s3_client, CredentialSource};
//! use s3_dir_backup::cloud::s3::{S3Store, Uploader};
//! use std::path::Path;
//!
//! # async fn example() -> s3_dir_backup::error::Result<()> {
//! let client = create_s3_client(Region::UsEast1, &CredentialSource::DefaultChain)?;
//! let uploader = Uploader::new(S3Store::new(client));
//!
//! uploader.upload(Path::new("archive_2024-01-15.zip"), "my-bucket").await?;
//! # Ok(())
//! # }
//! ```

/// S3 client construction and credential sources
pub mod client;

/// Object store abstraction and the S3 uploader
pub mod s3;
