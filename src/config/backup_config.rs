use std::path::PathBuf;

use rusoto_core::Region;

use crate::cli::Args;
use crate::cloud::client::CredentialSource;
use crate::error::{BackupError, Result};

/// Everything one backup run needs, resolved from the command line.
///
/// The region and credentials come from the AWS defaults: the region from
/// `AWS_DEFAULT_REGION`/`AWS_REGION` (else `us-east-1`), the credentials from
/// the default provider chain.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupConfig {
    /// Directory to archive
    pub source: PathBuf,
    /// Destination bucket
    pub bucket: String,
    /// Region of the S3 client
    pub region: Region,
    /// Credential lookup strategy
    pub credentials: CredentialSource,
}

impl BackupConfig {
    /// Build and validate a configuration from parsed arguments
    pub fn from_args(args: &Args) -> Result<Self> {
        let bucket = args.bucket.trim();
        if bucket.is_empty() {
            return Err(BackupError::Config("bucket name must not be empty".to_string()));
        }

        Ok(BackupConfig {
            source: args.dir_path.clone(),
            bucket: bucket.to_string(),
            region: Region::default(),
            credentials: CredentialSource::DefaultChain,
        })
    }
}
