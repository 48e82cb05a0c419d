use std::fmt;

use log::debug;
use rusoto_core::{HttpClient, Region};
use rusoto_credential::{
    ChainProvider, EnvironmentProvider, InstanceMetadataProvider, ProfileProvider,
    ProvideAwsCredentials,
};
use rusoto_s3::S3Client;

use crate::error::{BackupError, Result};

/// Where AWS credentials are looked up.
///
/// The default chain checks the environment, then the shared credentials
/// file, then container and instance metadata. The other variants pin the
/// lookup to a single source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CredentialSource {
    /// Environment, profile file, container and instance metadata, in order
    #[default]
    DefaultChain,
    /// `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` (and session token)
    Environment,
    /// A named profile from `~/.aws/credentials`
    Profile(String),
    /// The EC2 instance metadata service
    InstanceMetadata,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::DefaultChain => write!(f, "default credential chain"),
            CredentialSource::Environment => write!(f, "environment variables"),
            CredentialSource::Profile(name) => write!(f, "profile '{}'", name),
            CredentialSource::InstanceMetadata => write!(f, "instance metadata"),
        }
    }
}

/// Create an S3 client for the region using the given credential source
pub fn create_s3_client(region: Region, credentials: &CredentialSource) -> Result<S3Client> {
    debug!(
        "Creating S3 client for region {} using {}",
        region.name(),
        credentials
    );

    match credentials {
        CredentialSource::DefaultChain => with_provider(ChainProvider::new(), region),
        CredentialSource::Environment => with_provider(EnvironmentProvider::default(), region),
        CredentialSource::Profile(name) => {
            let mut provider = ProfileProvider::new().map_err(|e| {
                BackupError::Credentials(format!("failed to load AWS profiles: {}", e))
            })?;
            provider.set_profile(name.as_str());
            with_provider(provider, region)
        }
        CredentialSource::InstanceMetadata => {
            with_provider(InstanceMetadataProvider::new(), region)
        }
    }
}

fn with_provider<P>(provider: P, region: Region) -> Result<S3Client>
where
    P: ProvideAwsCredentials + Send + Sync + 'static,
{
    let http_client = HttpClient::new()
        .map_err(|e| BackupError::Network(format!("failed to create HTTP client: {}", e)))?;
    Ok(S3Client::new_with(http_client, provider, region))
}
