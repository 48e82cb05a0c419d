use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for s3-dir-backup
#[derive(Parser, Debug)]
#[clap(name = "s3-dir-backup", about = "Sync the directory to S3")]
pub struct Args {
    /// Path to the directory to compress and upload
    pub dir_path: PathBuf,

    /// Name of the S3 bucket
    #[clap(short, long)]
    pub bucket: String,
}
