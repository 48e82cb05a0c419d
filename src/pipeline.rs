//! The backup run: compress, upload, clean up.
//!
//! ```text
//! START → COMPRESS ─ok─→ UPLOAD ─ok/err─→ CLEANUP → END
//!            └──err──→ END
//! ```
//!
//! A failed compression ends the run. A failed upload still removes the
//! local archive. A failed removal is logged but does not change the
//! outcome of the run.

use std::fs;
use std::path::{Path, PathBuf};

use log::{error, info};

use crate::cloud::s3::{ObjectStore, Uploader};
use crate::error::{BackupError, Result};
use crate::utils::compress::{compress_directory, todays_archive_name};

/// Outcome of every step of one run
#[derive(Debug)]
pub struct RunReport {
    /// Where the archive was (or would have been) written
    pub archive: PathBuf,
    /// Result of compressing the source directory
    pub compression: Result<()>,
    /// Result of the upload, `None` when compression failed
    pub upload: Option<Result<()>>,
    /// Result of removing the local archive, `None` when compression failed
    pub cleanup: Option<Result<()>>,
}

impl RunReport {
    /// The error that decides the outcome of the run, if any.
    ///
    /// Cleanup errors are never returned here.
    pub fn error(&self) -> Option<&BackupError> {
        if let Err(e) = &self.compression {
            return Some(e);
        }
        match &self.upload {
            Some(Err(e)) => Some(e),
            _ => None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error().is_none()
    }

    /// Process exit code: 0 on success, otherwise the code of the failing step
    pub fn exit_code(&self) -> i32 {
        self.error().map(BackupError::exit_code).unwrap_or(0)
    }
}

/// Runs one backup of a directory into a bucket
pub struct BackupPipeline<S> {
    uploader: Uploader<S>,
    archive_path: PathBuf,
}

impl<S: ObjectStore> BackupPipeline<S> {
    /// Pipeline writing today's archive (`archive_<YYYY-MM-DD>.zip`) in the
    /// working directory
    pub fn new(uploader: Uploader<S>) -> Self {
        BackupPipeline {
            uploader,
            archive_path: PathBuf::from(todays_archive_name()),
        }
    }

    /// Write the archive somewhere else. The path is also the storage key.
    pub fn with_archive_path(mut self, archive_path: impl Into<PathBuf>) -> Self {
        self.archive_path = archive_path.into();
        self
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Back up `source` into `bucket`.
    ///
    /// Every step's error is logged and kept in the returned report; this
    /// never bails out early except after a failed compression.
    pub async fn run(&self, source: &Path, bucket: &str) -> RunReport {
        info!("Starting backup of {} to bucket {}", source.display(), bucket);

        let archive = match compress_directory(source, &self.archive_path) {
            Ok(archive) => archive,
            Err(e) => {
                error!("Error in compressing the directory: {}", e);
                return RunReport {
                    archive: self.archive_path.clone(),
                    compression: Err(e),
                    upload: None,
                    cleanup: None,
                };
            }
        };

        let upload = self.uploader.upload(&archive, bucket).await;
        match &upload {
            Ok(()) => info!("Backup process completed successfully."),
            Err(_) => error!("Failed to upload the archive."),
        }

        let cleanup = remove_archive(&archive);

        RunReport {
            archive,
            compression: Ok(()),
            upload: Some(upload),
            cleanup: Some(cleanup),
        }
    }
}

fn remove_archive(archive: &Path) -> Result<()> {
    match fs::remove_file(archive) {
        Ok(()) => {
            info!("Temporary file {} removed.", archive.display());
            Ok(())
        }
        Err(e) => {
            let err = BackupError::from_io(archive, e);
            error!("Error removing temporary file: {}", err);
            Err(err)
        }
    }
}
