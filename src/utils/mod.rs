//! Local file utilities.
//!
//! ## Creating a dated archive
//!
//! ```no_run
//! use s3_dir_backup::utils::compress::{compress_directory, todays_archive_name};
//! use std::path::Path;
//!
//! # fn example() -> s3_dir_backup::error::Result<()> {
//! let archive = compress_directory(Path::new("./data"), Path::new(&todays_archive_name()))?;
//! println!("Created archive: {}", archive.display());
//! # Ok(())
//! # }
//! ```

/// Directory compression and archive naming
pub mod compress;
