//! Global constants for the s3-dir-backup application.
//!
//! This module centralizes all hardcoded values to improve maintainability
//! and make configuration changes easier.

// Archive naming
/// Prefix of every archive file name
pub const ARCHIVE_PREFIX: &str = "archive_";

/// Extension of every archive file name
pub const ARCHIVE_EXTENSION: &str = "zip";

/// `chrono` format string for the date part of the archive name
pub const ARCHIVE_DATE_FORMAT: &str = "%Y-%m-%d";

// Compression constants
/// Files larger than this are compressed with the fastest level (100MB)
pub const LARGE_FILE_COMPRESSION_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Entries at or above this size need ZIP64 headers (4GB)
pub const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// Deflate level for regular files
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 6;

/// Deflate level for already-compressed or very large files
pub const FAST_COMPRESSION_LEVEL: i32 = 1;

/// File extensions that are already compressed
pub const COMPRESSED_EXTENSIONS: &[&str] = &[
    "zip", "gz", "xz", "bz2", "7z", "rar", "zst",
    "jpg", "jpeg", "png", "gif", "webp",
    "mp3", "mp4", "avi", "mov", "mpg", "mpeg", "mkv",
];

// Cloud storage constants
/// S3 upload chunk size (8MB, S3 minimum is 5MB)
pub const S3_UPLOAD_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Large file threshold for multipart uploads (50MB)
pub const LARGE_FILE_THRESHOLD: u64 = 50 * 1024 * 1024;

/// Maximum number of parts in one S3 multipart upload
pub const S3_MAX_PARTS: u64 = 10_000;

// Exit codes
/// Generic failure
pub const EXIT_FAILURE: i32 = 1;

/// Invalid arguments or configuration (matches clap's usage error code)
pub const EXIT_USAGE: i32 = 2;

/// A file, directory or bucket does not exist
pub const EXIT_NOT_FOUND: i32 = 3;

/// Access to a local path or remote bucket was refused
pub const EXIT_PERMISSION_DENIED: i32 = 4;

/// The storage service could not be reached
pub const EXIT_NETWORK: i32 = 5;

/// No usable AWS credentials were found
pub const EXIT_CREDENTIALS: i32 = 6;
