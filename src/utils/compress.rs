use std::fs::{self, File, Metadata};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};
use std::time::{Instant, SystemTime};

use chrono::{DateTime, Datelike, Local, NaiveDate, Timelike};
use log::{debug, error, info, warn};
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::{write::FileOptions, CompressionMethod, DateTime as ZipDateTime, ZipWriter};

use crate::constants::{
    ARCHIVE_DATE_FORMAT, ARCHIVE_EXTENSION, ARCHIVE_PREFIX,
    COMPRESSED_EXTENSIONS, DEFAULT_COMPRESSION_LEVEL, FAST_COMPRESSION_LEVEL,
    LARGE_FILE_COMPRESSION_THRESHOLD, ZIP64_THRESHOLD,
};
use crate::error::{BackupError, Result};

/// Archive file name for the given calendar date.
///
/// The name only depends on the date, so two runs on the same day produce
/// the same name and the second one overwrites the first.
///
/// ```
/// # use chrono::NaiveDate;
/// # use s3_dir_backup::utils::compress::archive_name;
/// let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
/// assert_eq!(archive_name(date), "archive_2024-01-15.zip");
/// ```
pub fn archive_name(date: NaiveDate) -> String {
    format!(
        "{}{}.{}",
        ARCHIVE_PREFIX,
        date.format(ARCHIVE_DATE_FORMAT),
        ARCHIVE_EXTENSION
    )
}

/// Archive file name for today's local date
pub fn todays_archive_name() -> String {
    archive_name(Local::now().date_naive())
}

/// Name of the archive entry for a walked path.
///
/// The path is recorded as it was reached from the source argument, not
/// relative to the source root: `./data/a.txt` becomes `data/a.txt` and
/// `/srv/data/a.txt` becomes `srv/data/a.txt`. Root, drive prefix and `.`
/// components are dropped and `..` removes the component before it.
pub fn entry_name(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut absolute = false;

    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => match parts.last() {
                Some(last) if last != ".." => {
                    parts.pop();
                }
                // ".." directly under the root is the root itself
                None if absolute => {}
                _ => parts.push("..".to_string()),
            },
            Component::RootDir | Component::Prefix(_) => absolute = true,
            Component::CurDir => {}
        }
    }

    parts.join("/")
}

/// Deflate level for a file of the given size.
///
/// Files that are already compressed (like JPEGs, MP3s) or very large files
/// use the fastest level since a higher one buys almost nothing.
pub fn compression_level(path: &Path, size: u64) -> i32 {
    let low_compression = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => COMPRESSED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    };

    if low_compression || size > LARGE_FILE_COMPRESSION_THRESHOLD {
        FAST_COMPRESSION_LEVEL
    } else {
        DEFAULT_COMPRESSION_LEVEL
    }
}

/// ZIP modification time for a file's mtime, in local time.
///
/// ZIP timestamps only cover 1980 to 2107; anything outside that range is
/// recorded as the ZIP epoch (1980-01-01 00:00).
pub fn zip_timestamp(modified: SystemTime) -> ZipDateTime {
    let local: DateTime<Local> = modified.into();
    let year = match u16::try_from(local.year()) {
        Ok(year) => year,
        Err(_) => return ZipDateTime::default(),
    };

    ZipDateTime::from_date_and_time(
        year,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .unwrap_or_default()
}

/// ZIP options for a file, keeping its mode bits and modification time
pub fn get_compression_options(path: &Path, metadata: &Metadata) -> FileOptions {
    let size = metadata.len();
    let mut options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(compression_level(path, size)))
        .large_file(size >= ZIP64_THRESHOLD);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        options = options.unix_permissions(metadata.permissions().mode());
    }

    match metadata.modified() {
        Ok(modified) => options.last_modified_time(zip_timestamp(modified)),
        Err(e) => {
            debug!("No modification time for {}: {}", path.display(), e);
            options
        }
    }
}

/// Compress every file below `source` into a ZIP archive at `destination`.
///
/// Any existing file at `destination` is overwritten. If the walk or a write
/// fails, the partially written archive is removed before the error is
/// returned, so a failed call never leaves an archive behind.
///
/// # Arguments
///
/// * `source` - Directory to archive, walked recursively
/// * `destination` - Path of the archive to create
///
/// # Returns
///
/// * `Ok(PathBuf)` - Path to the created archive (`destination`)
/// * `Err` - If the source cannot be read or the archive cannot be written
///
/// # Example
///
/// ```no_run
/// # use std::path::Path;
/// # use s3_dir_backup::utils::compress::{compress_directory, todays_archive_name};
/// let archive = compress_directory(Path::new("./data"), Path::new(&todays_archive_name()))?;
/// # Ok::<(), s3_dir_backup::error::BackupError>(())
/// ```
pub fn compress_directory(source: &Path, destination: &Path) -> Result<PathBuf> {
    let start = Instant::now();
    info!("Compressing {} to {}", source.display(), destination.display());

    let result = create_archive(source, destination);

    match result {
        Ok(count) => {
            info!(
                "Directory {} compressed to {} ({} files in {:?})",
                source.display(),
                destination.display(),
                count,
                start.elapsed()
            );
            Ok(destination.to_path_buf())
        }
        Err(e) => {
            error!("Failed to compress {}: {}", source.display(), e);
            Err(e)
        }
    }
}

/// Validate the source, create the archive and write it, cleaning up on failure
fn create_archive(source: &Path, destination: &Path) -> Result<usize> {
    let metadata = fs::metadata(source).map_err(|e| BackupError::from_io(source, e))?;
    if !metadata.is_dir() {
        return Err(BackupError::NotFound(format!(
            "{} is not a directory",
            source.display()
        )));
    }

    let zip_file = File::create(destination).map_err(|e| BackupError::from_io(destination, e))?;

    match write_archive(source, destination, zip_file) {
        Ok(count) => Ok(count),
        Err(e) => {
            if let Err(rm_err) = fs::remove_file(destination) {
                warn!(
                    "Failed to remove partial archive {}: {}",
                    destination.display(),
                    rm_err
                );
            }
            Err(e)
        }
    }
}

/// Walk `source` and stream every file into the archive. Returns the number
/// of entries written.
fn write_archive(source: &Path, destination: &Path, zip_file: File) -> Result<usize> {
    // The archive may live inside the directory being archived
    let destination_canonical = fs::canonicalize(destination).ok();

    let mut zip = ZipWriter::new(zip_file);
    let mut count = 0;

    let walker = WalkDir::new(source).sort_by(|a, b| a.file_name().cmp(b.file_name()));

    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();

        // fs::metadata follows symlinks so linked files are archived by content
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if entry.path_is_symlink() => {
                warn!("Skipping dangling symlink {}: {}", path.display(), e);
                continue;
            }
            Err(e) => return Err(BackupError::from_io(path, e)),
        };

        if !metadata.is_file() {
            debug!("Skipping {} (not a regular file)", path.display());
            continue;
        }

        if is_archive_itself(path, destination_canonical.as_deref()) {
            debug!("Skipping the archive being written: {}", path.display());
            continue;
        }

        let name = entry_name(path);
        let options = get_compression_options(path, &metadata);

        zip.start_file(name.clone(), options)
            .map_err(|e| zip_error(path, e))?;

        let file = File::open(path).map_err(|e| BackupError::from_io(path, e))?;
        let mut reader = BufReader::new(file);
        io::copy(&mut reader, &mut zip).map_err(|e| BackupError::from_io(path, e))?;

        debug!("Added {} ({} bytes)", name, metadata.len());
        count += 1;
    }

    let file = zip.finish().map_err(|e| zip_error(destination, e))?;
    file.sync_all()
        .map_err(|e| BackupError::from_io(destination, e))?;

    Ok(count)
}

fn is_archive_itself(path: &Path, destination: Option<&Path>) -> bool {
    let destination = match destination {
        Some(destination) => destination,
        None => return false,
    };

    if path.file_name() != destination.file_name() {
        return false;
    }

    fs::canonicalize(path)
        .map(|canonical| canonical == destination)
        .unwrap_or(false)
}

fn zip_error(path: &Path, err: ZipError) -> BackupError {
    match err {
        ZipError::Io(io_err) => BackupError::from_io(path, io_err),
        other => BackupError::Archive(format!("{}: {}", path.display(), other)),
    }
}
