use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use rusoto_core::{ByteStream, RusotoError};
use rusoto_s3::{
    AbortMultipartUploadRequest, CompleteMultipartUploadRequest, CompletedMultipartUpload,
    CompletedPart, CreateMultipartUploadRequest, PutObjectRequest, S3Client, UploadPartRequest,
    S3,
};
use tokio::fs::File as AsyncFile;
use tokio::io::AsyncReadExt;

use crate::constants::{LARGE_FILE_THRESHOLD, S3_MAX_PARTS, S3_UPLOAD_CHUNK_SIZE};
use crate::error::{BackupError, Result};

/// Storage key for a local file: the path string exactly as given.
///
/// No basename is taken, so `backups/archive_2024-01-15.zip` is stored
/// under that full key.
pub fn storage_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Size of each multipart part for a file of `file_size` bytes.
///
/// Parts are at least `min_part_size` and grow for very large files so the
/// upload never needs more than [`S3_MAX_PARTS`] parts.
pub fn part_size(file_size: u64, min_part_size: u64) -> u64 {
    let spread = (file_size + S3_MAX_PARTS - 1) / S3_MAX_PARTS;
    min_part_size.max(spread).max(1)
}

/// Number of parts of `part_size` bytes needed for `file_size` bytes
pub fn part_count(file_size: u64, part_size: u64) -> u64 {
    ((file_size + part_size - 1) / part_size).max(1)
}

/// Destination for uploaded files.
///
/// Implementations move the bytes of a local file into `bucket` under
/// `key` and report failures as typed [`BackupError`]s.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()>;
}

/// Amazon S3 (or S3-compatible) object store.
///
/// Small files go up in a single `PutObject`. Files above
/// [`LARGE_FILE_THRESHOLD`] are sent as a sequential multipart upload which
/// is aborted when any part fails. Nothing is retried.
pub struct S3Store {
    client: S3Client,
    multipart_threshold: u64,
    min_part_size: u64,
}

impl S3Store {
    pub fn new(client: S3Client) -> Self {
        Self::with_multipart_limits(client, LARGE_FILE_THRESHOLD, S3_UPLOAD_CHUNK_SIZE as u64)
    }

    /// Store that switches to multipart above `threshold` bytes, with parts
    /// of at least `min_part_size` bytes
    pub fn with_multipart_limits(client: S3Client, threshold: u64, min_part_size: u64) -> Self {
        S3Store {
            client,
            multipart_threshold: threshold,
            min_part_size: min_part_size.max(1),
        }
    }

    /// Upload a small file using PutObject
    async fn put_small_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        let contents = tokio::fs::read(path)
            .await
            .map_err(|e| BackupError::from_io(path, e))?;
        let content_length = contents.len() as i64;

        let request = PutObjectRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_length: Some(content_length),
            body: Some(ByteStream::from(contents)),
            ..Default::default()
        };

        self.client
            .put_object(request)
            .await
            .map_err(|e| classify_rusoto_error(e, bucket, key))?;

        Ok(())
    }

    /// Upload a large file using multipart upload
    async fn put_large_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        file_size: u64,
    ) -> Result<()> {
        let create_result = self
            .client
            .create_multipart_upload(CreateMultipartUploadRequest {
                bucket: bucket.to_string(),
                key: key.to_string(),
                ..Default::default()
            })
            .await
            .map_err(|e| classify_rusoto_error(e, bucket, key))?;

        let upload_id = create_result
            .upload_id
            .ok_or_else(|| BackupError::Storage("No upload ID returned from S3".to_string()))?;

        debug!("Started multipart upload with ID: {} for {}", upload_id, path.display());

        let completed_parts = match self
            .upload_parts(bucket, key, &upload_id, path, file_size)
            .await
        {
            Ok(parts) => parts,
            Err(e) => {
                let abort = self
                    .client
                    .abort_multipart_upload(AbortMultipartUploadRequest {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                        upload_id: upload_id.clone(),
                        ..Default::default()
                    })
                    .await;
                if let Err(abort_err) = abort {
                    warn!("Failed to abort multipart upload {}: {}", upload_id, abort_err);
                }
                return Err(e);
            }
        };

        let complete_request = CompleteMultipartUploadRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id: upload_id.clone(),
            multipart_upload: Some(CompletedMultipartUpload {
                parts: Some(completed_parts),
            }),
            ..Default::default()
        };

        self.client
            .complete_multipart_upload(complete_request)
            .await
            .map_err(|e| classify_rusoto_error(e, bucket, key))?;

        debug!("Completed multipart upload for {}", path.display());
        Ok(())
    }

    /// Read the file front to back and upload each chunk as one part
    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        path: &Path,
        file_size: u64,
    ) -> Result<Vec<CompletedPart>> {
        let mut file = AsyncFile::open(path)
            .await
            .map_err(|e| BackupError::from_io(path, e))?;

        let chunk = part_size(file_size, self.min_part_size);
        let num_parts = part_count(file_size, chunk);
        let mut completed_parts = Vec::with_capacity(num_parts as usize);

        for part_number in 1..=num_parts {
            let start_byte = (part_number - 1) * chunk;
            let end_byte = std::cmp::min(part_number * chunk, file_size);
            let this_part = (end_byte - start_byte) as usize;

            let mut buffer = vec![0u8; this_part];
            file.read_exact(&mut buffer)
                .await
                .map_err(|e| BackupError::from_io(path, e))?;

            let output = self
                .client
                .upload_part(UploadPartRequest {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    upload_id: upload_id.to_string(),
                    part_number: part_number as i64,
                    content_length: Some(this_part as i64),
                    body: Some(ByteStream::from(buffer)),
                    ..Default::default()
                })
                .await
                .map_err(|e| classify_rusoto_error(e, bucket, key))?;

            let e_tag = output
                .e_tag
                .ok_or_else(|| BackupError::Storage("No ETag in upload part response".to_string()))?;

            debug!("Uploaded part {}/{} of {}", part_number, num_parts, key);

            completed_parts.push(CompletedPart {
                e_tag: Some(e_tag),
                part_number: Some(part_number as i64),
            });
        }

        Ok(completed_parts)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| BackupError::from_io(path, e))?;
        let file_size = metadata.len();

        debug!(
            "Starting upload of {} ({} bytes) to s3://{}/{}",
            path.display(),
            file_size,
            bucket,
            key
        );

        if file_size > self.multipart_threshold {
            self.put_large_file(bucket, key, path, file_size).await
        } else {
            self.put_small_file(bucket, key, path).await
        }
    }
}

/// Map a rusoto failure onto the backup error kinds
pub fn classify_rusoto_error<E>(err: RusotoError<E>, bucket: &str, key: &str) -> BackupError
where
    E: std::error::Error + 'static,
{
    match err {
        RusotoError::HttpDispatch(e) => BackupError::Network(e.to_string()),
        RusotoError::Credentials(e) => BackupError::Credentials(e.to_string()),
        RusotoError::Unknown(response) => {
            let message = format!(
                "s3://{}/{}: HTTP {} {}",
                bucket,
                key,
                response.status,
                response.body_as_str()
            );
            error_for_status(response.status.as_u16(), message)
        }
        other => BackupError::Storage(format!("s3://{}/{}: {}", bucket, key, other)),
    }
}

/// Error kind for an unparsed S3 HTTP error response
pub fn error_for_status(status: u16, message: String) -> BackupError {
    match status {
        401 | 403 => BackupError::PermissionDenied(message),
        404 => BackupError::NotFound(message),
        _ => BackupError::Storage(message),
    }
}

/// Sends archives to a bucket through an [`ObjectStore`].
pub struct Uploader<S> {
    store: S,
}

impl<S: ObjectStore> Uploader<S> {
    pub fn new(store: S) -> Self {
        Uploader { store }
    }

    /// Upload `path` to `bucket` under [`storage_key`]`(path)`.
    ///
    /// Failures are logged here and returned to the caller.
    pub async fn upload(&self, path: &Path, bucket: &str) -> Result<()> {
        let key = storage_key(path);
        let start = Instant::now();

        match self.store.put_file(bucket, &key, path).await {
            Ok(()) => {
                info!(
                    "File {} uploaded to bucket {} as {} in {:?}",
                    path.display(),
                    bucket,
                    key,
                    start.elapsed()
                );
                Ok(())
            }
            Err(e) => {
                error!("Failed to upload {} to bucket {}: {}", path.display(), bucket, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use rusoto_core::request::HttpDispatchError;
    use rusoto_credential::CredentialsError;
    use rusoto_core::signature::SignedRequest;
    use rusoto_core::Region;
    use rusoto_mock::{MockCredentialsProvider, MockRequestDispatcher, MultipleMockRequestDispatcher};
    use rusoto_s3::PutObjectError;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const CREATE_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<InitiateMultipartUploadResult>
  <Bucket>my-bucket</Bucket>
  <Key>archive.zip</Key>
  <UploadId>upload-1</UploadId>
</InitiateMultipartUploadResult>"#;

    const COMPLETE_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<CompleteMultipartUploadResult>
  <Location>https://my-bucket.s3.amazonaws.com/archive.zip</Location>
  <Bucket>my-bucket</Bucket>
  <Key>archive.zip</Key>
  <ETag>"final-etag"</ETag>
</CompleteMultipartUploadResult>"#;

    type RequestLog = Arc<Mutex<Vec<String>>>;

    /// Short name for an S3 request as seen by the dispatcher
    fn request_label(req: &SignedRequest) -> String {
        let part = req.params.get("partNumber").cloned().flatten();
        match (req.method(), part) {
            ("PUT", Some(n)) => format!("part {}", n),
            ("PUT", None) => "put".to_string(),
            ("POST", _) if req.params.contains_key("uploads") => "create".to_string(),
            ("POST", _) => "complete".to_string(),
            ("DELETE", _) => "abort".to_string(),
            (other, _) => other.to_string(),
        }
    }

    fn recorded(log: &RequestLog, response: MockRequestDispatcher) -> MockRequestDispatcher {
        let log = Arc::clone(log);
        response.with_request_checker(move |req: &SignedRequest| {
            log.lock().unwrap().push(request_label(req));
        })
    }

    fn mock_store(responses: Vec<MockRequestDispatcher>) -> S3Store {
        let client = S3Client::new_with(
            MultipleMockRequestDispatcher::new(responses),
            MockCredentialsProvider,
            Region::UsEast1,
        );
        // 25 byte files go multipart in 10 byte parts
        S3Store::with_multipart_limits(client, 20, 10)
    }

    fn write_file(dir: &TempDir, len: usize) -> PathBuf {
        let path = dir.path().join("archive.zip");
        std::fs::write(&path, vec![b'x'; len]).unwrap();
        path
    }

    #[test]
    fn test_storage_key_is_full_path() {
        assert_eq!(
            storage_key(Path::new("archive_2024-01-15.zip")),
            "archive_2024-01-15.zip"
        );
        assert_eq!(
            storage_key(Path::new("backups/archive_2024-01-15.zip")),
            "backups/archive_2024-01-15.zip"
        );
    }

    #[test]
    fn test_part_count() {
        let chunk = S3_UPLOAD_CHUNK_SIZE as u64;
        assert_eq!(part_count(chunk - 1, chunk), 1);
        assert_eq!(part_count(chunk, chunk), 1);
        assert_eq!(part_count(chunk + 1, chunk), 2);
        assert_eq!(part_count(chunk * 10, chunk), 10);
        assert_eq!(part_count(LARGE_FILE_THRESHOLD + 1, chunk), 7);
    }

    #[test]
    fn test_part_size_respects_part_limit() {
        let chunk = S3_UPLOAD_CHUNK_SIZE as u64;
        assert_eq!(part_size(LARGE_FILE_THRESHOLD + 1, chunk), chunk);
        assert_eq!(part_size(chunk * S3_MAX_PARTS, chunk), chunk);

        // 100 GiB would need 12,800 parts of 8 MiB
        let huge = 100 * 1024 * 1024 * 1024;
        let size = part_size(huge, chunk);
        assert!(size > chunk);
        assert!(part_count(huge, size) <= S3_MAX_PARTS);

        let odd = chunk * S3_MAX_PARTS + 1;
        assert!(part_count(odd, part_size(odd, chunk)) <= S3_MAX_PARTS);
    }

    #[test]
    fn test_classify_http_dispatch() {
        let err: RusotoError<PutObjectError> =
            RusotoError::HttpDispatch(HttpDispatchError::new("connection refused".to_string()));
        assert!(matches!(
            classify_rusoto_error(err, "b", "k"),
            BackupError::Network(_)
        ));
    }

    #[test]
    fn test_classify_credentials() {
        let err: RusotoError<PutObjectError> =
            RusotoError::Credentials(CredentialsError::new("no credentials"));
        assert!(matches!(
            classify_rusoto_error(err, "b", "k"),
            BackupError::Credentials(_)
        ));
    }

    #[test]
    fn test_error_for_status() {
        assert!(matches!(
            error_for_status(403, "denied".to_string()),
            BackupError::PermissionDenied(_)
        ));
        assert!(matches!(
            error_for_status(401, "unauthorized".to_string()),
            BackupError::PermissionDenied(_)
        ));
        assert!(matches!(
            error_for_status(404, "NoSuchBucket".to_string()),
            BackupError::NotFound(_)
        ));
        let err = error_for_status(500, "s3://my-bucket/archive.zip: HTTP 500".to_string());
        assert!(matches!(err, BackupError::Storage(_)));
        assert!(err.to_string().contains("s3://my-bucket/archive.zip"));
    }

    #[test]
    fn test_classify_validation_is_storage_error() {
        let err: RusotoError<PutObjectError> = RusotoError::Validation("bad key".to_string());
        let backup_err = classify_rusoto_error(err, "my-bucket", "archive.zip");
        assert!(matches!(backup_err, BackupError::Storage(_)));
        assert!(backup_err.to_string().contains("s3://my-bucket/archive.zip"));
    }

    #[tokio::test]
    async fn test_uploader_uses_path_as_key() {
        let mut store = MockObjectStore::new();
        store
            .expect_put_file()
            .with(
                eq("my-bucket"),
                eq("archive_2024-01-15.zip"),
                eq(Path::new("archive_2024-01-15.zip")),
            )
            .times(1)
            .returning(|_, _, _| Ok(()));

        let uploader = Uploader::new(store);
        let result = uploader
            .upload(&PathBuf::from("archive_2024-01-15.zip"), "my-bucket")
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_uploader_propagates_store_error() {
        let mut store = MockObjectStore::new();
        store
            .expect_put_file()
            .times(1)
            .returning(|_, _, _| Err(BackupError::Network("timed out".to_string())));

        let uploader = Uploader::new(store);
        let result = uploader.upload(Path::new("a.zip"), "bucket").await;
        assert!(matches!(result, Err(BackupError::Network(_))));
    }

    #[tokio::test]
    async fn test_s3_store_missing_file() {
        let client = S3Client::new(rusoto_core::Region::UsEast1);
        let store = S3Store::new(client);
        let result = store
            .put_file("test-bucket", "missing.zip", Path::new("/nonexistent/missing.zip"))
            .await;
        assert!(matches!(result, Err(BackupError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_s3_store_small_file_single_put() {
        let log = RequestLog::default();
        let store = mock_store(vec![recorded(
            &log,
            MockRequestDispatcher::with_status(200).with_header("ETag", "\"etag\""),
        )]);
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, 20);

        let result = store.put_file("my-bucket", "archive.zip", &path).await;

        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(*log.lock().unwrap(), vec!["put"]);
    }

    #[tokio::test]
    async fn test_s3_store_multipart_sequence() {
        let log = RequestLog::default();
        let store = mock_store(vec![
            recorded(&log, MockRequestDispatcher::with_status(200).with_body(CREATE_BODY)),
            recorded(&log, MockRequestDispatcher::with_status(200).with_header("ETag", "\"etag-1\"")),
            recorded(&log, MockRequestDispatcher::with_status(200).with_header("ETag", "\"etag-2\"")),
            recorded(&log, MockRequestDispatcher::with_status(200).with_header("ETag", "\"etag-3\"")),
            recorded(&log, MockRequestDispatcher::with_status(200).with_body(COMPLETE_BODY)),
        ]);
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, 25);

        let result = store.put_file("my-bucket", "archive.zip", &path).await;

        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["create", "part 1", "part 2", "part 3", "complete"]
        );
    }

    #[tokio::test]
    async fn test_s3_store_aborts_multipart_on_failed_part() {
        let log = RequestLog::default();
        let store = mock_store(vec![
            recorded(&log, MockRequestDispatcher::with_status(200).with_body(CREATE_BODY)),
            recorded(&log, MockRequestDispatcher::with_status(200).with_header("ETag", "\"etag-1\"")),
            recorded(&log, MockRequestDispatcher::with_status(500).with_body("InternalError")),
            recorded(&log, MockRequestDispatcher::with_status(204)),
        ]);
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, 25);

        let result = store.put_file("my-bucket", "archive.zip", &path).await;

        assert!(matches!(result, Err(BackupError::Storage(_))), "{:?}", result);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["create", "part 1", "part 2", "abort"]
        );
    }
}
