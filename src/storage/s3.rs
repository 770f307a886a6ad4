use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use std::future::Future;
use std::path::Path;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::{ObjectStore, StorageError, StorageObject, StorageResult};
use crate::config::AwsConfig;
use crate::extractors::MediaStream;
use crate::utils::format_file_size;

/// Part size for multipart uploads (S3 requires at least 5MB for every part but the last)
const PART_SIZE: usize = 8 * 1024 * 1024;

/// S3 storage implementation
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

/// Object-write calls a streaming upload is built from
#[cfg_attr(test, mockall::automock)]
#[async_trait]
trait PartSink: Send + Sync {
    /// Single-shot write for objects smaller than one part
    async fn put_object(&self, key: &str, content_type: &str, data: Bytes) -> StorageResult<()>;

    /// Start a multipart upload, returning its id
    async fn create_multipart(&self, key: &str, content_type: &str) -> StorageResult<String>;

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> StorageResult<CompletedPart>;

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> StorageResult<()>;

    /// Discard every uploaded part so no partial object survives
    async fn abort_multipart(&self, key: &str, upload_id: &str);
}

/// Multipart upload in progress, created lazily once a full part is buffered
#[derive(Default)]
struct MultipartState {
    upload_id: Option<String>,
    parts: Vec<CompletedPart>,
}

impl S3Store {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a store from the shared AWS configuration.
    ///
    /// A custom `endpoint_url` switches to path-style addressing for S3-compatible providers
    /// (MinIO and friends).
    pub fn from_config(sdk_config: &aws_config::SdkConfig, aws: &AwsConfig) -> Self {
        let client = match &aws.endpoint_url {
            Some(endpoint) => {
                let s3_config = aws_sdk_s3::config::Builder::from(sdk_config)
                    .endpoint_url(endpoint)
                    .force_path_style(true)
                    .build();
                Client::from_conf(s3_config)
            }
            None => Client::new(sdk_config),
        };

        Self::new(client, aws.s3_bucket.clone())
    }
}

#[async_trait]
impl PartSink for S3Store {
    async fn put_object(&self, key: &str, content_type: &str, data: Bytes) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::Upload(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }

    async fn create_multipart(&self, key: &str, content_type: &str) -> StorageResult<String> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                StorageError::Upload(format!(
                    "Failed to create multipart upload: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        created
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| StorageError::Upload("No upload ID returned from S3".to_string()))
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> StorageResult<CompletedPart> {
        let uploaded = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                StorageError::Upload(format!(
                    "Failed to upload part {}: {}",
                    part_number,
                    DisplayErrorContext(&e)
                ))
            })?;

        let etag = uploaded
            .e_tag()
            .ok_or_else(|| StorageError::Upload(format!("No ETag returned for part {}", part_number)))?;

        Ok(CompletedPart::builder()
            .part_number(part_number)
            .e_tag(etag)
            .build())
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> StorageResult<()> {
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| {
                StorageError::Upload(format!(
                    "Failed to complete multipart upload: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        Ok(())
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) {
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
        {
            tracing::warn!(
                error = %DisplayErrorContext(&e),
                bucket = %self.bucket,
                key = %key,
                upload_id = %upload_id,
                "Failed to abort multipart upload"
            );
        }
    }
}

/// Drain `stream` into `key` through `sink`, `part_size` bytes at a time.
///
/// Anything already sent is aborted when the source fails, a write fails or `cancel` fires.
async fn upload_stream(
    sink: &dyn PartSink,
    key: &str,
    content_type: &str,
    mut stream: MediaStream,
    cancel: &CancellationToken,
    part_size: usize,
) -> StorageResult<u64> {
    let mut state = MultipartState::default();

    match drain(sink, key, content_type, &mut stream, cancel, part_size, &mut state).await {
        Ok(size) => Ok(size),
        Err(e) => {
            // Stop the producer before discarding what it already sent
            drop(stream);
            if let Some(upload_id) = state.upload_id.take() {
                sink.abort_multipart(key, &upload_id).await;
            }
            Err(e)
        }
    }
}

async fn drain(
    sink: &dyn PartSink,
    key: &str,
    content_type: &str,
    stream: &mut MediaStream,
    cancel: &CancellationToken,
    part_size: usize,
    state: &mut MultipartState,
) -> StorageResult<u64> {
    let mut buffer = BytesMut::new();
    let mut total_size = 0u64;

    loop {
        let next = cancellable(cancel, async { Ok::<_, StorageError>(stream.next().await) }).await?;

        match next {
            Some(Ok(chunk)) => {
                total_size += chunk.len() as u64;
                buffer.extend_from_slice(&chunk);

                while buffer.len() >= part_size {
                    let part = buffer.split_to(part_size).freeze();
                    cancellable(cancel, send_part(sink, key, content_type, state, part)).await?;
                }
            }
            Some(Err(e)) => return Err(StorageError::Source(e.to_string())),
            None => break,
        }
    }

    // Once the source is exhausted the write is finished regardless of cancellation
    match state.upload_id.clone() {
        Some(upload_id) => {
            if !buffer.is_empty() {
                send_part(sink, key, content_type, state, buffer.freeze()).await?;
            }
            sink.complete_multipart(key, &upload_id, std::mem::take(&mut state.parts))
                .await?;
            state.upload_id = None;
        }
        None => sink.put_object(key, content_type, buffer.freeze()).await?,
    }

    Ok(total_size)
}

/// Upload one part, opening the multipart upload on first use
async fn send_part(
    sink: &dyn PartSink,
    key: &str,
    content_type: &str,
    state: &mut MultipartState,
    data: Bytes,
) -> StorageResult<()> {
    let upload_id = match &state.upload_id {
        Some(id) => id.clone(),
        None => {
            let id = sink.create_multipart(key, content_type).await?;
            state.upload_id = Some(id.clone());
            id
        }
    };

    let part_number = state.parts.len() as i32 + 1;
    let part = sink.upload_part(key, &upload_id, part_number, data).await?;
    state.parts.push(part);

    Ok(())
}

#[async_trait]
impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_stream(
        &self,
        key: &str,
        content_type: &str,
        stream: MediaStream,
        cancel: &CancellationToken,
    ) -> StorageResult<StorageObject> {
        let start = Instant::now();

        match upload_stream(self, key, content_type, stream, cancel, PART_SIZE).await {
            Ok(size) => {
                tracing::info!(
                    bucket = %self.bucket,
                    key = %key,
                    size_bytes = size,
                    size = %format_file_size(size),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 stream upload successful"
                );
                Ok(self.object(key))
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 stream upload failed"
                );
                Err(e)
            }
        }
    }

    async fn download_to(&self, bucket: &str, key: &str, dest: &Path) -> StorageResult<u64> {
        let start = Instant::now();

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_no_such_key()).unwrap_or(false) {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::Download(DisplayErrorContext(&e).to_string())
                }
            })?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| StorageError::Download(format!("{}: {}", dest.display(), e)))?;

        let mut body = response.body;
        let mut size = 0u64;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| StorageError::Download(e.to_string()))?
        {
            size += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .map_err(|e| StorageError::Download(format!("{}: {}", dest.display(), e)))?;
        }
        file.flush()
            .await
            .map_err(|e| StorageError::Download(format!("{}: {}", dest.display(), e)))?;

        tracing::info!(
            bucket = %bucket,
            key = %key,
            size_bytes = size,
            size = %format_file_size(size),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 download successful"
        );

        Ok(size)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Delete(DisplayErrorContext(&e).to_string()))?;

        tracing::info!(bucket = %self.bucket, key = %key, "S3 delete successful");

        Ok(())
    }
}

/// Run `fut` unless `cancel` fires first
async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StorageError::Cancelled),
        result = fut => result,
    }
}
