//! # S3 media store
//!
//! `MediaStorage` over any S3-compatible endpoint (MinIO in development).
//! Links are ordinary presigned GET requests, so retrieval never passes
//! through this service.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use domains::{DomainError, MediaStorage, Result};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Connection parameters for the object store.
pub struct S3Options {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key: SecretString,
    pub secret_key: SecretString,
}

pub struct S3MediaStore {
    client: Client,
    bucket: String,
    bucket_ready: OnceCell<()>,
}

impl S3MediaStore {
    /// Builds a client with static credentials and path-style addressing.
    /// No request is made until the first upload.
    pub async fn connect(opts: S3Options) -> Self {
        let credentials = Credentials::new(
            opts.access_key.expose_secret(),
            opts.secret_key.expose_secret(),
            None,
            None,
            "forum-static",
        );
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(opts.region))
            .credentials_provider(credentials)
            .endpoint_url(&opts.endpoint)
            .load()
            .await;
        let conf = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();

        info!(endpoint = %opts.endpoint, bucket = %opts.bucket, "s3 media store configured");
        Self {
            client: Client::from_conf(conf),
            bucket: opts.bucket,
            bucket_ready: OnceCell::new(),
        }
    }

    async fn ensure_bucket(&self) -> Result<()> {
        self.bucket_ready
            .get_or_try_init(|| async {
                if self.client.head_bucket().bucket(&self.bucket).send().await.is_ok() {
                    return Ok(());
                }
                match self.client.create_bucket().bucket(&self.bucket).send().await {
                    Ok(_) => {
                        info!(bucket = %self.bucket, "bucket created");
                        Ok(())
                    }
                    Err(SdkError::ServiceError(e))
                        if e.err().is_bucket_already_owned_by_you()
                            || e.err().is_bucket_already_exists() =>
                    {
                        Ok(())
                    }
                    Err(e) => Err(classify(e, "create bucket")),
                }
            })
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl MediaStorage for S3MediaStore {
    async fn put_object(&self, key: &str, content_type: &str, data: Bytes) -> Result<u64> {
        self.ensure_bucket().await?;
        let size = data.len() as u64;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .content_length(size as i64)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| classify(e, "put object"))?;
        Ok(size)
    }

    async fn presigned_url(&self, key: &str, ttl: Duration) -> Result<String> {
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| DomainError::Internal(format!("presigning config: {e}")))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| classify(e, "presign object"))?;
        Ok(request.uri().to_string())
    }
}

/// Transport failures are retryable; anything the service answered is not.
fn classify<E, R>(err: SdkError<E, R>, what: &str) -> DomainError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = format!("{what}: {}", DisplayErrorContext(&err));
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            warn!(error = %message, "object store unreachable");
            DomainError::Unavailable(message)
        }
        _ => DomainError::Internal(message),
    }
}
