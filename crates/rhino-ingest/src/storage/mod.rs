// Corpus object store client
//
// Thin wrapper over aws-sdk-s3 with the semantics the ingestion pipeline
// needs: objects are created if absent and never updated in place. An
// existing key short-circuits to its stored metadata, so re-running a failed
// ingestion reuses the objects it already wrote.

use anyhow::{anyhow, Context, Result};
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};
use uuid::Uuid;

pub mod config;

pub use config::StorageConfig;

/// A stored object's location and identity, as persisted on article_file
/// rows.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bucket: String,
    pub key: String,
    /// S3 version id when the bucket is versioned, otherwise a generated
    /// uuid naming this write.
    pub version: String,
    pub size: i64,
    pub checksum: String,
}

#[derive(Debug, Clone)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: i64,
    pub content_type: Option<String>,
    pub version: Option<String>,
}

#[derive(Clone)]
pub struct ObjectStore {
    client: Client,
}

impl ObjectStore {
    pub async fn new(config: StorageConfig) -> Result<Self> {
        debug!("Initializing object store client");

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "rhino-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!(region = %config.region, "Object store client initialized");

        Ok(Self { client })
    }

    /// Upload an object unless the key already exists (create-if-absent).
    ///
    /// The download name is recorded as a Content-Disposition so readers
    /// fetching the object get a meaningful file name.
    #[instrument(skip(self, data))]
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        download_name: &str,
    ) -> Result<StoredObject> {
        if let Some(existing) = self.try_get_metadata(bucket, key).await? {
            debug!("Object already exists at s3://{}/{}", bucket, key);
            return Ok(StoredObject {
                bucket: bucket.to_string(),
                key: key.to_string(),
                version: existing
                    .version
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
                size: existing.size,
                checksum: String::new(),
            });
        }

        let checksum = calculate_sha256(&data);
        let size = data.len() as i64;

        debug!("Uploading {} bytes to s3://{}/{}", size, bucket, key);

        let response = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .content_disposition(format!("attachment; filename=\"{download_name}\""))
            .send()
            .await
            .context("Failed to upload to object store")?;

        info!("Uploaded s3://{}/{}", bucket, key);

        Ok(StoredObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            version: response
                .version_id()
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            size,
            checksum,
        })
    }

    #[instrument(skip(self))]
    pub async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        debug!("Downloading from s3://{}/{}", bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .context(format!("Failed to download from object store: {key}"))?;

        let data = response
            .body
            .collect()
            .await
            .context("Failed to read object store response body")?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), bucket, key);

        Ok(data)
    }

    #[instrument(skip(self))]
    pub async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        Ok(self.try_get_metadata(bucket, key).await?.is_some())
    }

    #[instrument(skip(self))]
    pub async fn get_metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata> {
        self.try_get_metadata(bucket, key)
            .await?
            .ok_or_else(|| anyhow!("Object not found: s3://{bucket}/{key}"))
    }

    async fn try_get_metadata(&self, bucket: &str, key: &str) -> Result<Option<ObjectMetadata>> {
        match self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => Ok(Some(ObjectMetadata {
                key: key.to_string(),
                size: response.content_length().unwrap_or(0),
                content_type: response.content_type().map(str::to_string),
                version: response.version_id().map(str::to_string),
            })),
            Err(e) => {
                let message = e.to_string();
                if is_not_found(&e) || message.contains("NotFound") || message.contains("404") {
                    Ok(None)
                } else {
                    Err(anyhow!("Failed to check object existence: {e}"))
                }
            },
        }
    }
}

fn is_not_found(
    err: &aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::head_object::HeadObjectError>,
) -> bool {
    matches!(
        err,
        aws_sdk_s3::error::SdkError::ServiceError(service_err)
            if service_err.err().is_not_found()
    )
}

fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
