use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use tracing::debug;

use crate::error::{FleetError, Result};
use crate::ports::{ObjectStore, PutOptions};

/// One bucket used as the marker and installer-output store.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("bucket", &self.bucket)
            .finish()
    }
}

impl S3ObjectStore {
    pub fn new(sdk_config: &aws_config::SdkConfig, bucket: impl Into<String>) -> Self {
        Self {
            client: Client::new(sdk_config),
            bucket: bucket.into(),
        }
    }

    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn objects_error<E, R>(operation: &str, key: &str, err: SdkError<E, R>) -> FleetError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    FleetError::Objects(format!(
        "{operation} {key} failed: {}",
        DisplayErrorContext(&err)
    ))
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => {
                Ok(false)
            }
            Err(err) => Err(objects_error("HeadObject", key, err)),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                debug!(key, "object not found");
                return Ok(None);
            }
            Err(err) => return Err(objects_error("GetObject", key, err)),
        };

        let body = response
            .body
            .collect()
            .await
            .map_err(|err| FleetError::Objects(format!("reading {key} failed: {err}")))?;
        Ok(Some(body.into_bytes().to_vec()))
    }

    async fn put(&self, key: &str, body: Vec<u8>, options: PutOptions) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(options.content_type)
            .acl(ObjectCannedAcl::from(options.acl.as_str()))
            .send()
            .await
            .map_err(|err| objects_error("PutObject", key, err))?;
        debug!(key, content_type = options.content_type, "object written");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| objects_error("DeleteObject", key, err))?;
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|err| objects_error("ListObjectsV2", prefix, err))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(keys)
    }

    async fn delete_all(&self) -> Result<usize> {
        let keys = self.list_keys("").await?;
        for key in &keys {
            self.delete(key).await?;
        }
        Ok(keys.len())
    }
}
