// packages/ingest/src/blobstore/s3.rs
//! [`ObjectClient`] over the S3 object API

use crate::blobstore::{BlobError, BlobResult, ObjectClient};
use crate::utils::config::CloudConfig;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::debug;

/// Region where buckets are created without a location constraint
const DEFAULT_REGION: &str = "us-east-1";

/// S3-compatible object client
#[derive(Debug, Clone)]
pub struct S3ObjectClient {
    client: Client,
    region: Option<String>,
    /// Account expected to own the bucket
    expected_bucket_owner: Option<String>,
}

impl S3ObjectClient {
    /// Build a client from the cloud storage settings
    ///
    /// `credentials_profile` selects a named profile from the shared
    /// credentials files; without it the default provider chain applies.
    pub async fn from_config(config: &CloudConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(profile) = &config.credentials_profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            region: config.region.clone(),
            expected_bucket_owner: config.expected_bucket_owner.clone(),
        }
    }

    fn bucket_configuration(&self) -> Option<CreateBucketConfiguration> {
        self.region
            .as_deref()
            .filter(|region| *region != DEFAULT_REGION)
            .map(|region| {
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build()
            })
    }
}

#[async_trait]
impl ObjectClient for S3ObjectClient {
    async fn bucket_exists(&self, bucket: &str) -> BlobResult<bool> {
        match self
            .client
            .head_bucket()
            .bucket(bucket)
            .set_expected_bucket_owner(self.expected_bucket_owner.clone())
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = e.into_service_error();
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(BlobError::backend(err))
                }
            }
        }
    }

    async fn create_bucket(&self, bucket: &str) -> BlobResult<()> {
        match self
            .client
            .create_bucket()
            .bucket(bucket)
            .set_create_bucket_configuration(self.bucket_configuration())
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = e.into_service_error();
                if err.is_bucket_already_owned_by_you() {
                    debug!("Bucket {} was created concurrently", bucket);
                    Ok(())
                } else {
                    Err(BlobError::backend(err))
                }
            }
        }
    }

    async fn get_object(&self, bucket: &str, key: &str) -> BlobResult<Bytes> {
        let output = match self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .set_expected_bucket_owner(self.expected_bucket_owner.clone())
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                let err = e.into_service_error();
                return Err(if err.is_no_such_key() {
                    BlobError::not_found(key)
                } else {
                    BlobError::backend(err)
                });
            }
        };

        let body = output.body.collect().await.map_err(BlobError::backend)?;
        Ok(body.into_bytes())
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> BlobResult<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .set_expected_bucket_owner(self.expected_bucket_owner.clone())
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| BlobError::backend(e.into_service_error()))?;
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> BlobResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .set_expected_bucket_owner(self.expected_bucket_owner.clone())
            .send()
            .await
            .map_err(|e| BlobError::backend(e.into_service_error()))?;
        Ok(())
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> BlobResult<bool> {
        match self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .set_expected_bucket_owner(self.expected_bucket_owner.clone())
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = e.into_service_error();
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(BlobError::backend(err))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud_config() -> CloudConfig {
        CloudConfig {
            bucket: "build-events".to_string(),
            project_id: Some("1234".to_string()),
            expected_bucket_owner: None,
            credentials_profile: None,
            region: Some("eu-west-1".to_string()),
            endpoint: Some("http://127.0.0.1:9000".to_string()),
        }
    }

    #[tokio::test]
    async fn test_project_id_is_not_the_bucket_owner() {
        let client = S3ObjectClient::from_config(&cloud_config()).await;
        assert!(client.expected_bucket_owner.is_none());
    }

    #[tokio::test]
    async fn test_expected_bucket_owner_is_applied() {
        let config = CloudConfig {
            expected_bucket_owner: Some("111122223333".to_string()),
            ..cloud_config()
        };

        let client = S3ObjectClient::from_config(&config).await;
        assert_eq!(client.expected_bucket_owner.as_deref(), Some("111122223333"));
    }

    #[tokio::test]
    async fn test_location_constraint_outside_default_region() {
        let client = S3ObjectClient::from_config(&cloud_config()).await;
        let configuration = client.bucket_configuration().unwrap();
        assert_eq!(
            configuration.location_constraint(),
            Some(&BucketLocationConstraint::EuWest1)
        );

        let config = CloudConfig {
            region: Some(DEFAULT_REGION.to_string()),
            ..cloud_config()
        };
        let client = S3ObjectClient::from_config(&config).await;
        assert!(client.bucket_configuration().is_none());
    }
}
