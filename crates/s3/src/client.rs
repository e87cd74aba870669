//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the ObjectStore trait from sc-core.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use jiff::Timestamp;
use tracing::debug;
use url::Url;

use sc_core::traits::StorageClass;
use sc_core::{BucketInfo, Error, ListRequest, ListingPage, Node, ObjectMeta, ObjectStore, Profile, Result};

use crate::error::from_sdk;

/// Region that rejects an explicit location constraint
const DEFAULT_REGION: &str = "us-east-1";

/// S3 client wrapper
pub struct S3Client {
    inner: aws_sdk_s3::Client,
    profile: Profile,
}

impl S3Client {
    /// Create a new S3 client from a storage profile
    ///
    /// Static keys in the profile take precedence; otherwise the SDK's default
    /// provider chain resolves credentials.
    pub async fn new(profile: &Profile) -> Result<Self> {
        profile.validate()?;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(profile.region.clone()));

        if let Some((access_key, secret_key)) = profile.static_keys() {
            let credentials = aws_credential_types::Credentials::new(
                access_key,
                secret_key,
                None, // session token
                None, // expiry
                "s3c-static-credentials",
            );
            loader = loader.credentials_provider(credentials);
        }
        if let Some(endpoint) = &profile.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(profile.force_path_style())
            .build();

        debug!(profile = %profile.name, region = %profile.region, "Created S3 client");
        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
            profile: profile.clone(),
        })
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }
}

fn timestamp(dt: &aws_smithy_types::DateTime) -> Option<Timestamp> {
    Timestamp::new(dt.secs(), i32::try_from(dt.subsec_nanos()).unwrap_or(0)).ok()
}

fn trim_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

/// URL-encoded `bucket/key` for the CopySource header
fn copy_source(bucket: &str, key: &str) -> Result<String> {
    let mut url = Url::parse("s3://copy-source")?;
    url.path_segments_mut()
        .map_err(|()| Error::General("Cannot encode copy source".into()))?
        .push(bucket)
        .extend(key.split('/'));
    Ok(url.path().trim_start_matches('/').to_string())
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let response = self
            .inner
            .list_buckets()
            .send()
            .await
            .map_err(|e| from_sdk(e, "bucket list"))?;

        let buckets = response
            .buckets()
            .iter()
            .map(|b| BucketInfo {
                name: b.name().unwrap_or_default().to_string(),
                created: b.creation_date().and_then(timestamp),
            })
            .collect();

        Ok(buckets)
    }

    async fn list_objects(&self, request: &ListRequest) -> Result<ListingPage> {
        let mut call = self
            .inner
            .list_objects_v2()
            .bucket(&request.bucket)
            .prefix(&request.prefix);

        if let Some(delimiter) = &request.delimiter {
            call = call.delimiter(delimiter);
        }
        if let Some(max) = request.max_keys {
            call = call.max_keys(max);
        }
        if let Some(token) = &request.continuation_token {
            call = call.continuation_token(token);
        }

        let response = call
            .send()
            .await
            .map_err(|e| from_sdk(e, &format!("{}/{}", request.bucket, request.prefix)))?;

        let mut nodes = Vec::new();

        // Common prefixes (directories)
        for common in response.common_prefixes() {
            if let Some(p) = common.prefix() {
                nodes.push(Node::directory(&request.prefix, p));
            }
        }

        // Objects
        for object in response.contents() {
            let mut meta = ObjectMeta::new(
                object.key().unwrap_or_default(),
                u64::try_from(object.size().unwrap_or(0)).unwrap_or(0),
            );
            meta.last_modified = object.last_modified().and_then(timestamp);
            meta.etag = object.e_tag().map(trim_etag);
            if let Some(sc) = object.storage_class() {
                meta.storage_class = StorageClass::from(sc.as_str());
            }
            nodes.push(Node::object(&request.prefix, meta));
        }

        let continuation_token = if response.is_truncated().unwrap_or(false) {
            response.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListingPage {
            prefix: request.prefix.clone(),
            nodes,
            continuation_token,
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMeta> {
        let response = self
            .inner
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| from_sdk(e, &format!("{bucket}/{key}")))?;

        let size = u64::try_from(response.content_length().unwrap_or(0)).unwrap_or(0);
        let mut meta = ObjectMeta::new(key, size);
        meta.last_modified = response.last_modified().and_then(timestamp);
        meta.etag = response.e_tag().map(trim_etag);
        meta.content_type = response.content_type().map(str::to_string);
        if let Some(sc) = response.storage_class() {
            meta.storage_class = StorageClass::from(sc.as_str());
        }

        Ok(meta)
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<ObjectMeta> {
        self.inner
            .copy_object()
            .copy_source(copy_source(src_bucket, src_key)?)
            .bucket(dst_bucket)
            .key(dst_key)
            .send()
            .await
            .map_err(|e| from_sdk(e, &format!("{src_bucket}/{src_key}")))?;

        // Copy responses carry no size
        self.head_object(dst_bucket, dst_key).await
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.inner
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| from_sdk(e, &format!("{bucket}/{key}")))?;

        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<ObjectMeta> {
        let size = data.len() as u64;
        let mut call = self
            .inner
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data));

        if let Some(ct) = &content_type {
            call = call.content_type(ct);
        }

        let response = call
            .send()
            .await
            .map_err(|e| from_sdk(e, &format!("{bucket}/{key}")))?;

        let mut meta = ObjectMeta::new(key, size);
        meta.etag = response.e_tag().map(trim_etag);
        meta.last_modified = Some(Timestamp::now());
        meta.content_type = content_type;

        Ok(meta)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let response = self
            .inner
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| from_sdk(e, &format!("{bucket}/{key}")))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Transient(format!("{bucket}/{key}: {e}")))?
            .into_bytes()
            .to_vec();

        Ok(data)
    }

    async fn create_bucket(&self, name: &str, region: Option<String>) -> Result<()> {
        let mut call = self.inner.create_bucket().bucket(name);

        if let Some(region) = region.filter(|r| r != DEFAULT_REGION) {
            let configuration = CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region.as_str()))
                .build();
            call = call.create_bucket_configuration(configuration);
        }

        call.send().await.map_err(|e| from_sdk(e, name))?;
        Ok(())
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        self.inner
            .delete_bucket()
            .bucket(name)
            .send()
            .await
            .map_err(|e| from_sdk(e, name))?;

        Ok(())
    }
}
