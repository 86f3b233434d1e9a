//! Cloudflare R2 object storage client (S3-compatible API)
//!
//! Photos are stored under the `absen/` prefix, invoices under `invoice/`.
//! Every operation normalizes the incoming reference through
//! [`PhotoRef::storage_key`] so a photo recorded under any ref form (URL,
//! key, local path) stays reachable for download, delete and URL
//! resolution alike.

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use crate::core::config;
use crate::core::error::{AppError, AppResult};
use crate::storage::model::PhotoRef;

#[derive(Clone)]
pub struct ObjectStore {
    client: Client,
    bucket: String,
    public_url: Option<String>,
}

impl ObjectStore {
    /// Build a store from the R2_* environment configuration.
    ///
    /// Returns `None` when credentials are incomplete; callers then run in
    /// local-filesystem-only mode with a logged warning.
    pub fn from_env() -> Option<Self> {
        if !config::r2::is_configured() {
            log::warn!("R2 credentials not configured; photos will be stored locally only");
            return None;
        }
        let credentials = Credentials::new(
            config::r2::ACCESS_KEY_ID.as_str(),
            config::r2::SECRET_ACCESS_KEY.as_str(),
            None,
            None,
            "r2-static",
        );
        let endpoint = format!(
            "https://{}.r2.cloudflarestorage.com",
            config::r2::ACCOUNT_ID.as_str()
        );
        let conf = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("auto"))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .build();
        Some(Self {
            client: Client::from_conf(conf),
            bucket: config::r2::BUCKET_NAME.clone(),
            public_url: config::r2::PUBLIC_URL.clone(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload a blob under the given key.
    ///
    /// Returns the public URL when a public base is configured, otherwise
    /// the bare key (which is what gets stored as the photo ref).
    pub async fn upload(&self, data: Vec<u8>, key: &str, content_type: &str) -> AppResult<String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("R2 upload of {} failed: {}", key, e)))?;
        log::info!("Uploaded to R2: {}", key);
        Ok(match &self.public_url {
            Some(base) => format!("{}/{}", base, key),
            None => key.to_string(),
        })
    }

    /// Download a blob by any ref form (URL, key or local-path variant).
    pub async fn download(&self, photo_ref: &PhotoRef) -> AppResult<Vec<u8>> {
        let key = photo_ref.storage_key(&self.bucket);
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("R2 download of {} failed: {}", key, e)))?;
        let data = output
            .body
            .collect()
            .await
            .map_err(|e| AppError::Upstream(format!("R2 body read of {} failed: {}", key, e)))?
            .into_bytes()
            .to_vec();
        Ok(data)
    }

    /// Best-effort delete: failures are logged, never propagated, so the
    /// caller can treat record deletion and photo deletion as independent.
    pub async fn delete(&self, photo_ref: &PhotoRef) {
        let key = photo_ref.storage_key(&self.bucket);
        match self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => log::info!("Deleted from R2: {}", key),
            Err(e) => log::warn!("Failed to delete {} from R2: {}", key, e),
        }
    }

    /// Public URL for a blob when a public base is configured, otherwise
    /// the bare key. Callers seeing a non-URL result must fall back to an
    /// authenticated download.
    pub fn public_url(&self, photo_ref: &PhotoRef) -> String {
        if let PhotoRef::Url(url) = photo_ref {
            return url.clone();
        }
        let key = photo_ref.storage_key(&self.bucket);
        match &self.public_url {
            Some(base) => format!("{}/{}", base, key),
            None => key,
        }
    }
}
