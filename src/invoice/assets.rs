//! Photo and template retrieval with fallback chains
//!
//! Every asset the compositor needs goes through [`AssetResolver::fetch`]:
//! URLs over HTTP, storage keys via R2 with a local-file fallback, plain
//! paths from disk. A failed fetch degrades that one slot to a placeholder
//! instead of failing the whole invoice.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::core::config;
use crate::core::error::{AppError, AppResult};
use crate::storage::model::PhotoRef;
use crate::storage::ObjectStore;

#[derive(Clone)]
pub struct AssetResolver {
    store: Option<ObjectStore>,
    http: reqwest::Client,
}

impl AssetResolver {
    pub fn new(store: Option<ObjectStore>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config::http::fetch_timeout())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { store, http }
    }

    pub fn store(&self) -> Option<&ObjectStore> {
        self.store.as_ref()
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Fetch the bytes behind a photo reference.
    ///
    /// URLs are fetched over HTTP. Storage keys try R2 first and fall back
    /// to the equivalent local file. Local paths read straight from disk.
    pub async fn fetch(&self, photo_ref: &PhotoRef) -> AppResult<Vec<u8>> {
        match photo_ref {
            PhotoRef::Url(url) => match self.fetch_url(url).await {
                Ok(data) => Ok(data),
                Err(e) => {
                    log::warn!("HTTP fetch of {} failed, trying storage key: {}", url, e);
                    self.fetch_by_derived_key(photo_ref).await.map_err(|_| e)
                }
            },
            PhotoRef::StorageKey(_) => {
                if let Some(store) = &self.store {
                    match store.download(photo_ref).await {
                        Ok(data) => return Ok(data),
                        Err(e) => log::warn!(
                            "R2 fetch of {} failed, trying local file: {}",
                            photo_ref.as_str(),
                            e
                        ),
                    }
                }
                self.read_local(photo_ref)
            }
            PhotoRef::LocalPath(_) => self.read_local(photo_ref),
        }
    }

    /// A dead URL may still point at a blob we hold ourselves: derive the
    /// storage key from the URL path and retry object storage, then the
    /// matching file under the local absen directory.
    async fn fetch_by_derived_key(&self, photo_ref: &PhotoRef) -> AppResult<Vec<u8>> {
        if let Some(store) = &self.store {
            if let Ok(data) = store.download(photo_ref).await {
                return Ok(data);
            }
        }
        let key = photo_ref.storage_key("");
        let filename = key.trim_start_matches(crate::storage::model::STORAGE_PREFIX);
        let path = std::path::Path::new(config::ABSEN_DIR.as_str()).join(filename);
        std::fs::read(&path)
            .map_err(|e| AppError::NotFound(format!("photo {} unreadable: {}", path.display(), e)))
    }

    async fn fetch_url(&self, url: &str) -> AppResult<Vec<u8>> {
        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(AppError::Upstream(format!(
                "photo fetch {} returned {}",
                url,
                resp.status()
            )));
        }
        Ok(resp.bytes().await?.to_vec())
    }

    fn read_local(&self, photo_ref: &PhotoRef) -> AppResult<Vec<u8>> {
        let path = photo_ref
            .local_path()
            .ok_or_else(|| AppError::NotFound(format!("no local path for {}", photo_ref.as_str())))?;
        std::fs::read(path).map_err(|e| {
            AppError::NotFound(format!("photo file {} unreadable: {}", path, e))
        })
    }

    /// Load the invoice template bitmap, or `None` when it cannot be found
    /// anywhere (the compositor then paints on a blank canvas).
    pub async fn fetch_template(&self) -> Option<Vec<u8>> {
        let template_ref = PhotoRef::classify(&config::TEMPLATE_PATH);
        match self.fetch(&template_ref).await {
            Ok(data) => Some(data),
            Err(e) => {
                log::warn!(
                    "Invoice template {} unavailable: {}",
                    template_ref.as_str(),
                    e
                );
                None
            }
        }
    }

    /// Browser-facing source for a photo, for the dashboard table.
    ///
    /// CDN-hosted photos are rewritten to the image proxy route so the
    /// browser never hits the CDN's CORS policy. Keys resolve to the public
    /// bucket URL when one is configured, else the bytes are inlined as a
    /// base64 data URI. `None` when the photo is gone everywhere.
    pub async fn display_source(&self, photo_ref: &PhotoRef) -> Option<String> {
        match photo_ref {
            PhotoRef::Url(url) => {
                if let Some(cdn) = config::CDN_BASE_URL.as_ref() {
                    if let Some(rest) = url.strip_prefix(cdn.as_str()) {
                        return Some(format!("/api/image/{}", rest.trim_start_matches('/')));
                    }
                }
                Some(url.clone())
            }
            PhotoRef::StorageKey(_) => {
                if let Some(store) = &self.store {
                    let resolved = store.public_url(photo_ref);
                    if resolved.starts_with("http://") || resolved.starts_with("https://") {
                        return Some(resolved);
                    }
                }
                self.inline_data_uri(photo_ref).await
            }
            PhotoRef::LocalPath(_) => self.inline_data_uri(photo_ref).await,
        }
    }

    async fn inline_data_uri(&self, photo_ref: &PhotoRef) -> Option<String> {
        match self.fetch(photo_ref).await {
            Ok(data) => Some(format!("data:image/jpeg;base64,{}", BASE64.encode(data))),
            Err(e) => {
                log::debug!("Photo {} not displayable: {}", photo_ref.as_str(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn local_path_reads_from_disk() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"jpegbytes").unwrap();
        let resolver = AssetResolver::new(None);
        let photo_ref = PhotoRef::classify(file.path().to_str().unwrap());
        let data = resolver.fetch(&photo_ref).await.unwrap();
        assert_eq!(data, b"jpegbytes");
    }

    #[tokio::test]
    async fn absolute_path_under_absen_dir_is_read_as_local_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absen");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("andi.jpg"), b"photo").unwrap();

        let resolver = AssetResolver::new(None);
        let raw = format!("{}/absen/andi.jpg", dir.path().display());
        // a bare path under an absen directory is a LocalPath ref
        let data = resolver.fetch(&PhotoRef::classify(&raw)).await.unwrap();
        assert_eq!(data, b"photo");
    }

    #[tokio::test]
    async fn storage_key_miss_falls_back_to_the_literal_local_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absen");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("budi.jpg"), b"local bytes").unwrap();

        // the store is unreachable (not configured), but the key string
        // doubles as a relative file path that exists on disk
        let resolver = AssetResolver::new(None);
        let key = PhotoRef::StorageKey(format!("{}/absen/budi.jpg", dir.path().display()));
        let data = resolver.fetch(&key).await.unwrap();
        assert_eq!(data, b"local bytes");
    }

    #[tokio::test]
    async fn missing_local_file_is_a_not_found_error() {
        let resolver = AssetResolver::new(None);
        let err = resolver
            .fetch(&PhotoRef::classify("/nonexistent/dir/a.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
