use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::GenericImageView;
use rand::Rng;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use time::OffsetDateTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::app::error::{ServiceError, ServiceResult};
use crate::config::AppConfig;
use crate::domain::media::{ImageUpload, MediaAsset, MediaOwner, OwnerKind};

const PROCESSED_PREFIX: &str = "processed-";

#[derive(Debug, Clone)]
pub struct MediaSettings {
    pub root: PathBuf,
    pub public_prefix: String,
    pub max_bytes: usize,
    pub max_files: usize,
    pub max_width: u32,
    pub max_height: u32,
    pub jpeg_quality: u8,
}

impl MediaSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            root: config.upload_dir.clone(),
            public_prefix: config.media_public_prefix.clone(),
            max_bytes: config.upload_max_bytes,
            max_files: config.upload_max_files,
            max_width: config.image_max_width,
            max_height: config.image_max_height,
            jpeg_quality: config.image_jpeg_quality,
        }
    }
}

/// A file found on disk while scanning a bucket.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub storage_key: String,
    pub modified: SystemTime,
}

/// Local-disk image store. Files are laid out as `{root}/{bucket}/{name}` and
/// served under `{public_prefix}/{bucket}/{name}`.
#[derive(Clone)]
pub struct MediaAssetStore {
    settings: Arc<MediaSettings>,
}

impl MediaAssetStore {
    pub fn new(settings: MediaSettings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }

    /// Checks size before type so oversize files are refused whatever they claim to be.
    pub fn validate(&self, upload: &ImageUpload) -> ServiceResult<&'static str> {
        if upload.size() > self.settings.max_bytes {
            return Err(ServiceError::validation(format!(
                "image exceeds the maximum size of {} bytes",
                self.settings.max_bytes
            )));
        }
        if upload.size() == 0 {
            return Err(ServiceError::validation("image file is empty"));
        }
        extension_from_content_type(&upload.content_type).ok_or_else(|| {
            ServiceError::validation("only image files are allowed (jpeg, jpg, png, gif, webp)")
        })
    }

    /// Writes the upload durably, then tries to shrink it to a JPEG. When
    /// processing fails the original file stays in place and is returned.
    pub async fn store(&self, upload: ImageUpload, kind: OwnerKind) -> ServiceResult<MediaAsset> {
        let ext = self.validate(&upload)?;
        let file_name = generate_file_name(kind.file_prefix(), ext);
        let original_key = format!("{}/{}", kind.bucket(), file_name);

        self.write_file(&original_key, &upload.data).await?;
        let original = MediaAsset {
            public_url: self.public_url(&original_key),
            storage_key: original_key,
            content_type: upload.content_type.clone(),
            size_bytes: upload.size() as i64,
            owner: MediaOwner { kind, id: None },
        };

        match self.process(&original, upload).await {
            Ok(processed) => Ok(processed),
            Err(err) => {
                warn!(
                    error = ?err,
                    key = %original.storage_key,
                    "image processing failed, keeping original file"
                );
                Ok(original)
            }
        }
    }

    /// Stores `upload`, hands the new asset to `persist`, and only once that
    /// succeeds removes `existing`. A failed `persist` removes the new file
    /// instead, so the row keeps pointing at a file that still exists.
    pub async fn replace<T, F, Fut>(
        &self,
        existing: Option<&MediaAsset>,
        upload: ImageUpload,
        kind: OwnerKind,
        persist: F,
    ) -> ServiceResult<T>
    where
        F: FnOnce(MediaAsset) -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        let asset = self.store(upload, kind).await?;
        match persist(asset.clone()).await {
            Ok(value) => {
                if let Some(previous) = existing {
                    self.release(previous).await;
                }
                Ok(value)
            }
            Err(err) => {
                self.release(&asset).await;
                Err(err)
            }
        }
    }

    /// Removes the asset's file. Missing files count as already deleted.
    pub async fn delete(&self, asset: &MediaAsset) -> Result<bool> {
        self.delete_key(&asset.storage_key).await
    }

    pub async fn delete_key(&self, storage_key: &str) -> Result<bool> {
        let path = self.key_to_path(storage_key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!(key = %storage_key, "media file deleted");
                Ok(true)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(anyhow!("failed to delete {}: {}", path.display(), err)),
        }
    }

    /// Best-effort delete; failures are logged and swallowed.
    pub async fn release(&self, asset: &MediaAsset) {
        if let Err(err) = self.delete(asset).await {
            warn!(error = ?err, key = %asset.storage_key, "failed to remove media file");
        }
    }

    /// Stores every upload or none of them.
    pub async fn store_batch(
        &self,
        uploads: Vec<ImageUpload>,
        kind: OwnerKind,
    ) -> ServiceResult<Vec<MediaAsset>> {
        if uploads.is_empty() {
            return Err(ServiceError::validation("no images were uploaded"));
        }
        if uploads.len() > self.settings.max_files {
            return Err(ServiceError::validation(format!(
                "at most {} images may be uploaded at once",
                self.settings.max_files
            )));
        }
        for upload in &uploads {
            self.validate(upload)?;
        }

        let results =
            futures::future::join_all(uploads.into_iter().map(|upload| self.store(upload, kind)))
                .await;

        let mut stored = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(asset) => stored.push(asset),
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        if let Some(err) = first_error {
            for asset in &stored {
                self.release(asset).await;
            }
            return Err(err);
        }
        Ok(stored)
    }

    pub async fn list_bucket(&self, kind: OwnerKind) -> Result<Vec<StoredFile>> {
        let dir = self.settings.root.join(kind.bucket());
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(anyhow!("failed to read {}: {}", dir.display(), err)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            files.push(StoredFile {
                storage_key: format!("{}/{}", kind.bucket(), name),
                modified: metadata.modified()?,
            });
        }
        Ok(files)
    }

    fn public_url(&self, storage_key: &str) -> String {
        format!("{}/{}", self.settings.public_prefix, storage_key)
    }

    async fn process(&self, original: &MediaAsset, upload: ImageUpload) -> Result<MediaAsset> {
        let (max_width, max_height, quality) = (
            self.settings.max_width,
            self.settings.max_height,
            self.settings.jpeg_quality,
        );
        let data = upload.data;
        let encoded = tokio::task::spawn_blocking(move || {
            shrink_to_jpeg(&data, max_width, max_height, quality)
        })
        .await
        .context("image processing task panicked")??;

        let stem = original
            .file_name()
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(original.file_name());
        let processed_key = format!(
            "{}/{}{}.jpg",
            original.owner.kind.bucket(),
            PROCESSED_PREFIX,
            stem
        );

        self.write_file(&processed_key, &encoded).await?;
        if let Err(err) = self.delete(original).await {
            warn!(error = ?err, key = %original.storage_key, "failed to remove unprocessed original");
        }

        Ok(MediaAsset {
            public_url: self.public_url(&processed_key),
            storage_key: processed_key,
            content_type: "image/jpeg".to_string(),
            size_bytes: encoded.len() as i64,
            owner: original.owner,
        })
    }

    async fn write_file(&self, storage_key: &str, data: &[u8]) -> Result<()> {
        let path = self.key_to_path(storage_key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&path)
            .await
            .with_context(|| format!("failed to create {}", path.display()))?;
        file.write_all(data)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        file.sync_all()
            .await
            .with_context(|| format!("failed to sync {}", path.display()))?;

        info!(key = %storage_key, size_bytes = data.len(), "media file written");
        Ok(())
    }

    /// Filesystem path for a storage key. Rejects anything but plain relative
    /// components.
    pub fn key_to_path(&self, storage_key: &str) -> Result<PathBuf> {
        let key = Path::new(storage_key);
        let well_formed = !storage_key.is_empty()
            && !storage_key.contains('\\')
            && key.components().all(|c| matches!(c, Component::Normal(_)));
        if !well_formed {
            return Err(anyhow!("invalid storage key: {}", storage_key));
        }
        Ok(self.settings.root.join(key))
    }
}

fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

fn generate_file_name(prefix: &str, ext: &str) -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let random: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!("{}-{}-{}.{}", prefix, millis, random, ext)
}

/// Decodes, scales down to fit the bounds (never up), and re-encodes as JPEG.
fn shrink_to_jpeg(data: &[u8], max_width: u32, max_height: u32, quality: u8) -> Result<Vec<u8>> {
    let image =
        image::load_from_memory(data).map_err(|err| anyhow!("failed to decode image: {}", err))?;
    let (width, height) = image.dimensions();

    let image = if width > max_width || height > max_height {
        image.resize(max_width, max_height, FilterType::Lanczos3)
    } else {
        image
    };

    let rgb = image.to_rgb8();
    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, quality)
        .encode_image(&rgb)
        .map_err(|err| anyhow!("failed to encode jpeg: {}", err))?;
    Ok(encoded)
}
