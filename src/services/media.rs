//! Storage for uploaded visit photos, warranty cards and rendered documents.

use crate::errors::ServiceError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, instrument};

const DATA_URL_SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("image is not a base64 data URL")]
    MalformedDataUrl,
    #[error("unsupported image type {0}")]
    UnsupportedMime(String),
    #[error("image payload is not valid base64")]
    InvalidEncoding,
    #[error("image is {size} bytes, limit is {max}")]
    TooLarge { size: usize, max: usize },
    #[error("file is empty")]
    Empty,
    #[error("image entry is blank")]
    Blank,
    #[error("image reference {0:?} is not a data URL, an http(s) URL or a stored media path")]
    UnknownReference(String),
    #[error("storage failure: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MediaError> for ServiceError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Io(e) => ServiceError::StorageError(e.to_string()),
            other => ServiceError::ValidationError(other.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Webp,
}

impl ImageKind {
    fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageUpload {
    pub kind: ImageKind,
    pub bytes: Vec<u8>,
}

/// An image reference from a request: a new upload or something already stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageInput {
    Stored(String),
    Upload(ImageUpload),
}

/// Decodes a `data:<mime>;base64,<payload>` upload.
///
/// Returns `Ok(None)` for anything that is not a data URL; such references are
/// passed through untouched.
pub fn parse_image_upload(raw: &str, max_bytes: usize) -> Result<Option<ImageUpload>, MediaError> {
    let Some(rest) = raw.strip_prefix(DATA_URL_SCHEME) else {
        return Ok(None);
    };
    let (mime, payload) = rest
        .split_once(BASE64_MARKER)
        .ok_or(MediaError::MalformedDataUrl)?;
    let kind = ImageKind::from_mime(&mime.to_ascii_lowercase())
        .ok_or_else(|| MediaError::UnsupportedMime(mime.to_string()))?;

    // reject before decoding when the encoded length already rules the image out
    let estimated = payload.len() / 4 * 3;
    if estimated > max_bytes + 3 {
        return Err(MediaError::TooLarge {
            size: estimated,
            max: max_bytes,
        });
    }

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|_| MediaError::InvalidEncoding)?;
    if bytes.is_empty() {
        return Err(MediaError::Empty);
    }
    if bytes.len() > max_bytes {
        return Err(MediaError::TooLarge {
            size: bytes.len(),
            max: max_bytes,
        });
    }
    Ok(Some(ImageUpload { kind, bytes }))
}

/// Validates a whole list before anything is written.
///
/// Entries that are not uploads must be http(s) URLs or paths under `media_base`.
pub fn parse_image_list(
    raw: &[String],
    max_bytes: usize,
    media_base: &str,
) -> Result<Vec<ImageInput>, MediaError> {
    raw.iter()
        .map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return Err(MediaError::Blank);
            }
            if let Some(upload) = parse_image_upload(entry, max_bytes)? {
                return Ok(ImageInput::Upload(upload));
            }
            if is_stored_reference(entry, media_base) {
                Ok(ImageInput::Stored(entry.to_string()))
            } else {
                Err(MediaError::UnknownReference(entry.to_string()))
            }
        })
        .collect()
}

fn is_stored_reference(entry: &str, media_base: &str) -> bool {
    let lower = entry.to_ascii_lowercase();
    let remote = ["https://", "http://"]
        .iter()
        .any(|scheme| lower.strip_prefix(scheme).is_some_and(|rest| !rest.is_empty()));
    if remote {
        return true;
    }
    let base = media_base.trim_end_matches('/');
    !base.is_empty()
        && entry
            .strip_prefix(base)
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|rest| !rest.is_empty() && !rest.split('/').any(|seg| seg == ".."))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredFile {
    pub path: PathBuf,
    pub url: String,
}

/// Content-addressed file store rooted at a local directory.
#[derive(Clone, Debug)]
pub struct MediaStore {
    root: PathBuf,
    base_url: String,
    max_image_bytes: usize,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>, max_image_bytes: usize) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_image_bytes,
        }
    }

    /// Validates request image entries against this store's size ceiling and base URL.
    pub fn parse_images(&self, raw: &[String]) -> Result<Vec<ImageInput>, MediaError> {
        parse_image_list(raw, self.max_image_bytes, &self.base_url)
    }

    /// Public URL for a path relative to the store root.
    pub fn url_for(&self, relative: &str) -> String {
        format!("{}/{}", self.base_url, relative.trim_start_matches('/'))
    }

    /// Writes validated images and returns the reference list to persist.
    pub async fn store_images(
        &self,
        folder: &str,
        images: Vec<ImageInput>,
    ) -> Result<Vec<String>, MediaError> {
        let mut refs = Vec::with_capacity(images.len());
        for image in images {
            match image {
                ImageInput::Stored(reference) => refs.push(reference),
                ImageInput::Upload(upload) => {
                    let name = format!("{}.{}", digest(&upload.bytes), upload.kind.extension());
                    let stored = self.write(folder, &name, &upload.bytes).await?;
                    refs.push(stored.url);
                }
            }
        }
        Ok(refs)
    }

    /// Stores an arbitrary file, keeping a sanitized form of its original name.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn store_file(
        &self,
        folder: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<StoredFile, MediaError> {
        if bytes.is_empty() {
            return Err(MediaError::Empty);
        }
        let hash = digest(bytes);
        let name = format!("{}-{}", &hash[..16], sanitize_filename(filename));
        self.write(folder, &name, bytes).await
    }

    /// Removes a stored file; a file that is already gone is not an error.
    pub async fn remove(&self, path: &Path) -> Result<(), MediaError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, folder: &str, name: &str, bytes: &[u8]) -> Result<StoredFile, MediaError> {
        let dir = self.root.join(folder);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(name);
        tokio::fs::write(&path, bytes).await?;
        debug!(path = %path.display(), "Stored media file");
        Ok(StoredFile {
            url: self.url_for(&format!("{}/{}", folder, name)),
            path,
        })
    }
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn sanitize_filename(filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("file");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}
