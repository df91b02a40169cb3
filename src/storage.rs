//! Payment proof storage.
//!
//! Screenshots arrive base64-encoded inside the JSON registration body. They are decoded and
//! sniffed here, then handed to a [`ProofStore`] which persists them and tells where they can be
//! retrieved from.

use std::{fs, path::PathBuf};

use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Top-level folder ("bucket") all payment screenshots live in.
pub const SCREENSHOT_BUCKET: &str = "payment-screenshots";

/// URL prefix the upload directory is mounted at.
pub const UPLOADS_MOUNT: &str = "/uploads";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error while storing '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Refusing to store under '{0}'")]
    InvalidKey(String),
}

/// Accepts a named blob and returns a URL it can be fetched from afterwards.
pub trait ProofStore: Send + Sync {
    fn store(&self, key: &str, bytes: &[u8]) -> Result<String, StorageError>;

    /// Removes a blob stored earlier. Missing blobs aren't an error.
    fn discard(&self, key: &str) -> Result<(), StorageError>;
}

/// Stores blobs as plain files below a root directory, which is served under
/// [`UPLOADS_MOUNT`].
#[derive(Clone, Debug)]
pub struct FsProofStore {
    root: PathBuf,
}

impl FsProofStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ProofStore for FsProofStore {
    fn store(&self, key: &str, bytes: &[u8]) -> Result<String, StorageError> {
        if key.split('/').any(|segment| segment.is_empty() || segment == "..") {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        let path = self.root.join(key);
        let io_error = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        fs::write(&path, bytes).map_err(io_error)?;

        Ok(format!("{UPLOADS_MOUNT}/{key}"))
    }

    fn discard(&self, key: &str) -> Result<(), StorageError> {
        if key.split('/').any(|segment| segment.is_empty() || segment == "..") {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        match fs::remove_file(self.root.join(key)) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(StorageError::Io {
                key: key.to_string(),
                source: err,
            }),
            _ => Ok(()),
        }
    }
}

/// Image formats accepted as payment proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageKind {
    /// Recognizes the format by its magic bytes.
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Self::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(Self::Webp)
        } else {
            None
        }
    }

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeImageError {
    #[error("not valid base64")]
    InvalidBase64,
    #[error("empty image")]
    Empty,
    #[error("image is larger than {limit} bytes")]
    TooLarge { limit: usize },
    #[error("not a PNG, JPEG, GIF or WebP image")]
    UnsupportedFormat,
}

/// A decoded screenshot, ready to be stored.
#[derive(Debug)]
pub struct ProofImage {
    pub bytes: Vec<u8>,
    pub kind: ImageKind,
}

/// Decodes a base64 payload, optionally wrapped in a `data:` URL as browsers produce it.
pub fn decode_image(payload: &str, limit: usize) -> Result<ProofImage, DecodeImageError> {
    let encoded = match payload.trim().split_once(',') {
        Some((header, data)) if header.starts_with("data:") => data,
        _ => payload.trim(),
    };
    // base64 grows by a third, so anything this long is too large anyway
    if encoded.len() / 4 * 3 > limit + 3 {
        return Err(DecodeImageError::TooLarge { limit });
    }

    let encoded: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = Base64::decode_vec(&encoded).map_err(|_| DecodeImageError::InvalidBase64)?;
    if bytes.is_empty() {
        return Err(DecodeImageError::Empty);
    }
    if bytes.len() > limit {
        return Err(DecodeImageError::TooLarge { limit });
    }

    let kind = ImageKind::sniff(&bytes).ok_or(DecodeImageError::UnsupportedFormat)?;
    Ok(ProofImage { bytes, kind })
}

/// Reduces an email to characters safe for a file name.
#[must_use]
pub fn sanitize_email(email: &str) -> String {
    email
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Builds the storage key of a payment screenshot, scoped by meetup and registrant.
#[must_use]
pub fn screenshot_key(
    meetup_id: i64,
    email: &str,
    uploaded_at: DateTime<Utc>,
    kind: ImageKind,
) -> String {
    format!(
        "{SCREENSHOT_BUCKET}/{meetup_id}/{}_{}.{}",
        sanitize_email(email),
        uploaded_at.timestamp_millis(),
        kind.extension()
    )
}
