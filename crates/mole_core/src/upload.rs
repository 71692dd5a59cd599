//! Upload candidates and the validator that gates them before any network call.

use crate::config::DEFAULT_MAX_UPLOAD_BYTES;
use crate::error::Rejection;
use anyhow::{Context, Result};
use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Media type used when nothing better is known about a file.
pub const UNKNOWN_MEDIA_TYPE: &str = "application/octet-stream";

/// Where the bytes of a candidate live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateSource {
    Path(PathBuf),
    Memory(Arc<[u8]>),
}

/// A user-selected file awaiting validation and analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCandidate {
    pub file_name: String,
    /// Declared media type, e.g. `image/jpeg`.
    pub media_type: String,
    /// Size in bytes.
    pub size: u64,
    pub source: CandidateSource,
}

impl UploadCandidate {
    /// Builds a candidate from file metadata; the contents are not read.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let meta = fs::metadata(path)
            .with_context(|| format!("cannot inspect file: {}", path.display()))?;
        if !meta.is_file() {
            anyhow::bail!("Path is not a file: {}", path.display());
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self {
            file_name,
            media_type: media_type_for_path(path).to_string(),
            size: meta.len(),
            source: CandidateSource::Path(path.to_path_buf()),
        })
    }

    pub fn from_bytes(
        file_name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        let bytes = bytes.into();
        Self {
            file_name: file_name.into(),
            media_type: media_type.into(),
            size: bytes.len() as u64,
            source: CandidateSource::Memory(bytes),
        }
    }

    /// Reads the candidate's bytes. Only called when an upload is sent.
    pub async fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        match &self.source {
            CandidateSource::Path(path) => tokio::fs::read(path).await,
            CandidateSource::Memory(bytes) => Ok(bytes.to_vec()),
        }
    }
}

/// Media type a browser would declare for a file, judged by its extension.
pub fn media_type_for_path(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
        return UNKNOWN_MEDIA_TYPE;
    };
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "heic" => "image/heic",
        _ => UNKNOWN_MEDIA_TYPE,
    }
}

/// Extensions offered in file pickers.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff", "heic",
];

/// A candidate that passed validation. Only [`UploadValidator`] creates these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedUpload(UploadCandidate);

impl AcceptedUpload {
    pub fn into_inner(self) -> UploadCandidate {
        self.0
    }
}

impl Deref for AcceptedUpload {
    type Target = UploadCandidate;

    fn deref(&self) -> &UploadCandidate {
        &self.0
    }
}

/// Accepts image files up to a size ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadValidator {
    max_bytes: u64,
}

impl Default for UploadValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UPLOAD_BYTES)
    }
}

impl UploadValidator {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn validate(&self, candidate: UploadCandidate) -> Result<AcceptedUpload, Rejection> {
        if !is_image_media_type(&candidate.media_type) {
            return Err(Rejection::NotAnImage {
                media_type: candidate.media_type,
            });
        }
        if candidate.size > self.max_bytes {
            return Err(Rejection::TooLarge {
                size: candidate.size,
                limit: self.max_bytes,
            });
        }
        Ok(AcceptedUpload(candidate))
    }
}

fn is_image_media_type(media_type: &str) -> bool {
    let essence = media_type.split(';').next().unwrap_or_default().trim();
    match essence.split_once('/') {
        Some((top, sub)) => top.eq_ignore_ascii_case("image") && !sub.is_empty(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    const MIB: u64 = 1024 * 1024;

    fn candidate(media_type: &str, size: u64) -> UploadCandidate {
        UploadCandidate {
            file_name: "mole.jpg".into(),
            media_type: media_type.into(),
            size,
            source: CandidateSource::Memory(Arc::from(Vec::new())),
        }
    }

    #[rstest]
    #[case("text/plain")]
    #[case("application/pdf")]
    #[case("")]
    #[case("image")]
    #[case("image/")]
    #[case("video/mp4")]
    fn non_image_types_are_rejected(#[case] media_type: &str) {
        let result = UploadValidator::default().validate(candidate(media_type, 1024));
        assert!(matches!(result, Err(Rejection::NotAnImage { .. })));
    }

    #[rstest]
    #[case("image/jpeg")]
    #[case("image/png")]
    #[case("IMAGE/WEBP")]
    #[case("image/svg+xml; charset=utf-8")]
    fn image_types_are_accepted(#[case] media_type: &str) {
        assert!(UploadValidator::default()
            .validate(candidate(media_type, 1024))
            .is_ok());
    }

    #[rstest]
    #[case(10 * MIB, true)]
    #[case(10 * MIB - 1, true)]
    #[case(10 * MIB + 1, false)]
    #[case(0, true)]
    fn size_ceiling_is_inclusive(#[case] size: u64, #[case] accepted: bool) {
        let result = UploadValidator::default().validate(candidate("image/png", size));
        assert_eq!(result.is_ok(), accepted);
        if !accepted {
            assert_eq!(
                result.unwrap_err(),
                Rejection::TooLarge {
                    size,
                    limit: 10 * MIB
                }
            );
        }
    }

    #[test]
    fn custom_ceiling_applies() {
        let validator = UploadValidator::new(100);
        assert!(validator.validate(candidate("image/png", 100)).is_ok());
        assert!(validator.validate(candidate("image/png", 101)).is_err());
    }

    #[rstest]
    #[case("a.JPG", "image/jpeg")]
    #[case("b.jpeg", "image/jpeg")]
    #[case("c.png", "image/png")]
    #[case("d.tiff", "image/tiff")]
    #[case("notes.txt", UNKNOWN_MEDIA_TYPE)]
    #[case("no_extension", UNKNOWN_MEDIA_TYPE)]
    fn media_type_follows_extension(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(media_type_for_path(Path::new(name)), expected);
    }

    #[test]
    fn from_path_reads_metadata_only() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("mole.png");
        let mut file = File::create(&path)?;
        file.write_all(&[0u8; 2048])?;

        let c = UploadCandidate::from_path(&path)?;
        assert_eq!(c.file_name, "mole.png");
        assert_eq!(c.media_type, "image/png");
        assert_eq!(c.size, 2048);
        assert_eq!(c.source, CandidateSource::Path(path));
        Ok(())
    }

    #[test]
    fn from_path_rejects_directories() -> Result<()> {
        let dir = tempdir()?;
        assert!(UploadCandidate::from_path(dir.path()).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn read_bytes_from_memory_and_disk() -> Result<()> {
        let mem = UploadCandidate::from_bytes("x.png", "image/png", vec![1u8, 2, 3]);
        assert_eq!(mem.size, 3);
        assert_eq!(mem.read_bytes().await?, vec![1, 2, 3]);

        let dir = tempdir()?;
        let path = dir.path().join("y.jpg");
        fs::write(&path, b"jpeg")?;
        let disk = UploadCandidate::from_path(&path)?;
        assert_eq!(disk.read_bytes().await?, b"jpeg".to_vec());
        Ok(())
    }
}
