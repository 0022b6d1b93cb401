// Image upload validation and storage
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::error::AppError;

/// Image types accepted for upload, with the extensions each may carry.
/// The first extension is the canonical one.
const ALLOWED_TYPES: &[(&str, &[&str])] = &[
    ("image/jpeg", &["jpg", "jpeg"]),
    ("image/png", &["png"]),
    ("image/gif", &["gif"]),
    ("image/webp", &["webp"]),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("No file uploaded")]
    Missing,

    #[error("Invalid file type. Only JPG, PNG, GIF, and WebP allowed.")]
    InvalidType,

    #[error("File too large. Maximum size is {}.", human_size(.0))]
    TooLarge(usize),
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// An upload that passed validation and has been given its stored name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub filename: String,
    pub content_type: &'static str,
}

impl StoredImage {
    pub fn url(&self) -> String {
        format!("/uploads/{}", self.filename)
    }
}

/// Detect the image type from the file's leading bytes. The declared
/// content type is never trusted on its own.
pub fn sniff_image_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// Pick the stored extension: the original one when it agrees with the
/// detected type, the canonical one otherwise.
pub fn extension_for(content_type: &str, original_name: Option<&str>) -> Option<&'static str> {
    let (_, extensions) = ALLOWED_TYPES.iter().find(|(ct, _)| *ct == content_type)?;

    let original = original_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    let chosen = original
        .and_then(|ext| extensions.iter().find(|allowed| **allowed == ext))
        .or_else(|| extensions.first())?;
    Some(*chosen)
}

/// Validate raw upload bytes and name the file. Nothing is written yet.
pub fn validate(
    bytes: &[u8],
    original_name: Option<&str>,
    max_bytes: usize,
) -> Result<StoredImage, UploadError> {
    if bytes.is_empty() {
        return Err(UploadError::Missing);
    }
    if bytes.len() > max_bytes {
        return Err(UploadError::TooLarge(max_bytes));
    }

    let content_type = sniff_image_type(bytes).ok_or(UploadError::InvalidType)?;
    let ext = extension_for(content_type, original_name).ok_or(UploadError::InvalidType)?;

    Ok(StoredImage {
        filename: format!("img_{}.{}", uuid::Uuid::now_v7().simple(), ext),
        content_type,
    })
}

/// Write a validated image under the uploads directory.
pub async fn store(dir: &Path, image: &StoredImage, bytes: &[u8]) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(&image.filename);
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

/// Map a requested filename to a path inside the uploads directory.
/// Anything that is not a single plain path segment is refused.
pub fn resolve(dir: &Path, filename: &str) -> Option<PathBuf> {
    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if !filename.contains('\\') => Some(dir.join(name)),
        _ => None,
    }
}

fn human_size(bytes: &usize) -> String {
    const MIB: usize = 1024 * 1024;
    const KIB: usize = 1024;
    let bytes = *bytes;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else if bytes >= KIB && bytes % KIB == 0 {
        format!("{}KB", bytes / KIB)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    const MAX: usize = 5 * 1024 * 1024;

    #[test]
    fn sniffs_each_allowed_type() {
        assert_eq!(sniff_image_type(PNG), Some("image/png"));
        assert_eq!(sniff_image_type(JPEG), Some("image/jpeg"));
        assert_eq!(sniff_image_type(b"GIF89a...."), Some("image/gif"));
        assert_eq!(sniff_image_type(b"RIFF\0\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_image_type(b"<?php echo 1; ?>"), None);
        assert_eq!(sniff_image_type(b"RIFF\0\0\0\0WAVE"), None);
    }

    #[test]
    fn extension_prefers_matching_original() {
        assert_eq!(extension_for("image/jpeg", Some("photo.JPEG")), Some("jpeg"));
        assert_eq!(extension_for("image/jpeg", Some("photo.jpg")), Some("jpg"));
        assert_eq!(extension_for("image/jpeg", None), Some("jpg"));
        // A lying extension never survives
        assert_eq!(extension_for("image/png", Some("shell.php")), Some("png"));
        assert_eq!(extension_for("text/html", Some("a.png")), None);
    }

    #[test]
    fn validate_names_file_with_prefix_and_extension() {
        let image = validate(PNG, Some("diagram.png"), MAX).unwrap();
        assert!(image.filename.starts_with("img_"));
        assert!(image.filename.ends_with(".png"));
        assert_eq!(image.content_type, "image/png");
        assert_eq!(image.url(), format!("/uploads/{}", image.filename));
    }

    #[test]
    fn validate_generates_distinct_names() {
        let a = validate(PNG, None, MAX).unwrap();
        let b = validate(PNG, None, MAX).unwrap();
        assert_ne!(a.filename, b.filename);
    }

    #[test]
    fn validate_rejects_empty_non_image_and_oversized() {
        assert_eq!(validate(b"", None, MAX), Err(UploadError::Missing));
        assert_eq!(
            validate(b"plain text", Some("a.png"), MAX),
            Err(UploadError::InvalidType)
        );
        assert_eq!(validate(PNG, None, 4), Err(UploadError::TooLarge(4)));
    }

    #[test]
    fn error_messages_match_client_expectations() {
        assert_eq!(
            UploadError::TooLarge(MAX).to_string(),
            "File too large. Maximum size is 5MB."
        );
        assert_eq!(
            UploadError::InvalidType.to_string(),
            "Invalid file type. Only JPG, PNG, GIF, and WebP allowed."
        );
        assert_eq!(UploadError::Missing.to_string(), "No file uploaded");
    }

    #[test]
    fn resolve_refuses_traversal() {
        let dir = Path::new("/srv/uploads");
        assert_eq!(
            resolve(dir, "img_1.png"),
            Some(PathBuf::from("/srv/uploads/img_1.png"))
        );
        assert_eq!(resolve(dir, "../secret"), None);
        assert_eq!(resolve(dir, "a/b.png"), None);
        assert_eq!(resolve(dir, "/etc/passwd"), None);
        assert_eq!(resolve(dir, ".."), None);
        assert_eq!(resolve(dir, ""), None);
        assert_eq!(resolve(dir, "..\\x"), None);
    }

    #[tokio::test]
    async fn store_writes_bytes_under_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("uploads");
        let image = validate(PNG, None, MAX).unwrap();

        let path = store(&dir, &image, PNG).await.unwrap();
        assert_eq!(path, dir.join(&image.filename));
        assert_eq!(std::fs::read(path).unwrap(), PNG);
    }
}
