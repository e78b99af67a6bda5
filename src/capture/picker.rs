//! File picker source
//!
//! Reads image files from disk when no camera is available.

use std::path::{Path, PathBuf};

use super::types::{CaptureError, CapturePayload};

fn is_image(path: &Path) -> bool {
    mime_guess::from_path(path)
        .first()
        .is_some_and(|mime| mime.type_() == mime_guess::mime::IMAGE)
}

/// Read one image file as a capture payload
pub async fn read_image_file(path: &Path) -> Result<CapturePayload, CaptureError> {
    if !is_image(path) {
        return Err(CaptureError::UnsupportedFile(path.display().to_string()));
    }

    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image.jpg".to_string());

    Ok(CapturePayload::Encoded { file_name, bytes })
}

/// Image files directly inside `dir`, sorted by name
pub async fn list_image_files(dir: &Path) -> Result<Vec<PathBuf>, CaptureError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && is_image(&path) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_image_with_its_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("label-01.png");
        std::fs::write(&path, b"\x89PNG fake").unwrap();

        let payload = read_image_file(&path).await.unwrap();
        assert_eq!(payload.file_name(), "label-01.png");
        match payload {
            CapturePayload::Encoded { bytes, .. } => assert_eq!(bytes, b"\x89PNG fake"),
            CapturePayload::Frame { .. } => panic!("expected encoded payload"),
        }
    }

    #[tokio::test]
    async fn test_rejects_non_images() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        let result = read_image_file(&path).await;
        assert!(matches!(result, Err(CaptureError::UnsupportedFile(_))));
    }

    #[tokio::test]
    async fn test_lists_images_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.jpg", "a.png", "readme.md", "c.JPEG"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.jpg")).unwrap();

        let names: Vec<String> = list_image_files(dir.path())
            .await
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.png", "b.jpg", "c.JPEG"]);
    }
}
