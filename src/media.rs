// Uploaded images arrive as base64 form payloads and land under the
// configured media root; rows store the relative path.

use base64::Engine;
use std::fs;
use std::path::Path;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub fn save_base64_image(media_root: &str, subdir: &str, payload: &str) -> AppResult<String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|_| AppError::Validation("image is not valid base64".to_string()))?;
    if bytes.is_empty() {
        return Err(AppError::Validation("image payload is empty".to_string()));
    }

    let dir = Path::new(media_root).join(subdir);
    fs::create_dir_all(&dir)
        .map_err(|e| AppError::Internal(format!("failed to create media dir: {}", e)))?;

    let filename = format!("{}.img", Uuid::new_v4().simple());
    fs::write(dir.join(&filename), &bytes)
        .map_err(|e| AppError::Internal(format!("failed to write image: {}", e)))?;

    Ok(format!("{}/{}", subdir, filename))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    #[test]
    fn test_save_and_reject() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_str().unwrap();

        let payload = base64::engine::general_purpose::STANDARD.encode(b"fake image bytes");
        let stored = save_base64_image(root, "posts", &payload).unwrap();
        assert!(stored.starts_with("posts/"));
        let on_disk = fs::read(Path::new(root).join(&stored)).unwrap();
        assert_eq!(on_disk, b"fake image bytes");

        assert!(save_base64_image(root, "posts", "%%%not-base64%%%").is_err());
        assert!(save_base64_image(root, "posts", "").is_err());
    }
}
