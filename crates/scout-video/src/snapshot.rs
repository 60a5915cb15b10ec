use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use scout_storage::image_filename;
use scout_types::Frame;

/// 预览图宽度
pub const PREVIEW_WIDTH: u32 = 128;

/// 保存 JPEG 快照，返回保存路径
pub async fn save_image(
    frame: &Frame,
    t: DateTime<Local>,
    dir: &Path,
    quality: u8,
    name: &str,
    title: &str,
    percentage: &str,
) -> Result<PathBuf> {
    let path = image_filename(t, dir, name, title, percentage);
    let encoded = frame.encode_jpeg(quality)?;
    tokio::fs::write(&path, encoded)
        .await
        .with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

/// 保存 128 宽预览图，重命名为 `.jpg.preview`
pub async fn save_preview(
    frame: &Frame,
    t: DateTime<Local>,
    dir: &Path,
    name: &str,
    title: &str,
    percentage: &str,
) -> Result<PathBuf> {
    let path = image_filename(t, dir, name, title, percentage);
    let scaled = frame.scale_to_width(PREVIEW_WIDTH.min(frame.width().max(1)));
    let encoded = scaled.encode_jpeg(80)?;
    tokio::fs::write(&path, encoded)
        .await
        .with_context(|| format!("write {}", path.display()))?;
    let preview_path = PathBuf::from(format!("{}.preview", path.to_string_lossy()));
    tokio::fs::rename(&path, &preview_path)
        .await
        .with_context(|| format!("rename {}", path.display()))?;
    Ok(preview_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn frame() -> Frame {
        Frame::new(RgbImage::from_pixel(256, 128, Rgb([50, 60, 70])))
    }

    #[tokio::test]
    async fn test_save_image_writes_jpeg() {
        let tmp = tempfile::tempdir().unwrap();
        let path = save_image(
            &frame(),
            Local::now(),
            tmp.path(),
            80,
            "porch",
            "Original",
            "",
        )
        .await
        .unwrap();
        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("porch_"));
        assert!(name.ends_with("_Original.jpg"));
        // 能解回图片
        let bytes = tokio::fs::read(&path).await.unwrap();
        assert!(image::load_from_memory(&bytes).is_ok());
    }

    #[tokio::test]
    async fn test_save_preview_is_scaled_and_renamed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = save_preview(&frame(), Local::now(), tmp.path(), "porch", "", "")
            .await
            .unwrap();
        assert!(path.to_string_lossy().ends_with(".jpg.preview"));
        let bytes = tokio::fs::read(&path).await.unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.width(), PREVIEW_WIDTH);
    }

    #[tokio::test]
    async fn test_save_image_empty_frame_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let result = save_image(
            &Frame::empty(),
            Local::now(),
            tmp.path(),
            80,
            "porch",
            "",
            "",
        )
        .await;
        assert!(result.is_err());
    }
}
