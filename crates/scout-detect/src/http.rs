//! SSD 推理服务的 HTTP 客户端
//!
//! 服务契约：
//! - `GET  {base}/health` 健康检查，200 即就绪；
//! - `POST {base}/detect` multipart 表单：`image` 为 JPEG、`target` 为
//!   `cpu`/`cuda`，响应为 JSON 数组，坐标归一化到 0..1：
//!   `[{"x1":…,"y1":…,"x2":…,"y2":…,"label":"person","conf":0.93}]`

use std::io::Cursor;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::kernel::{Backend, Detection, DetectorKernel};
use scout_types::Rect;

#[derive(Debug, Clone, Deserialize)]
struct BBox {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    label: String,
    conf: f32,
}

fn to_detection(bbox: &BBox, width: u32, height: u32) -> Detection {
    let w = width as f32;
    let h = height as f32;
    Detection {
        rect: Rect::new(
            (bbox.x1 * w).round() as i32,
            (bbox.y1 * h).round() as i32,
            (bbox.x2 * w).round() as i32,
            (bbox.y2 * h).round() as i32,
        ),
        label: bbox.label.clone(),
        confidence: bbox.conf,
    }
}

fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, 90);
    encoder.encode(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(buf.into_inner())
}

/// 外部 SSD 服务内核
pub struct HttpDetector {
    client: reqwest::Client,
    base_url: String,
    backend: Backend,
}

impl HttpDetector {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64, backend: Backend) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms.max(1)))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            backend,
        }
    }
}

#[async_trait]
impl DetectorKernel for HttpDetector {
    async fn load(&mut self) -> Result<()> {
        if self.base_url.is_empty() {
            bail!("inferenceUrl is not configured");
        }
        let url = format!("{}/health", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("inference service unreachable at {}", url))?;
        resp.error_for_status()
            .context("inference service unhealthy")?;
        Ok(())
    }

    async fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let jpeg = encode_jpeg(image)?;
        let part = Part::bytes(jpeg)
            .file_name("frame.jpg")
            .mime_str("image/jpeg")?;
        let form = Form::new()
            .part("image", part)
            .text("target", self.backend.as_str());
        let resp = self
            .client
            .post(format!("{}/detect", self.base_url))
            .multipart(form)
            .send()
            .await
            .context("inference request failed")?
            .error_for_status()
            .context("inference request rejected")?;
        let boxes: Vec<BBox> = resp.json().await.context("invalid inference response")?;
        Ok(boxes
            .iter()
            .map(|bbox| to_detection(bbox, image.width(), image.height()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_scales_to_pixels() {
        let bbox = BBox {
            x1: 0.25,
            y1: 0.5,
            x2: 0.75,
            y2: 1.0,
            label: "person".to_string(),
            conf: 0.9,
        };
        let detection = to_detection(&bbox, 320, 240);
        assert_eq!(detection.rect, Rect::new(80, 120, 240, 240));
        assert_eq!(detection.label, "person");
    }

    #[tokio::test]
    async fn test_load_without_url_fails() {
        let mut detector = HttpDetector::new("", 1_000, Backend::Cpu);
        assert!(detector.load().await.is_err());
    }
}
