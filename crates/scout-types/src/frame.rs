use std::io::Cursor;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, RgbImage};

use crate::rect::Rect;

/// 像素缓冲（RGB24）
///
/// 缓冲本身不可变，多个帧句柄通过 `Arc` 共享同一份像素。
pub struct PixelBuffer {
    image: RgbImage,
}

impl PixelBuffer {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}

/// 帧句柄
///
/// `clone()` 返回共享同一像素缓冲的新句柄（引用计数 +1），
/// `clone_pixels()` 进行深拷贝（变换前必须先深拷贝），
/// 释放即 `drop`，最后一个句柄释放时像素缓冲销毁。
pub struct Frame {
    pixels: Option<Arc<PixelBuffer>>,
    created_time: DateTime<Utc>,
}

impl Clone for Frame {
    fn clone(&self) -> Self {
        Self {
            pixels: self.pixels.clone(),
            created_time: self.created_time,
        }
    }
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            pixels: Some(Arc::new(PixelBuffer::new(image))),
            created_time: Utc::now(),
        }
    }

    /// 无像素的空帧
    pub fn empty() -> Self {
        Self {
            pixels: None,
            created_time: Utc::now(),
        }
    }

    /// 从 rawvideo rgb24 数据构造
    pub fn from_raw_rgb(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        RgbImage::from_raw(width, height, data).map(Self::new)
    }

    pub fn with_created_time(mut self, t: DateTime<Utc>) -> Self {
        self.created_time = t;
        self
    }

    pub fn created_time(&self) -> DateTime<Utc> {
        self.created_time
    }

    pub fn is_filled(&self) -> bool {
        self.pixels
            .as_ref()
            .map(|p| p.width() > 0 && p.height() > 0)
            .unwrap_or(false)
    }

    pub fn width(&self) -> u32 {
        self.pixels.as_ref().map(|p| p.width()).unwrap_or(0)
    }

    pub fn height(&self) -> u32 {
        self.pixels.as_ref().map(|p| p.height()).unwrap_or(0)
    }

    pub fn pixels(&self) -> Option<&RgbImage> {
        self.pixels.as_ref().map(|p| p.image())
    }

    /// 当前像素缓冲的句柄数，空帧为 0
    pub fn handle_count(&self) -> usize {
        self.pixels.as_ref().map(Arc::strong_count).unwrap_or(0)
    }

    /// 深拷贝像素
    pub fn clone_pixels(&self) -> Frame {
        match self.pixels.as_ref() {
            Some(p) => Frame {
                pixels: Some(Arc::new(PixelBuffer::new(p.image().clone()))),
                created_time: self.created_time,
            },
            None => Frame {
                pixels: None,
                created_time: self.created_time,
            },
        }
    }

    /// 等比缩放到目标宽度，宽度不变或空帧时返回共享句柄
    pub fn scale_to_width(&self, width: u32) -> Frame {
        let cur_width = self.width();
        if width == 0 || width == cur_width || !self.is_filled() {
            return self.clone();
        }
        let image = match self.pixels.as_ref() {
            Some(p) => p.image(),
            None => return self.clone(),
        };
        // 缩小用 Triangle，放大用 CatmullRom
        let filter = if width < cur_width {
            FilterType::Triangle
        } else {
            FilterType::CatmullRom
        };
        let scale = width as f64 / cur_width as f64;
        let height = ((self.height() as f64 * scale).round() as u32).max(1);
        let scaled = imageops::resize(image, width, height, filter);
        Frame {
            pixels: Some(Arc::new(PixelBuffer::new(scaled))),
            created_time: self.created_time,
        }
    }

    /// 截取矩形区域（先裁剪进图像范围），空交集返回空帧
    pub fn region(&self, rect: Rect) -> Frame {
        let image = match self.pixels.as_ref() {
            Some(p) => p.image(),
            None => return Frame::empty().with_created_time(self.created_time),
        };
        let corrected = rect.corrected(self.width(), self.height());
        if corrected.is_empty() {
            return Frame::empty().with_created_time(self.created_time);
        }
        let cropped = imageops::crop_imm(
            image,
            corrected.min_x as u32,
            corrected.min_y as u32,
            corrected.width() as u32,
            corrected.height() as u32,
        )
        .to_image();
        Frame {
            pixels: Some(Arc::new(PixelBuffer::new(cropped))),
            created_time: self.created_time,
        }
    }

    /// JPEG 编码，quality 取 1..=100
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let image = self
            .pixels
            .as_ref()
            .ok_or_else(|| anyhow!("cannot encode an empty frame"))?
            .image();
        let mut buf = Cursor::new(Vec::new());
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
        encoder.encode(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )?;
        Ok(buf.into_inner())
    }

    /// JPEG 往返压缩以降低画质，失败时返回原句柄
    pub fn reencode_quality(&self, quality: u8) -> Frame {
        if !self.is_filled() {
            return self.clone();
        }
        let encoded = match self.encode_jpeg(quality) {
            Ok(buf) => buf,
            Err(_) => return self.clone(),
        };
        match image::load_from_memory(&encoded) {
            Ok(decoded) => Frame {
                pixels: Some(Arc::new(PixelBuffer::new(decoded.to_rgb8()))),
                created_time: self.created_time,
            },
            Err(_) => self.clone(),
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("created_time", &self.created_time)
            .field("handles", &self.handle_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid_frame(width: u32, height: u32, color: Rgb<u8>) -> Frame {
        Frame::new(RgbImage::from_pixel(width, height, color))
    }

    #[test]
    fn test_handle_sharing() {
        let frame = solid_frame(8, 8, Rgb([10, 20, 30]));
        assert_eq!(frame.handle_count(), 1);

        let reference = frame.clone();
        assert_eq!(frame.handle_count(), 2);
        assert_eq!(reference.handle_count(), 2);

        drop(reference);
        assert_eq!(frame.handle_count(), 1);
    }

    #[test]
    fn test_clone_pixels_is_deep() {
        let frame = solid_frame(8, 8, Rgb([10, 20, 30]));
        let deep = frame.clone_pixels();
        // 深拷贝各自独立计数
        assert_eq!(frame.handle_count(), 1);
        assert_eq!(deep.handle_count(), 1);
        assert_eq!(deep.created_time(), frame.created_time());
    }

    #[test]
    fn test_empty_frame() {
        let frame = Frame::empty();
        assert!(!frame.is_filled());
        assert_eq!(frame.width(), 0);
        assert_eq!(frame.handle_count(), 0);
        assert!(frame.encode_jpeg(80).is_err());
    }

    #[test]
    fn test_scale_to_width_preserves_aspect() {
        let frame = solid_frame(640, 480, Rgb([1, 2, 3]));
        let scaled = frame.scale_to_width(320);
        assert_eq!(scaled.width(), 320);
        assert_eq!(scaled.height(), 240);
        // 原句柄不受影响
        assert_eq!(frame.width(), 640);
    }

    #[test]
    fn test_scale_same_width_shares_pixels() {
        let frame = solid_frame(64, 48, Rgb([1, 2, 3]));
        let same = frame.scale_to_width(64);
        assert_eq!(frame.handle_count(), 2);
        assert_eq!(same.width(), 64);
    }

    #[test]
    fn test_region_clamps_to_image() {
        let frame = solid_frame(100, 80, Rgb([9, 9, 9]));
        let region = frame.region(Rect::new(-10, -10, 50, 200));
        assert_eq!(region.width(), 50);
        assert_eq!(region.height(), 80);

        let outside = frame.region(Rect::new(200, 200, 300, 300));
        assert!(!outside.is_filled());
    }

    #[test]
    fn test_jpeg_round_trip() {
        let frame = solid_frame(32, 32, Rgb([120, 130, 140]));
        let reencoded = frame.reencode_quality(40);
        assert!(reencoded.is_filled());
        assert_eq!(reencoded.width(), 32);
        assert_eq!(reencoded.created_time(), frame.created_time());
    }
}
