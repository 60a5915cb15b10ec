use image::{GrayImage, RgbImage};

/// 背景减除内核：输入一帧，输出前景差异图（0..255）
pub trait BackgroundSubtractor: Send {
    fn apply(&mut self, image: &RgbImage) -> GrayImage;
}

/// 滑动平均背景模型
///
/// 背景以 learning_rate 向当前帧靠拢，差异图为 |当前灰度 - 背景|。
/// 第一帧用于初始化背景，差异为全零。
pub struct RunningAverage {
    background: Vec<f32>,
    width: u32,
    height: u32,
    learning_rate: f32,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self {
            background: Vec::new(),
            width: 0,
            height: 0,
            learning_rate: 0.05,
        }
    }

    pub fn with_learning_rate(mut self, rate: f32) -> Self {
        self.learning_rate = rate.clamp(0.0, 1.0);
        self
    }

    fn luma(pixel: &image::Rgb<u8>) -> f32 {
        0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32
    }
}

impl Default for RunningAverage {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundSubtractor for RunningAverage {
    fn apply(&mut self, image: &RgbImage) -> GrayImage {
        let (width, height) = image.dimensions();
        let len = (width * height) as usize;
        if self.background.len() != len || self.width != width || self.height != height {
            // 分辨率变化或首帧：重建背景
            self.background = image.pixels().map(Self::luma).collect();
            self.width = width;
            self.height = height;
            return GrayImage::new(width, height);
        }
        let mut data = vec![0u8; len];
        for (i, pixel) in image.pixels().enumerate() {
            let current = Self::luma(pixel);
            let bg = self.background[i];
            data[i] = (current - bg).abs().min(255.0) as u8;
            self.background[i] = bg + (current - bg) * self.learning_rate;
        }
        GrayImage::from_raw(width, height, data).unwrap_or_else(|| GrayImage::new(width, height))
    }
}
