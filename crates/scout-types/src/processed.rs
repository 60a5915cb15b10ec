use chrono::{DateTime, Utc};
use image::RgbImage;

use crate::color::{Highlight, Rgb};
use crate::frame::Frame;
use crate::rect::Rect;

/// 运动标注
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotionInfo {
    pub rect: Rect,
    pub highlight: Highlight,
}

/// 目标标注
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub rect: Rect,
    pub label: String,
    /// 置信度百分比 0..=100
    pub confidence: i32,
    pub highlight: Highlight,
}

impl ObjectInfo {
    pub fn is_person(&self) -> bool {
        self.label.eq_ignore_ascii_case("person")
    }
}

/// 人脸标注
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceInfo {
    pub rect: Rect,
    pub confidence: i32,
    pub highlight: Highlight,
}

/// 带标注的帧
///
/// 标注列表跟随句柄而非像素缓冲，替换标注不触碰像素。
/// `clone()` 共享像素缓冲，标注按值复制。
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    pub frame: Frame,
    pub motions: Vec<MotionInfo>,
    pub objects: Vec<ObjectInfo>,
    pub faces: Vec<FaceInfo>,
}

impl ProcessedFrame {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            motions: Vec::new(),
            objects: Vec::new(),
            faces: Vec::new(),
        }
    }

    pub fn created_time(&self) -> DateTime<Utc> {
        self.frame.created_time()
    }

    pub fn has_motion(&self) -> bool {
        !self.motions.is_empty()
    }

    pub fn has_object(&self) -> bool {
        !self.objects.is_empty()
    }

    pub fn has_face(&self) -> bool {
        !self.faces.is_empty()
    }

    pub fn has_person(&self) -> bool {
        self.objects.iter().any(|o| o.is_person())
    }

    pub fn max_object_confidence(&self) -> i32 {
        self.objects.iter().map(|o| o.confidence).max().unwrap_or(0)
    }

    pub fn max_face_confidence(&self) -> i32 {
        self.faces.iter().map(|f| f.confidence).max().unwrap_or(0)
    }

    /// 内容排序键：(人脸数, 最高人脸置信度, 目标数, 最高目标置信度)，降序使用
    pub fn content_key(&self) -> (usize, i32, usize, i32) {
        (
            self.faces.len(),
            self.max_face_confidence(),
            self.objects.len(),
            self.max_object_confidence(),
        )
    }

    /// 截取第 index 个目标区域
    pub fn object_region(&self, index: usize) -> Frame {
        match self.objects.get(index) {
            Some(obj) => self.frame.region(obj.rect),
            None => Frame::empty(),
        }
    }

    /// 截取第 index 个人脸区域
    pub fn face_region(&self, index: usize) -> Frame {
        match self.faces.get(index) {
            Some(face) => self.frame.region(face.rect),
            None => Frame::empty(),
        }
    }

    /// 深拷贝后画上全部标注框
    pub fn highlighted_all(&self) -> Frame {
        let mut image = match self.frame.pixels() {
            Some(p) => p.clone(),
            None => return Frame::empty().with_created_time(self.created_time()),
        };
        for m in &self.motions {
            draw_rect(&mut image, m.rect, m.highlight.color, m.highlight.thickness);
        }
        for o in &self.objects {
            draw_rect(&mut image, o.rect, o.highlight.color, o.highlight.thickness);
        }
        for f in &self.faces {
            draw_rect(&mut image, f.rect, f.highlight.color, f.highlight.thickness);
        }
        Frame::new(image).with_created_time(self.created_time())
    }
}

/// 逐像素画矩形边框
fn draw_rect(image: &mut RgbImage, rect: Rect, color: Rgb, thickness: u32) {
    let rect = rect.corrected(image.width(), image.height());
    if rect.is_empty() {
        return;
    }
    let pixel = image::Rgb([color.0, color.1, color.2]);
    let t = thickness as i32;
    for dy in 0..rect.height() {
        for dx in 0..rect.width() {
            let edge = dx < t || dy < t || dx >= rect.width() - t || dy >= rect.height() - t;
            if edge {
                let x = rect.min_x + dx;
                let y = rect.min_y + dy;
                if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
                    image.put_pixel(x as u32, y as u32, pixel);
                }
            }
        }
    }
}
