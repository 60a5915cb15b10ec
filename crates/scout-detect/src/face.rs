use scout_config::FaceConfig;
use scout_types::{FaceInfo, Highlight, ProcessedFrame};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::http::HttpDetector;
use crate::kernel::{Backend, DetectorKernel};

/// 人脸检测 stage
///
/// 消费目标 stage 的输出，无目标时原样转发。
/// 保留的人脸框经过 padding、补方，并要求与至少一个目标框重叠；
/// 与已留人脸重叠时只在置信度更高时替换。
pub struct FaceStage {
    config: FaceConfig,
    kernel: Box<dyn DetectorKernel>,
}

impl FaceStage {
    pub fn new(config: FaceConfig) -> Self {
        let backend = Backend::select(config.force_cpu);
        let kernel = Box::new(HttpDetector::new(
            config.inference_url.clone(),
            config.inference_timeout_milli_seconds,
            backend,
        ));
        Self { config, kernel }
    }

    pub fn with_kernel(config: FaceConfig, kernel: Box<dyn DetectorKernel>) -> Self {
        Self { config, kernel }
    }

    pub fn run(
        mut self,
        mut input: mpsc::Receiver<ProcessedFrame>,
        buffer: usize,
    ) -> mpsc::Receiver<ProcessedFrame> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        tokio::spawn(async move {
            if !self.config.skip {
                match self.kernel.load().await {
                    Ok(()) => {
                        info!(backend = Backend::select(self.config.force_cpu).as_str(),
                              "face detector loaded");
                    }
                    Err(e) => {
                        error!(error = %e, "could not load face detector");
                        return;
                    }
                }
            }
            while let Some(img) = input.recv().await {
                let result = self.process(img).await;
                if tx.send(result).await.is_err() {
                    break;
                }
            }
        });
        rx
    }

    async fn process(&mut self, mut img: ProcessedFrame) -> ProcessedFrame {
        if self.config.skip || !img.has_object() {
            return img;
        }
        let orig_width = img.frame.width();
        let orig_height = img.frame.height();
        let scale_width = if self.config.scale_width > 0 {
            self.config.scale_width.min(orig_width)
        } else {
            orig_width
        };
        let scaled = img.frame.scale_to_width(scale_width);
        let image = match scaled.pixels() {
            Some(image) => image,
            None => return img,
        };
        let detections = match self.kernel.detect(image).await {
            Ok(detections) => detections,
            Err(e) => {
                warn!(error = %e, "face detect failed, forwarding frame");
                return img;
            }
        };

        let ratio = orig_width as f64 / scaled.width() as f64;
        let image_area = orig_width as i64 * orig_height as i64;
        let max_area = image_area * self.config.max_percentage as i64 / 100;
        let highlight = Highlight::new(&self.config.highlight_color, self.config.highlight_thickness);

        for detection in detections {
            let confidence = (detection.confidence * 100.0) as i32;
            if confidence < self.config.min_confidence_percentage {
                continue;
            }
            let scaled_rect = detection.rect.scaled(orig_width, orig_height, ratio);
            if scaled_rect.area() > max_area {
                continue;
            }
            let padded = scaled_rect.padded(orig_width, orig_height, self.config.padding);
            let final_rect = padded.squared(orig_width, orig_height);
            let within_object = img.objects.iter().any(|object| {
                let (overlap, _) = final_rect.overlap_percent(&object.rect);
                overlap >= self.config.min_overlap_percentage
            });
            if !within_object {
                continue;
            }

            let mut is_new = true;
            for existing in img.faces.iter_mut() {
                if final_rect.overlaps(&existing.rect) {
                    is_new = false;
                    if existing.confidence < confidence {
                        // 更高置信度的替换
                        *existing = FaceInfo {
                            rect: final_rect,
                            confidence,
                            highlight,
                        };
                    }
                    break;
                }
            }
            if is_new {
                img.faces.push(FaceInfo {
                    rect: final_rect,
                    confidence,
                    highlight,
                });
            }
        }
        img
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Detection;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use scout_types::{Frame, ObjectInfo, Rect};

    struct ScriptedKernel {
        fail_load: bool,
        detections: Vec<Detection>,
    }

    #[async_trait]
    impl DetectorKernel for ScriptedKernel {
        async fn load(&mut self) -> Result<()> {
            if self.fail_load {
                return Err(anyhow!("model file missing"));
            }
            Ok(())
        }

        async fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>> {
            Ok(self.detections.clone())
        }
    }

    fn frame_with_object(rect: Rect) -> ProcessedFrame {
        let mut img = ProcessedFrame::new(Frame::new(RgbImage::from_pixel(
            100,
            100,
            Rgb([0, 0, 0]),
        )));
        img.objects.push(ObjectInfo {
            rect,
            label: "Person".to_string(),
            confidence: 85,
            highlight: Highlight::default(),
        });
        img
    }

    fn config() -> FaceConfig {
        FaceConfig {
            scale_width: 0,
            max_percentage: 100,
            ..FaceConfig::default()
        }
    }

    fn face(rect: Rect, confidence: f32) -> Detection {
        Detection {
            rect,
            label: "face".to_string(),
            confidence,
        }
    }

    #[tokio::test]
    async fn test_no_object_forwards_untouched() {
        let kernel = Box::new(ScriptedKernel {
            fail_load: false,
            detections: vec![face(Rect::new(10, 10, 30, 30), 0.9)],
        });
        let stage = FaceStage::with_kernel(config(), kernel);
        let (tx, rx) = mpsc::channel(2);
        let mut out = stage.run(rx, 0);

        let img = ProcessedFrame::new(Frame::new(RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]))));
        tx.send(img).await.unwrap();
        assert!(!out.recv().await.unwrap().has_face());
    }

    #[tokio::test]
    async fn test_face_within_object_kept_and_squared() {
        let kernel = Box::new(ScriptedKernel {
            fail_load: false,
            detections: vec![face(Rect::new(20, 20, 40, 30), 0.9)],
        });
        let stage = FaceStage::with_kernel(config(), kernel);
        let (tx, rx) = mpsc::channel(2);
        let mut out = stage.run(rx, 0);

        tx.send(frame_with_object(Rect::new(10, 10, 60, 60))).await.unwrap();
        let got = out.recv().await.unwrap();
        assert!(got.has_face());
        let rect = got.faces[0].rect;
        assert_eq!(rect.width(), rect.height());
    }

    #[tokio::test]
    async fn test_face_outside_object_filtered() {
        let kernel = Box::new(ScriptedKernel {
            fail_load: false,
            detections: vec![face(Rect::new(70, 70, 90, 90), 0.9)],
        });
        let stage = FaceStage::with_kernel(config(), kernel);
        let (tx, rx) = mpsc::channel(2);
        let mut out = stage.run(rx, 0);

        tx.send(frame_with_object(Rect::new(0, 0, 30, 30))).await.unwrap();
        assert!(!out.recv().await.unwrap().has_face());
    }

    #[tokio::test]
    async fn test_overlapping_face_keeps_higher_confidence() {
        let kernel = Box::new(ScriptedKernel {
            fail_load: false,
            detections: vec![
                face(Rect::new(20, 20, 40, 40), 0.70),
                face(Rect::new(22, 22, 42, 42), 0.95),
            ],
        });
        let stage = FaceStage::with_kernel(config(), kernel);
        let (tx, rx) = mpsc::channel(2);
        let mut out = stage.run(rx, 0);

        tx.send(frame_with_object(Rect::new(10, 10, 60, 60))).await.unwrap();
        let got = out.recv().await.unwrap();
        assert_eq!(got.faces.len(), 1);
        assert_eq!(got.faces[0].confidence, 95);
    }

    #[tokio::test]
    async fn test_load_failure_closes_output() {
        let kernel = Box::new(ScriptedKernel {
            fail_load: true,
            detections: vec![],
        });
        let stage = FaceStage::with_kernel(config(), kernel);
        let (_tx, rx) = mpsc::channel::<ProcessedFrame>(2);
        let mut out = stage.run(rx, 0);
        assert!(out.recv().await.is_none());
    }
}
