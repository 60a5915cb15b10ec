use scout_config::ObjectConfig;
use scout_types::{Highlight, ObjectInfo, ProcessedFrame};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::http::HttpDetector;
use crate::kernel::{Backend, DetectorKernel};

/// 首字母大写，其余小写
fn title_case(label: &str) -> String {
    let lower = label.to_ascii_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => lower,
    }
}

/// 目标检测 stage
///
/// 消费运动 stage 的输出：无运动时原样转发并清零连续运动帧计数，
/// 连续运动帧达到门槛才触发推理。检测结果按置信度、面积、
/// 与运动框的重叠过滤，相互重叠的标注按「置信度高者留、person 优先」去重。
pub struct ObjectStage {
    config: ObjectConfig,
    kernel: Box<dyn DetectorKernel>,
}

impl ObjectStage {
    pub fn new(config: ObjectConfig) -> Self {
        let backend = Backend::select(config.force_cpu);
        let kernel = Box::new(HttpDetector::new(
            config.inference_url.clone(),
            config.inference_timeout_milli_seconds,
            backend,
        ));
        Self { config, kernel }
    }

    pub fn with_kernel(config: ObjectConfig, kernel: Box<dyn DetectorKernel>) -> Self {
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
                              "object detector loaded");
                    }
                    Err(e) => {
                        // 模型不可用：关闭输出，流水线随之排空
                        error!(error = %e, "could not load object detector");
                        return;
                    }
                }
            }
            let mut motion_frames: u32 = 0;
            while let Some(img) = input.recv().await {
                let result = self.process(img, &mut motion_frames).await;
                if tx.send(result).await.is_err() {
                    break;
                }
            }
        });
        rx
    }

    async fn process(&mut self, mut img: ProcessedFrame, motion_frames: &mut u32) -> ProcessedFrame {
        if self.config.skip || !img.has_motion() {
            *motion_frames = 0;
            return img;
        }
        *motion_frames += 1;
        if *motion_frames < self.config.min_motion_frames {
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
                // 推理故障：该帧不带标注继续走
                warn!(error = %e, "object detect failed, forwarding frame");
                return img;
            }
        };

        let ratio = orig_width as f64 / scaled.width() as f64;
        let image_area = orig_width as i64 * orig_height as i64;
        let min_area = image_area * self.config.min_percentage as i64 / 100;
        let max_area = image_area * self.config.max_percentage as i64 / 100;
        let highlight = Highlight::new(&self.config.highlight_color, self.config.highlight_thickness);

        for detection in detections {
            let confidence = (detection.confidence * 100.0) as i32;
            if confidence < self.config.min_confidence_percentage {
                continue;
            }
            let label = title_case(&detection.label);
            if !self.config.allowed_list.is_empty()
                && !self
                    .config
                    .allowed_list
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(&label))
            {
                continue;
            }
            let scaled_rect = detection.rect.scaled(orig_width, orig_height, ratio);
            let final_rect = scaled_rect.padded(orig_width, orig_height, self.config.padding);
            let rect_area = final_rect.area();
            if rect_area < min_area || rect_area > max_area {
                continue;
            }
            let within_motion = img.motions.iter().any(|motion| {
                let (overlap, _) = final_rect.overlap_percent(&motion.rect);
                overlap >= self.config.min_overlap_percentage
            });
            if !within_motion {
                continue;
            }

            let mut is_new = true;
            for existing in img.objects.iter_mut() {
                let (a, b) = final_rect.overlap_percent(&existing.rect);
                if a >= self.config.same_overlap_percentage
                    && b >= self.config.same_overlap_percentage
                {
                    is_new = false;
                    let new_is_person = label.eq_ignore_ascii_case("person");
                    if existing.confidence < confidence || (new_is_person && !existing.is_person())
                    {
                        // 留下更好的那个
                        *existing = ObjectInfo {
                            rect: final_rect,
                            label: label.clone(),
                            confidence,
                            highlight,
                        };
                    }
                    break;
                }
            }
            if is_new {
                img.objects.push(ObjectInfo {
                    rect: final_rect,
                    label,
                    confidence,
                    highlight,
                });
            }
        }
        img
    }
}
