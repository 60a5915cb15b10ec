use scout_config::MotionConfig;
use scout_types::{Frame, Highlight, MotionInfo, ProcessedFrame};
use tokio::sync::mpsc;

use crate::mask::{dilate3x3, find_regions, threshold};
use crate::subtractor::{BackgroundSubtractor, RunningAverage};

/// 运动检测 stage
///
/// 在降宽副本上做背景减除、阈值、3×3 膨胀和连通域提取，
/// 合格的轮廓按 padding 外扩后换算回原分辨率。
/// 单个轮廓覆盖超过 overload_percentage 或轮廓数超过 max_motions
/// 时丢弃该帧的全部运动标注（防整屏闪变）。
pub struct MotionStage {
    config: MotionConfig,
    subtractor: Box<dyn BackgroundSubtractor>,
}

impl MotionStage {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            subtractor: Box::new(RunningAverage::new()),
        }
    }

    pub fn with_subtractor(
        config: MotionConfig,
        subtractor: Box<dyn BackgroundSubtractor>,
    ) -> Self {
        Self { config, subtractor }
    }

    /// 启动 stage 任务，消费输入流并产出标注流
    pub fn run(mut self, mut input: mpsc::Receiver<Frame>, buffer: usize) -> mpsc::Receiver<ProcessedFrame> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        tokio::spawn(async move {
            while let Some(frame) = input.recv().await {
                let result = self.process(frame);
                if tx.send(result).await.is_err() {
                    break;
                }
            }
        });
        rx
    }

    fn process(&mut self, frame: Frame) -> ProcessedFrame {
        let mut result = ProcessedFrame::new(frame);
        if self.config.skip || !result.frame.is_filled() {
            return result;
        }
        let orig_width = result.frame.width();
        let orig_height = result.frame.height();
        let scaled = if self.config.scale_width > 0 && self.config.scale_width < orig_width {
            result.frame.scale_to_width(self.config.scale_width)
        } else {
            result.frame.clone()
        };
        let image = match scaled.pixels() {
            Some(image) => image,
            None => return result,
        };

        let diff = self.subtractor.apply(image);
        let mask = dilate3x3(&threshold(&diff, self.config.threshold_percent));
        let regions = find_regions(&mask);

        let width = scaled.width() as i32;
        let height = scaled.height() as i32;
        let image_area = width as i64 * height as i64;
        let min_area = image_area * self.config.min_percentage as i64 / 100;
        let max_area = image_area * self.config.max_percentage as i64 / 100;
        let min_width = width * self.config.min_percentage / 100;
        let max_width = width * self.config.max_percentage / 100;
        let min_height = height * self.config.min_percentage / 100;
        let max_height = height * self.config.max_percentage / 100;
        let ratio = orig_width as f64 / scaled.width() as f64;
        let highlight = Highlight::new(&self.config.highlight_color, self.config.highlight_thickness);

        let mut motions = Vec::new();
        let mut overload = false;
        for region in regions {
            if region.area * 100 >= image_area * self.config.overload_percentage as i64 {
                // 整屏闪变
                overload = true;
                break;
            }
            if region.area < min_area || region.area > max_area {
                continue;
            }
            let rect_width = region.rect.width();
            let rect_height = region.rect.height();
            if rect_width < min_width || rect_width > max_width {
                continue;
            }
            if rect_height < min_height || rect_height > max_height {
                continue;
            }
            let padded = region
                .rect
                .padded(scaled.width(), scaled.height(), self.config.padding);
            motions.push(MotionInfo {
                rect: padded.scaled(orig_width, orig_height, ratio),
                highlight,
            });
            if motions.len() > self.config.max_motions {
                overload = true;
                break;
            }
        }
        if !overload {
            result.motions = motions;
        }
        result
    }
}
