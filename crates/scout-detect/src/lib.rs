//! 检测流水线的三个 stage
//!
//! 每个 stage 是「帧流到帧流」的变换，skip 置位时原样转发。
//! 运动检测在进程内完成；目标/人脸的 SSD 推理通过 kernel 接口
//! 交给外部服务，stage 只负责过滤、去重与标注。

pub mod face;
pub mod http;
pub mod kernel;
pub mod mask;
pub mod motion;
pub mod object;
pub mod subtractor;

pub use face::FaceStage;
pub use http::HttpDetector;
pub use kernel::{cuda_available, Backend, Detection, DetectorKernel};
pub use motion::MotionStage;
pub use object::ObjectStage;
pub use subtractor::{BackgroundSubtractor, RunningAverage};
