use anyhow::Result;
use async_trait::async_trait;
use image::RgbImage;
use scout_types::Rect;

/// 推理后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Cpu,
    Cuda,
}

impl Backend {
    /// force_cpu 优先，否则探测 CUDA
    pub fn select(force_cpu: bool) -> Backend {
        if !force_cpu && cuda_available() {
            Backend::Cuda
        } else {
            Backend::Cpu
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Cpu => "cpu",
            Backend::Cuda => "cuda",
        }
    }
}

/// CUDA 可用性探测
pub fn cuda_available() -> bool {
    if std::path::Path::new("/proc/driver/nvidia/version").exists() {
        return true;
    }
    if let Some(paths) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&paths) {
            if dir.join("nvidia-smi").is_file() {
                return true;
            }
        }
    }
    false
}

/// 一条检测结果，rect 为输入图像的像素坐标
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub rect: Rect,
    pub label: String,
    /// 0.0..=1.0
    pub confidence: f32,
}

/// SSD 推理内核，检测内核本身是黑盒
///
/// `load` 失败时 stage 记日志并关闭输出；`detect` 失败时该帧原样转发。
#[async_trait]
pub trait DetectorKernel: Send {
    async fn load(&mut self) -> Result<()>;

    async fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;
}
