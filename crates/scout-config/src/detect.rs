use serde::Deserialize;

/// 运动检测配置（motion yaml）
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MotionConfig {
    pub skip: bool,
    /// 运动框外扩百分比
    pub padding: i32,
    /// 检测前缩放到的宽度，0 为原始分辨率
    pub scale_width: u32,
    pub min_percentage: i32,
    pub max_percentage: i32,
    /// 超过该数量时认为是整屏闪变，丢弃全部运动框
    pub max_motions: usize,
    /// 单个轮廓覆盖超过该百分比时同样全部丢弃
    pub overload_percentage: i32,
    /// 前景二值化阈值百分比，越低越敏感
    pub threshold_percent: i32,
    pub highlight_color: String,
    pub highlight_thickness: u32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            skip: false,
            padding: 0,
            scale_width: 0,
            min_percentage: 2,
            max_percentage: 75,
            max_motions: 20,
            overload_percentage: 90,
            threshold_percent: 40,
            highlight_color: "purple".to_string(),
            highlight_thickness: 3,
        }
    }
}

/// 目标检测配置（object yaml）
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectConfig {
    pub skip: bool,
    pub force_cpu: bool,
    pub padding: i32,
    /// SSD 推理服务地址，缺失时该 stage 无法加载
    pub inference_url: String,
    pub inference_timeout_milli_seconds: u64,
    pub scale_width: u32,
    pub min_confidence_percentage: i32,
    /// 连续出现运动的帧数门槛
    pub min_motion_frames: u32,
    pub min_percentage: i32,
    pub max_percentage: i32,
    /// 与运动框的最小重叠
    pub min_overlap_percentage: i32,
    /// 相互重叠超过该值视为同一目标
    pub same_overlap_percentage: i32,
    pub allowed_list: Vec<String>,
    pub highlight_color: String,
    pub highlight_thickness: u32,
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            skip: false,
            force_cpu: false,
            padding: 0,
            inference_url: String::new(),
            inference_timeout_milli_seconds: 10_000,
            scale_width: 320,
            min_confidence_percentage: 50,
            min_motion_frames: 1,
            min_percentage: 2,
            max_percentage: 50,
            min_overlap_percentage: 75,
            same_overlap_percentage: 85,
            allowed_list: Vec::new(),
            highlight_color: "blue".to_string(),
            highlight_thickness: 3,
        }
    }
}

/// 人脸检测配置（face yaml）
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FaceConfig {
    pub skip: bool,
    pub force_cpu: bool,
    pub padding: i32,
    pub inference_url: String,
    pub inference_timeout_milli_seconds: u64,
    pub scale_width: u32,
    pub min_confidence_percentage: i32,
    pub max_percentage: i32,
    /// 与目标框的最小重叠
    pub min_overlap_percentage: i32,
    pub highlight_color: String,
    pub highlight_thickness: u32,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            skip: false,
            force_cpu: false,
            padding: 0,
            inference_url: String::new(),
            inference_timeout_milli_seconds: 10_000,
            scale_width: 320,
            min_confidence_percentage: 50,
            max_percentage: 50,
            min_overlap_percentage: 75,
            highlight_color: "green".to_string(),
            highlight_thickness: 3,
        }
    }
}
