use serde::Deserialize;

/// 事件录像配置（record yaml）
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordConfig {
    /// 出现目标即触发录像
    pub record_objects: bool,
    /// 预录秒数
    pub max_pre_sec: u32,
    /// 无活动超时（秒）
    pub timeout_sec: u32,
    /// 单段最大时长（秒）
    pub max_sec: u32,
    pub delete_after_hours: u64,
    pub delete_after_gb: u64,
    pub codec: String,
    pub file_type: String,
    pub buffer_seconds: u32,
    pub portable_only: bool,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            record_objects: true,
            max_pre_sec: 0,
            timeout_sec: 10,
            max_sec: 60,
            delete_after_hours: 0,
            delete_after_gb: 0,
            codec: "mp4v".to_string(),
            file_type: "mp4".to_string(),
            buffer_seconds: 0,
            portable_only: false,
        }
    }
}

/// 连续录像配置（continuous yaml）
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContinuousConfig {
    pub timeout_sec: u32,
    pub max_sec: u32,
    pub delete_after_hours: u64,
    pub delete_after_gb: u64,
    pub codec: String,
    pub file_type: String,
    pub buffer_seconds: u32,
    pub portable_only: bool,
}

impl Default for ContinuousConfig {
    fn default() -> Self {
        Self {
            timeout_sec: 10,
            max_sec: 300,
            delete_after_hours: 0,
            delete_after_gb: 0,
            codec: "mp4v".to_string(),
            file_type: "mp4".to_string(),
            buffer_seconds: 0,
            portable_only: false,
        }
    }
}
