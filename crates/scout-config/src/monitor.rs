use anyhow::{bail, Result};
use serde::Deserialize;

/// 单摄像头配置（monitor yaml）
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfig {
    /// 视频文件源，与 url 互斥
    pub filename: Option<String>,
    /// 网络摄像头源
    pub url: Option<String>,
    pub max_source_fps: u32,
    pub max_output_fps: u32,
    /// JPEG 压缩百分比 1..=99，100 为直通
    pub quality: u8,
    pub capture_timeout_milli_seconds: u64,
    pub stale_timeout: u32,
    pub stale_max_retry: u32,
    pub buffer_seconds: u32,
    pub delay_buffer_milli_seconds: u64,
    pub motion: Option<String>,
    pub object: Option<String>,
    pub face: Option<String>,
    pub notify_rx: Option<String>,
    pub alert: Option<String>,
    pub record: Option<String>,
    pub continuous: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            filename: None,
            url: None,
            max_source_fps: 30,
            max_output_fps: 10,
            quality: 100,
            capture_timeout_milli_seconds: 0,
            stale_timeout: 20,
            stale_max_retry: 10,
            buffer_seconds: 0,
            delay_buffer_milli_seconds: 0,
            motion: None,
            object: None,
            face: None,
            notify_rx: None,
            alert: None,
            record: None,
            continuous: None,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        match (&self.filename, &self.url) {
            (Some(_), Some(_)) => bail!("filename and url are exclusive"),
            (None, None) => bail!("either filename or url is required"),
            _ => {}
        }
        if self.max_source_fps == 0 || self.max_output_fps == 0 {
            bail!("maxSourceFps and maxOutputFps must be greater than 0");
        }
        if self.quality == 0 || self.quality > 100 {
            bail!("quality must be within 1..=100");
        }
        Ok(())
    }
}
