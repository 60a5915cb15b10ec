use serde::Deserialize;

/// 告警配置（alert yaml）
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertConfig {
    pub interval_minutes: u32,
    /// 0 表示不保存也不通知
    pub max_images_per_interval: usize,
    pub max_send_attachments_per_hour: u32,
    pub save_quality: u8,
    pub save_original: bool,
    pub save_highlighted: bool,
    pub save_objects_count: usize,
    pub save_faces_count: usize,
    pub text_attachments: bool,
    pub delete_after_hours: u64,
    pub delete_after_gb: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 10,
            max_images_per_interval: 4,
            max_send_attachments_per_hour: 3,
            save_quality: 60,
            save_original: true,
            save_highlighted: true,
            save_objects_count: 0,
            save_faces_count: 0,
            text_attachments: false,
            delete_after_hours: 0,
            delete_after_gb: 0,
        }
    }
}
