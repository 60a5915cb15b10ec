use std::path::PathBuf;

use serde::Deserialize;

/// 顶层配置（manage.yaml）
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManageConfig {
    /// 数据根目录，alerts/ recordings/ continuous/ 都在它下面
    pub data: PathBuf,
    pub monitors: Vec<MonitorEntry>,
}

impl Default for ManageConfig {
    fn default() -> Self {
        Self {
            data: PathBuf::from("./data"),
            monitors: Vec::new(),
        }
    }
}

/// 一个受管 monitor：名字 + 它的主配置文件
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorEntry {
    pub name: String,
    pub config: String,
}
