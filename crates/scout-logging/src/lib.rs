//! 日志初始化
//!
//! 过滤级别由 `SCOUT_LOG` 环境变量控制，默认 info。

use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_FILTER: &str = "SCOUT_LOG";

/// 安装全局 subscriber，进程内只应调用一次
pub fn init() {
    let filter = EnvFilter::try_from_env(ENV_FILTER).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// 测试用：忽略重复安装
pub fn try_init() {
    let filter = EnvFilter::try_from_env(ENV_FILTER).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
