use async_trait::async_trait;
use scout_core::Result;
use scout_types::Frame;

/// 视频源能力：打开 / 读帧 / 关闭
///
/// `read_frame` 返回 `Ok(None)` 表示源结束；`Err` 表示一次瞬时读取失败，
/// 调用方计入丢帧后继续。
#[async_trait]
pub trait VideoSource: Send + Sync {
    fn name(&self) -> &str;

    async fn initialize(&mut self) -> Result<()>;

    async fn read_frame(&mut self) -> Result<Option<Frame>>;

    async fn close(&mut self);
}
