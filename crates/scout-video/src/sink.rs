use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use scout_core::{Result, ScoutError};
use scout_types::Frame;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, warn};

/// 编码落盘的接口，录像状态机通过它写段
#[async_trait]
pub trait FrameSink: Send {
    async fn write(&mut self, frame: &Frame) -> Result<()>;

    /// 收尾并落盘，之后不可再写
    async fn finish(&mut self) -> Result<()>;
}

/// 打开一个段文件的工厂
#[async_trait]
pub trait SinkFactory: Send + Sync {
    async fn open(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn FrameSink>>;
}

/// 四字符编码名到 ffmpeg 编码器
fn encoder_for(codec: &str) -> &'static str {
    match codec.to_ascii_lowercase().as_str() {
        "mp4v" => "mpeg4",
        "xvid" => "libxvid",
        "avc1" | "avc3" | "h264" => "libx264",
        "hev1" | "hvc1" | "h265" => "libx265",
        _ => "mpeg4",
    }
}

/// ffmpeg 编码工厂：rawvideo rgb24 从 stdin 喂入
pub struct FfmpegSinkFactory {
    codec: String,
}

impl FfmpegSinkFactory {
    pub fn new(codec: impl Into<String>) -> Self {
        Self {
            codec: codec.into(),
        }
    }
}

#[async_trait]
impl SinkFactory for FfmpegSinkFactory {
    async fn open(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn FrameSink>> {
        if width == 0 || height == 0 || fps == 0 {
            return Err(ScoutError::Writer("invalid segment geometry".to_string()));
        }
        let mut child = Command::new("ffmpeg")
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &format!("{}x{}", width, height)])
            .args(["-r", &fps.to_string()])
            .args(["-i", "pipe:0"])
            .args(["-c:v", encoder_for(&self.codec)])
            .args(["-pix_fmt", "yuv420p"])
            .args(["-loglevel", "error", "-y"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ScoutError::Writer(format!("ffmpeg spawn failed: {}", e)))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ScoutError::Writer("ffmpeg stdin unavailable".to_string()))?;
        debug!(path = %path.display(), width, height, fps, "segment opened");
        Ok(Box::new(FfmpegFrameSink {
            child,
            stdin: Some(stdin),
            width,
            height,
        }))
    }
}

struct FfmpegFrameSink {
    child: Child,
    stdin: Option<ChildStdin>,
    width: u32,
    height: u32,
}

#[async_trait]
impl FrameSink for FfmpegFrameSink {
    async fn write(&mut self, frame: &Frame) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ScoutError::Writer("segment already finished".to_string()))?;
        if frame.width() != self.width || frame.height() != self.height {
            warn!(
                frame_width = frame.width(),
                frame_height = frame.height(),
                "frame geometry mismatch, skipping"
            );
            return Ok(());
        }
        let pixels = match frame.pixels() {
            Some(pixels) => pixels,
            None => return Ok(()),
        };
        stdin
            .write_all(pixels.as_raw())
            .await
            .map_err(|e| ScoutError::Writer(format!("segment write failed: {}", e)))?;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        // 关掉 stdin 让 ffmpeg 收尾
        self.stdin = None;
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| ScoutError::Writer(format!("ffmpeg wait failed: {}", e)))?;
        if !status.success() {
            return Err(ScoutError::Writer(format!(
                "ffmpeg exited with {}",
                status
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_mapping() {
        assert_eq!(encoder_for("mp4v"), "mpeg4");
        assert_eq!(encoder_for("AVC1"), "libx264");
        assert_eq!(encoder_for("hvc1"), "libx265");
        // 未知编码回退 mpeg4
        assert_eq!(encoder_for("zzzz"), "mpeg4");
    }
}
