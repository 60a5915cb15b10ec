use std::process::Stdio;

use async_trait::async_trait;
use scout_core::{Result, ScoutError};
use scout_types::Frame;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::source::VideoSource;

enum Input {
    File(String),
    Url(String),
}

impl Input {
    fn as_str(&self) -> &str {
        match self {
            Input::File(s) | Input::Url(s) => s,
        }
    }
}

/// ffmpeg 子进程视频源，stdout 输出 rawvideo rgb24
///
/// 文件与网络摄像头共用同一条解码管线，仅输入参数不同。
pub struct FfmpegSource {
    name: String,
    input: Input,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    width: u32,
    height: u32,
}

impl FfmpegSource {
    pub fn from_file(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: Input::File(path.into()),
            child: None,
            stdout: None,
            width: 0,
            height: 0,
        }
    }

    pub fn from_url(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: Input::Url(url.into()),
            child: None,
            stdout: None,
            width: 0,
            height: 0,
        }
    }

    /// ffprobe 取视频尺寸
    async fn probe_dimensions(&self) -> Result<(u32, u32)> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height",
                "-of",
                "csv=s=x:p=0",
                self.input.as_str(),
            ])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ScoutError::Source(format!("ffprobe spawn failed: {}", e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScoutError::Source(format!(
                "ffprobe failed for {}: {}",
                self.input.as_str(),
                stderr.trim()
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        let mut parts = text.trim().split('x');
        let width = parts
            .next()
            .and_then(|w| w.parse::<u32>().ok())
            .unwrap_or(0);
        let height = parts
            .next()
            .and_then(|h| h.parse::<u32>().ok())
            .unwrap_or(0);
        if width == 0 || height == 0 {
            return Err(ScoutError::Source(format!(
                "could not probe dimensions for {}",
                self.input.as_str()
            )));
        }
        Ok((width, height))
    }
}

#[async_trait]
impl VideoSource for FfmpegSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&mut self) -> Result<()> {
        let (width, height) = self.probe_dimensions().await?;
        self.width = width;
        self.height = height;

        let mut cmd = Command::new("ffmpeg");
        if let Input::Url(url) = &self.input {
            if url.starts_with("rtsp://") {
                cmd.args(["-rtsp_transport", "tcp"]);
            }
        }
        cmd.args(["-i", self.input.as_str()])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-an", "-sn"])
            .args(["-loglevel", "error"])
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| ScoutError::Source(format!("ffmpeg spawn failed: {}", e)))?;
        self.stdout = child.stdout.take();
        self.child = Some(child);
        info!(source = %self.name, width, height, "video source opened");
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Option<Frame>> {
        let stdout = match self.stdout.as_mut() {
            Some(stdout) => stdout,
            None => return Ok(None),
        };
        let frame_len = (self.width * self.height * 3) as usize;
        let mut buf = vec![0u8; frame_len];
        match stdout.read_exact(&mut buf).await {
            Ok(_) => match Frame::from_raw_rgb(self.width, self.height, buf) {
                Some(frame) => Ok(Some(frame)),
                None => Err(ScoutError::Source("invalid raw frame".to_string())),
            },
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!(source = %self.name, "source stream ended");
                Ok(None)
            }
            Err(e) => Err(ScoutError::Source(format!("read failed: {}", e))),
        }
    }

    async fn close(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!(source = %self.name, error = %e, "could not kill ffmpeg");
            }
        }
        info!(source = %self.name, "video source closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initialize_fails_for_missing_file() {
        let mut source = FfmpegSource::from_file("test", "/nonexistent/clip.mp4");
        assert!(source.initialize().await.is_err());
    }

    #[tokio::test]
    async fn test_read_without_initialize_is_done() {
        let mut source = FfmpegSource::from_file("test", "/nonexistent/clip.mp4");
        let frame = source.read_frame().await.unwrap();
        assert!(frame.is_none());
    }
}
