use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use scout_config::ContinuousConfig;
use scout_core::Result;
use scout_pubsub::PubSub;
use scout_storage::Pruner;
use scout_types::ProcessedFrame;
use scout_video::{ActivityKind, FfmpegSinkFactory, SinkFactory, VideoWriter, WriterOptions};
use tokio::sync::watch;
use tracing::info;

const TOPIC_CONTINUOUS_IMAGES: &str = "continuous_images";

/// 连续录像：每帧都触发，无预录，按时长换段
pub struct Continuous {
    name: String,
    hub: PubSub,
    buffer_size: usize,
    writer: Option<VideoWriter>,
    pruner: Arc<Pruner>,
    cancel: watch::Sender<bool>,
    done: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

impl Continuous {
    pub async fn new(
        name: &str,
        save_directory: &Path,
        config: ContinuousConfig,
        out_fps: u32,
    ) -> Result<Self> {
        let factory = Arc::new(FfmpegSinkFactory::new(config.codec.clone()));
        Self::with_factory(name, save_directory, config, out_fps, factory).await
    }

    pub async fn with_factory(
        name: &str,
        save_directory: &Path,
        config: ContinuousConfig,
        out_fps: u32,
        factory: Arc<dyn SinkFactory>,
    ) -> Result<Self> {
        let continuous_dir = save_directory.join("continuous");
        tokio::fs::create_dir_all(&continuous_dir).await?;

        let writer = VideoWriter::new(
            WriterOptions {
                name: name.to_string(),
                save_directory: continuous_dir.clone(),
                codec: config.codec.clone(),
                file_type: config.file_type.clone(),
                buffer_seconds: config.buffer_seconds,
                pre_seconds: 0,
                idle_seconds: config.timeout_sec,
                max_seconds: config.max_sec,
                out_fps,
                save_preview: true,
                save_full: !config.portable_only,
                save_portable: true,
                portable_width: 0,
                activity_kind: ActivityKind::Image,
            },
            factory,
        )?;
        let pruner = Arc::new(Pruner::new(
            continuous_dir,
            name.to_string(),
            config.delete_after_hours,
            config.delete_after_gb,
        ));
        let buffer_size = ((config.buffer_seconds * out_fps) as usize).max(1);
        let (cancel, _) = watch::channel(false);
        let (done, done_rx) = watch::channel(false);
        Ok(Self {
            name: name.to_string(),
            hub: PubSub::new(),
            buffer_size,
            writer: Some(writer),
            pruner,
            cancel,
            done,
            done_rx,
        })
    }

    pub fn start(&mut self) {
        let mut writer = match self.writer.take() {
            Some(writer) => writer,
            None => {
                let _ = self.done.send(true);
                return;
            }
        };
        let hub = self.hub.clone();
        let mut sub = match hub.subscribe::<ProcessedFrame>(
            TOPIC_CONTINUOUS_IMAGES,
            hub.unique_subscriber_id(),
            self.buffer_size,
        ) {
            Ok(sub) => sub,
            Err(_) => {
                let _ = self.done.send(true);
                return;
            }
        };
        let pruner = self.pruner.clone();
        let mut cancel = self.cancel.subscribe();
        let done = self.done.clone();
        let name = self.name.clone();
        tokio::spawn(async move {
            writer.start();
            let period = Duration::from_secs(3600);
            let mut hour_tick = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = hour_tick.tick() => pruner.prune().await,
                    result = cancel.changed() => {
                        if result.is_err() || *cancel.borrow() {
                            break;
                        }
                    }
                    msg = sub.recv() => match msg {
                        Some(img) => {
                            writer.trigger().await;
                            writer.send(img).await;
                        }
                        None => break,
                    },
                }
            }
            drop(sub);
            pruner.prune().await;
            writer.close();
            writer.wait().await;
            hub.close();
            let _ = done.send(true);
            info!(monitor = %name, "continuous stopped");
        });
    }

    pub fn send(&self, img: ProcessedFrame) {
        let _ = self.hub.publish(TOPIC_CONTINUOUS_IMAGES, img);
    }

    pub fn close(&self) {
        let _ = self.cancel.send(true);
    }

    pub async fn wait(&self) {
        let mut done = self.done_rx.clone();
        let _ = done.wait_for(|finished| *finished).await;
    }
}
