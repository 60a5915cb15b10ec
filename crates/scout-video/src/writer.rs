use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use scout_core::{Result, ScoutError};
use scout_pubsub::PubSub;
use scout_storage::video_filename;
use scout_types::{Frame, FrameStats, ProcessedFrame, StatsTracker};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::reader::{TOPIC_CURRENT_FRAME_STATS, TOPIC_GET_FRAME_STATS};
use crate::ring::RingBuffer;
use crate::sink::{FrameSink, SinkFactory};
use crate::snapshot::save_preview;

/// 触发录像活动的判定依据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    /// 任何有像素的帧
    Image,
    Motion,
    Object,
    Face,
}

impl ActivityKind {
    fn matches(&self, img: &ProcessedFrame) -> bool {
        match self {
            ActivityKind::Image => img.frame.is_filled(),
            ActivityKind::Motion => img.has_motion(),
            ActivityKind::Object => img.has_object(),
            ActivityKind::Face => img.has_face(),
        }
    }
}

/// 录像参数
#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub name: String,
    pub save_directory: PathBuf,
    pub codec: String,
    pub file_type: String,
    pub buffer_seconds: u32,
    /// 预录秒数
    pub pre_seconds: u32,
    /// 无活动超时（秒）
    pub idle_seconds: u32,
    /// 单段最大时长（秒），到点换段
    pub max_seconds: u32,
    pub out_fps: u32,
    pub save_preview: bool,
    pub save_full: bool,
    pub save_portable: bool,
    pub portable_width: u32,
    pub activity_kind: ActivityKind,
}

impl WriterOptions {
    fn normalized(mut self) -> Self {
        if self.codec.len() != 4 {
            self.codec = "mp4v".to_string();
        }
        if self.file_type.len() < 3 {
            self.file_type = "mp4".to_string();
        }
        if self.portable_width == 0 {
            self.portable_width = 1080;
        }
        self
    }
}

/// 事件驱动的视频段写入器
///
/// 空闲时进预录环；trigger 后下一帧先排空预录再逐帧写段。
/// 段在无活动超时或最大时长处关闭，后者在仍有活动时立刻开新段。
pub struct VideoWriter {
    opts: WriterOptions,
    factory: Arc<dyn SinkFactory>,
    hub: PubSub,
    tx: Option<mpsc::Sender<ProcessedFrame>>,
    rx: Option<mpsc::Receiver<ProcessedFrame>>,
    trigger_tx: mpsc::Sender<()>,
    trigger_rx: Option<mpsc::Receiver<()>>,
    done: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

impl VideoWriter {
    pub fn new(opts: WriterOptions, factory: Arc<dyn SinkFactory>) -> Result<Self> {
        if opts.idle_seconds == 0 || opts.max_seconds == 0 || opts.out_fps == 0 {
            return Err(ScoutError::InvalidInput(
                "idle_seconds, max_seconds and out_fps must be greater than 0".to_string(),
            ));
        }
        if opts.save_directory.as_os_str().is_empty() {
            return Err(ScoutError::InvalidInput(
                "save_directory is required".to_string(),
            ));
        }
        let opts = opts.normalized();
        let buffer = (opts.buffer_seconds * opts.out_fps).max(1) as usize;
        let (tx, rx) = mpsc::channel(buffer);
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (done, done_rx) = watch::channel(false);
        Ok(Self {
            opts,
            factory,
            hub: PubSub::new(),
            tx: Some(tx),
            rx: Some(rx),
            trigger_tx,
            trigger_rx: Some(trigger_rx),
            done,
            done_rx,
        })
    }

    pub fn start(&mut self) {
        let rx = match self.rx.take() {
            Some(rx) => rx,
            None => return,
        };
        let trigger_rx = match self.trigger_rx.take() {
            Some(rx) => rx,
            None => return,
        };
        let opts = self.opts.clone();
        let factory = self.factory.clone();
        let hub = self.hub.clone();
        let done = self.done.clone();
        tokio::spawn(async move {
            run_loop(opts, factory, hub, rx, trigger_rx).await;
            let _ = done.send(true);
        });
    }

    /// 置位录像标志
    pub async fn trigger(&self) {
        let _ = self.trigger_tx.send(()).await;
    }

    /// 送入帧，缓冲满时产生背压
    pub async fn send(&self, img: ProcessedFrame) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(img).await;
        }
    }

    /// 关闭输入流，任务随后收尾
    pub fn close(&mut self) {
        self.tx = None;
    }

    pub async fn wait(&self) {
        let mut done = self.done_rx.clone();
        let _ = done.wait_for(|finished| *finished).await;
    }

    pub async fn stats(&self, timeout_ms: u64) -> Option<FrameStats> {
        self.hub
            .send_receive::<(), FrameStats>(
                TOPIC_GET_FRAME_STATS,
                TOPIC_CURRENT_FRAME_STATS,
                (),
                timeout_ms,
            )
            .await
    }
}

/// 一个打开的录像段
struct Session {
    started: Instant,
    full: Option<Box<dyn FrameSink>>,
    portable: Option<Box<dyn FrameSink>>,
    portable_width: u32,
}

impl Session {
    async fn write(&mut self, frame: &Frame) {
        if let Some(full) = self.full.as_mut() {
            if let Err(e) = full.write(frame).await {
                error!(error = %e, "full sink write failed, disabling");
                self.full = None;
            }
        }
        if let Some(portable) = self.portable.as_mut() {
            let scaled = frame.scale_to_width(self.portable_width.min(frame.width()));
            if let Err(e) = portable.write(&scaled).await {
                error!(error = %e, "portable sink write failed, disabling");
                self.portable = None;
            }
        }
    }

    async fn close(mut self) {
        if let Some(mut full) = self.full.take() {
            if let Err(e) = full.finish().await {
                error!(error = %e, "full sink close failed");
            }
        }
        if let Some(mut portable) = self.portable.take() {
            if let Err(e) = portable.finish().await {
                error!(error = %e, "portable sink close failed");
            }
        }
    }
}

async fn open_session(
    opts: &WriterOptions,
    factory: &Arc<dyn SinkFactory>,
    first: &Frame,
) -> Session {
    let now = Local::now();
    let mut session = Session {
        started: Instant::now(),
        full: None,
        portable: None,
        portable_width: opts.portable_width.min(first.width()),
    };
    if opts.save_full {
        let path = video_filename(now, &opts.save_directory, &opts.name, &opts.file_type, false);
        match factory
            .open(&path, first.width(), first.height(), opts.out_fps)
            .await
        {
            Ok(sink) => session.full = Some(sink),
            Err(e) => error!(monitor = %opts.name, error = %e, "could not open full writer"),
        }
    }
    if opts.save_portable {
        let scaled = first.scale_to_width(session.portable_width);
        let path = video_filename(now, &opts.save_directory, &opts.name, &opts.file_type, true);
        match factory
            .open(&path, scaled.width(), scaled.height(), opts.out_fps)
            .await
        {
            Ok(sink) => session.portable = Some(sink),
            Err(e) => error!(monitor = %opts.name, error = %e, "could not open portable writer"),
        }
    }
    if opts.save_preview {
        if let Err(e) = save_preview(first, now, &opts.save_directory, &opts.name, "", "").await {
            warn!(monitor = %opts.name, error = %e, "could not save preview");
        }
    }
    info!(monitor = %opts.name, "recording segment opened");
    session
}

async fn run_loop(
    opts: WriterOptions,
    factory: Arc<dyn SinkFactory>,
    hub: PubSub,
    mut rx: mpsc::Receiver<ProcessedFrame>,
    mut trigger_rx: mpsc::Receiver<()>,
) {
    let mut stats = StatsTracker::new();
    let mut get_sub = match hub.subscribe::<()>(TOPIC_GET_FRAME_STATS, hub.unique_subscriber_id(), 4)
    {
        Ok(sub) => sub,
        Err(_) => return,
    };

    let pre_capacity = ((opts.pre_seconds * opts.out_fps) as usize).max(1);
    let mut pre_ring: RingBuffer<Frame> = RingBuffer::new(pre_capacity);
    let idle = Duration::from_secs(opts.idle_seconds as u64);
    let max = Duration::from_secs(opts.max_seconds as u64);

    let mut record = false;
    let mut last_activity: Option<Instant> = None;
    let mut session: Option<Session> = None;

    let mut sec_tick = tokio::time::interval(Duration::from_secs(1));
    sec_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = sec_tick.tick() => {
                stats.tick();
                let _ = hub.publish(TOPIC_CURRENT_FRAME_STATS, stats.snapshot());
                let now = Instant::now();
                // 最大时长：换段，录像标志保持
                let max_expired = session
                    .as_ref()
                    .map(|open| now.duration_since(open.started) > max)
                    .unwrap_or(false);
                if max_expired {
                    if let Some(open) = session.take() {
                        info!(monitor = %opts.name, "segment rolled over at max duration");
                        open.close().await;
                    }
                }
                // 无活动超时：停录
                if let Some(last) = last_activity {
                    if now.duration_since(last) > idle {
                        record = false;
                        last_activity = None;
                        if let Some(open) = session.take() {
                            info!(monitor = %opts.name, "segment closed after idle timeout");
                            open.close().await;
                        }
                    }
                }
            }
            req = get_sub.recv() => {
                if req.is_some() {
                    let _ = hub.publish(TOPIC_CURRENT_FRAME_STATS, stats.snapshot());
                }
            }
            Some(()) = trigger_rx.recv() => {
                record = true;
                last_activity = Some(Instant::now());
            }
            incoming = rx.recv() => {
                let img = match incoming {
                    Some(img) => img,
                    None => {
                        if let Some(open) = session.take() {
                            open.close().await;
                        }
                        break;
                    }
                };
                if record && opts.activity_kind.matches(&img) {
                    last_activity = Some(Instant::now());
                }
                let original = img.frame.clone();
                if original.is_filled() {
                    if let Some(open) = session.as_mut() {
                        open.write(&original).await;
                        stats.add_accepted();
                    } else if pre_ring.push(original).is_some() {
                        // 预录环挤出的最旧帧
                        stats.add_dropped();
                    }
                }
                if record && session.is_none() {
                    // 排空预录，最旧在前
                    let pre_frames = pre_ring.drain_all();
                    if let Some(first) = pre_frames.first() {
                        let mut open = open_session(&opts, &factory, first).await;
                        for frame in &pre_frames {
                            open.write(frame).await;
                            stats.add_accepted();
                        }
                        session = Some(open);
                    }
                } else if !record {
                    if let Some(open) = session.take() {
                        open.close().await;
                    }
                }
            }
        }
    }
    stats.clear_per_second();
    drop(get_sub);
    hub.close();
    pre_ring.drain_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct OpenedSegment {
        path: PathBuf,
        width: u32,
        frames: usize,
        finished: bool,
    }

    #[derive(Default)]
    struct CaptureFactory {
        segments: Arc<Mutex<Vec<OpenedSegment>>>,
    }

    struct CaptureSink {
        index: usize,
        segments: Arc<Mutex<Vec<OpenedSegment>>>,
    }

    #[async_trait]
    impl SinkFactory for CaptureFactory {
        async fn open(
            &self,
            path: &Path,
            width: u32,
            _height: u32,
            _fps: u32,
        ) -> Result<Box<dyn FrameSink>> {
            let mut segments = self.segments.lock().unwrap();
            segments.push(OpenedSegment {
                path: path.to_path_buf(),
                width,
                frames: 0,
                finished: false,
            });
            Ok(Box::new(CaptureSink {
                index: segments.len() - 1,
                segments: self.segments.clone(),
            }))
        }
    }

    #[async_trait]
    impl FrameSink for CaptureSink {
        async fn write(&mut self, _frame: &Frame) -> Result<()> {
            self.segments.lock().unwrap()[self.index].frames += 1;
            Ok(())
        }

        async fn finish(&mut self) -> Result<()> {
            self.segments.lock().unwrap()[self.index].finished = true;
            Ok(())
        }
    }

    fn options(dir: &Path) -> WriterOptions {
        WriterOptions {
            name: "cam".to_string(),
            save_directory: dir.to_path_buf(),
            codec: "mp4v".to_string(),
            file_type: "mp4".to_string(),
            buffer_seconds: 0,
            pre_seconds: 2,
            idle_seconds: 3,
            max_seconds: 60,
            out_fps: 2,
            save_preview: false,
            save_full: true,
            save_portable: false,
            portable_width: 1080,
            activity_kind: ActivityKind::Object,
        }
    }

    fn image_frame() -> ProcessedFrame {
        ProcessedFrame::new(Frame::new(RgbImage::from_pixel(64, 48, Rgb([5, 5, 5]))))
    }

    fn object_frame() -> ProcessedFrame {
        let mut img = image_frame();
        img.objects.push(scout_types::ObjectInfo {
            rect: scout_types::Rect::new(0, 0, 10, 10),
            label: "Person".to_string(),
            confidence: 80,
            highlight: scout_types::Highlight::default(),
        });
        img
    }

    #[tokio::test(start_paused = true)]
    async fn test_preroll_drained_into_segment() {
        let tmp = tempfile::tempdir().unwrap();
        let factory = Arc::new(CaptureFactory::default());
        let segments = factory.segments.clone();
        let mut writer = VideoWriter::new(options(tmp.path()), factory).unwrap();
        writer.start();

        // 空闲阶段进预录环
        writer.send(image_frame()).await;
        writer.send(image_frame()).await;
        writer.trigger().await;
        // 让任务先消费 trigger，再送帧
        tokio::time::sleep(Duration::from_millis(10)).await;
        writer.send(object_frame()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let segs = segments.lock().unwrap();
            assert_eq!(segs.len(), 1);
            // 两帧预录 + 触发后的一帧
            assert_eq!(segs[0].frames, 3);
            assert!(segs[0].path.to_string_lossy().ends_with("_Full.mp4"));
        }

        writer.close();
        writer.wait().await;
        let segs = segments.lock().unwrap();
        assert!(segs[0].finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_preroll_overflow_drops_oldest() {
        let tmp = tempfile::tempdir().unwrap();
        let factory = Arc::new(CaptureFactory::default());
        let mut opts = options(tmp.path());
        // 容量 = 1s × 2fps = 2
        opts.pre_seconds = 1;
        let mut writer = VideoWriter::new(opts, factory.clone()).unwrap();
        writer.start();

        for _ in 0..5 {
            writer.send(image_frame()).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        writer.close();
        writer.wait().await;
        // 没有 trigger 就没有段
        assert!(factory.segments.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_closes_segment() {
        let tmp = tempfile::tempdir().unwrap();
        let factory = Arc::new(CaptureFactory::default());
        let segments = factory.segments.clone();
        let mut writer = VideoWriter::new(options(tmp.path()), factory).unwrap();
        writer.start();

        writer.trigger().await;
        // 让任务先消费 trigger，再送帧
        tokio::time::sleep(Duration::from_millis(10)).await;
        writer.send(object_frame()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(segments.lock().unwrap().len(), 1);

        // 超过 idle_seconds 没有活动
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(segments.lock().unwrap()[0].finished);

        // 之后的帧回到预录，不再写段
        writer.send(image_frame()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(segments.lock().unwrap().len(), 1);

        writer.close();
        writer.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_duration_rolls_over() {
        let tmp = tempfile::tempdir().unwrap();
        let factory = Arc::new(CaptureFactory::default());
        let segments = factory.segments.clone();
        let mut opts = options(tmp.path());
        opts.max_seconds = 2;
        opts.idle_seconds = 60;
        let mut writer = VideoWriter::new(opts, factory).unwrap();
        writer.start();

        writer.trigger().await;
        // 让任务先消费 trigger，再送帧
        tokio::time::sleep(Duration::from_millis(10)).await;
        writer.send(object_frame()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(segments.lock().unwrap().len(), 1);

        // 越过 max_seconds，段关闭但录像继续
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(segments.lock().unwrap()[0].finished);

        writer.send(object_frame()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(segments.lock().unwrap().len(), 2);

        writer.close();
        writer.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_portable_only_writes_portable_path() {
        let tmp = tempfile::tempdir().unwrap();
        let factory = Arc::new(CaptureFactory::default());
        let segments = factory.segments.clone();
        let mut opts = options(tmp.path());
        opts.save_full = false;
        opts.save_portable = true;
        opts.portable_width = 32;
        let mut writer = VideoWriter::new(opts, factory).unwrap();
        writer.start();

        writer.trigger().await;
        // 让任务先消费 trigger，再送帧
        tokio::time::sleep(Duration::from_millis(10)).await;
        writer.send(object_frame()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        writer.close();
        writer.wait().await;

        let segs = segments.lock().unwrap();
        assert_eq!(segs.len(), 1);
        assert!(segs[0].path.to_string_lossy().ends_with("_Portable.mp4"));
        // 按 portable_width 缩放
        assert_eq!(segs[0].width, 32);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_kind_gates_refresh() {
        let tmp = tempfile::tempdir().unwrap();
        let factory = Arc::new(CaptureFactory::default());
        let segments = factory.segments.clone();
        let mut opts = options(tmp.path());
        opts.idle_seconds = 2;
        let mut writer = VideoWriter::new(opts, factory).unwrap();
        writer.start();

        writer.trigger().await;
        // 让任务先消费 trigger，再送帧
        tokio::time::sleep(Duration::from_millis(10)).await;
        writer.send(object_frame()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // 无目标的帧不刷新活动时间，idle 到点停录
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            writer.send(image_frame()).await;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(segments.lock().unwrap()[0].finished);

        writer.close();
        writer.wait().await;
    }

    #[test]
    fn test_invalid_options_rejected() {
        let factory = Arc::new(CaptureFactory::default());
        let mut opts = options(Path::new("/tmp"));
        opts.idle_seconds = 0;
        assert!(VideoWriter::new(opts, factory).is_err());
    }
}
