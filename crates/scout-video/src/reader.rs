use std::time::Duration;

use scout_core::{Result, ScoutError};
use scout_pubsub::{PubSub, Subscription};
use scout_types::{Frame, FrameStats, StatsTracker};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::source::VideoSource;

/// 统计查询话题
pub const TOPIC_GET_FRAME_STATS: &str = "get_frame_stats";
pub const TOPIC_CURRENT_FRAME_STATS: &str = "current_frame_stats";

fn tick_period(fps: u32) -> Duration {
    if fps > 0 {
        Duration::from_millis((1000 / fps).max(1) as u64)
    } else {
        Duration::from_millis(5)
    }
}

/// 视频读取器：双任务、双 FPS 上限
///
/// 源任务按 `1/max_source_fps` 节拍拉帧并按需做 JPEG 画质往返；
/// 输出任务用单槽 latest-wins 缓冲实现 `1/max_output_fps` 的输出节拍，
/// 槽被覆盖即计入丢帧。两端各有一个 hub 提供统计查询。
pub struct VideoReader {
    source: Option<Box<dyn VideoSource>>,
    hub_source: PubSub,
    hub_output: PubSub,
    max_source_fps: watch::Sender<u32>,
    max_output_fps: watch::Sender<u32>,
    quality: u8,
    capture_timeout: Option<Duration>,
    cancel: watch::Sender<bool>,
    done: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

impl VideoReader {
    pub fn new(
        source: Box<dyn VideoSource>,
        max_source_fps: u32,
        max_output_fps: u32,
    ) -> Result<Self> {
        if max_source_fps == 0 || max_output_fps == 0 {
            return Err(ScoutError::InvalidInput(
                "fps caps must be greater than 0".to_string(),
            ));
        }
        let (cancel, _) = watch::channel(false);
        let (done, done_rx) = watch::channel(false);
        Ok(Self {
            source: Some(source),
            hub_source: PubSub::new(),
            hub_output: PubSub::new(),
            max_source_fps: watch::channel(max_source_fps).0,
            max_output_fps: watch::channel(max_output_fps).0,
            quality: 100,
            capture_timeout: None,
            cancel,
            done,
            done_rx,
        })
    }

    /// JPEG 画质 1..=99 生效，100 直通
    pub fn set_quality(&mut self, percent: u8) {
        if (1..100).contains(&percent) {
            self.quality = percent;
        }
    }

    pub fn set_capture_timeout(&mut self, timeout_ms: u64) {
        if timeout_ms > 0 {
            self.capture_timeout = Some(Duration::from_millis(timeout_ms));
        }
    }

    pub fn max_output_fps(&self) -> u32 {
        *self.max_output_fps.borrow()
    }

    /// 运行时调整源端 FPS 上限，节拍在下一个 tick 重建
    pub fn set_max_source_fps(&self, fps: u32) {
        if fps > 0 {
            self.max_source_fps.send_replace(fps);
        }
    }

    pub fn set_max_output_fps(&self, fps: u32) {
        if fps > 0 {
            self.max_output_fps.send_replace(fps);
        }
    }

    /// 启动两个任务，返回输出帧流（单槽背压）
    pub fn start(&mut self) -> mpsc::Receiver<Frame> {
        let (out_tx, out_rx) = mpsc::channel::<Frame>(1);
        let source = match self.source.take() {
            Some(source) => source,
            None => {
                warn!("video reader already started");
                let _ = self.done.send(true);
                return out_rx;
            }
        };

        let (frame_tx, frame_rx) = mpsc::unbounded_channel::<Frame>();
        let source_task = tokio::spawn(source_loop(
            source,
            frame_tx,
            self.hub_source.clone(),
            self.max_source_fps.subscribe(),
            self.quality,
            self.capture_timeout,
            self.cancel.subscribe(),
        ));
        let output_task = tokio::spawn(output_loop(
            frame_rx,
            out_tx,
            self.hub_output.clone(),
            self.max_output_fps.subscribe(),
            self.cancel.clone(),
        ));

        let done = self.done.clone();
        tokio::spawn(async move {
            let _ = source_task.await;
            let _ = output_task.await;
            let _ = done.send(true);
        });
        out_rx
    }

    /// 停止读取，幂等
    pub fn stop(&self) {
        self.cancel.send_replace(true);
    }

    /// 控制句柄：start 之后 reader 本体可以丢弃
    pub fn handle(&self) -> ReaderHandle {
        ReaderHandle {
            hub_source: self.hub_source.clone(),
            hub_output: self.hub_output.clone(),
            cancel: self.cancel.clone(),
            done_rx: self.done_rx.clone(),
        }
    }

    pub async fn wait(&self) {
        let mut done = self.done_rx.clone();
        let _ = done.wait_for(|finished| *finished).await;
    }

    pub async fn source_stats(&self, timeout_ms: u64) -> Option<FrameStats> {
        self.hub_source
            .send_receive::<(), FrameStats>(
                TOPIC_GET_FRAME_STATS,
                TOPIC_CURRENT_FRAME_STATS,
                (),
                timeout_ms,
            )
            .await
    }

    pub async fn output_stats(&self, timeout_ms: u64) -> Option<FrameStats> {
        self.hub_output
            .send_receive::<(), FrameStats>(
                TOPIC_GET_FRAME_STATS,
                TOPIC_CURRENT_FRAME_STATS,
                (),
                timeout_ms,
            )
            .await
    }

    /// 订阅源端统计快照流
    pub fn subscribe_source_stats(&self) -> Option<Subscription<FrameStats>> {
        self.hub_source
            .subscribe::<FrameStats>(
                TOPIC_CURRENT_FRAME_STATS,
                self.hub_source.unique_subscriber_id(),
                4,
            )
            .ok()
    }

    pub fn subscribe_output_stats(&self) -> Option<Subscription<FrameStats>> {
        self.hub_output
            .subscribe::<FrameStats>(
                TOPIC_CURRENT_FRAME_STATS,
                self.hub_output.unique_subscriber_id(),
                4,
            )
            .ok()
    }
}

/// reader 的轻量控制句柄（停止 / 等待 / 查询统计）
#[derive(Clone)]
pub struct ReaderHandle {
    hub_source: PubSub,
    hub_output: PubSub,
    cancel: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

impl ReaderHandle {
    pub fn stop(&self) {
        self.cancel.send_replace(true);
    }

    pub async fn wait(&self) {
        let mut done = self.done_rx.clone();
        let _ = done.wait_for(|finished| *finished).await;
    }

    pub async fn source_stats(&self, timeout_ms: u64) -> Option<FrameStats> {
        self.hub_source
            .send_receive::<(), FrameStats>(
                TOPIC_GET_FRAME_STATS,
                TOPIC_CURRENT_FRAME_STATS,
                (),
                timeout_ms,
            )
            .await
    }

    pub async fn output_stats(&self, timeout_ms: u64) -> Option<FrameStats> {
        self.hub_output
            .send_receive::<(), FrameStats>(
                TOPIC_GET_FRAME_STATS,
                TOPIC_CURRENT_FRAME_STATS,
                (),
                timeout_ms,
            )
            .await
    }
}

async fn source_loop(
    mut source: Box<dyn VideoSource>,
    frame_tx: mpsc::UnboundedSender<Frame>,
    hub: PubSub,
    mut fps_rx: watch::Receiver<u32>,
    quality: u8,
    capture_timeout: Option<Duration>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut stats = StatsTracker::new();
    let mut get_sub = match hub.subscribe::<()>(TOPIC_GET_FRAME_STATS, hub.unique_subscriber_id(), 4)
    {
        Ok(sub) => sub,
        Err(_) => return,
    };

    if let Err(e) = source.initialize().await {
        warn!(source = source.name(), error = %e, "could not initialize video source");
        drop(get_sub);
        hub.close();
        return;
    }

    let mut fps = *fps_rx.borrow();
    let mut tick = tokio::time::interval(tick_period(fps));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut stat_tick = tokio::time::interval(Duration::from_secs(1));
    stat_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    while !*cancel.borrow() {
        tokio::select! {
            _ = tick.tick() => {
                let read = match capture_timeout {
                    Some(limit) => match tokio::time::timeout(limit, source.read_frame()).await {
                        Ok(result) => result,
                        Err(_) => Err(ScoutError::CaptureTimeout(limit.as_millis() as u64)),
                    },
                    None => source.read_frame().await,
                };
                match read {
                    Ok(None) => {
                        info!(source = source.name(), "done source");
                        break;
                    }
                    Ok(Some(frame)) if frame.is_filled() => {
                        let frame = if (1..100).contains(&quality) {
                            frame.reencode_quality(quality)
                        } else {
                            frame
                        };
                        if frame_tx.send(frame).is_err() {
                            break;
                        }
                        stats.add_accepted();
                    }
                    Ok(Some(_)) => {
                        stats.add_dropped();
                    }
                    Err(e) => {
                        debug!(source = source.name(), error = %e, "transient read failure");
                        stats.add_dropped();
                    }
                }
                // FPS 上限变化时重建节拍
                let current = *fps_rx.borrow();
                if current != fps {
                    fps = current;
                    tick = tokio::time::interval(tick_period(fps));
                    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                }
            }
            _ = stat_tick.tick() => {
                stats.tick();
                let _ = hub.publish(TOPIC_CURRENT_FRAME_STATS, stats.snapshot());
            }
            req = get_sub.recv() => {
                if req.is_some() {
                    let _ = hub.publish(TOPIC_CURRENT_FRAME_STATS, stats.snapshot());
                }
            }
            result = cancel.changed() => {
                if result.is_err() || *cancel.borrow() {
                    break;
                }
            }
        }
    }
    stats.clear_per_second();
    source.close().await;
    drop(get_sub);
    hub.close();
}

async fn output_loop(
    mut frame_rx: mpsc::UnboundedReceiver<Frame>,
    out_tx: mpsc::Sender<Frame>,
    hub: PubSub,
    mut fps_rx: watch::Receiver<u32>,
    cancel: watch::Sender<bool>,
) {
    let mut stats = StatsTracker::new();
    let mut get_sub = match hub.subscribe::<()>(TOPIC_GET_FRAME_STATS, hub.unique_subscriber_id(), 4)
    {
        Ok(sub) => sub,
        Err(_) => return,
    };

    let mut fps = *fps_rx.borrow();
    let mut tick = tokio::time::interval(tick_period(fps));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut stat_tick = tokio::time::interval(Duration::from_secs(1));
    stat_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    // 单槽 latest-wins 缓冲
    let mut slot: Option<Frame> = None;
    loop {
        tokio::select! {
            incoming = frame_rx.recv() => {
                match incoming {
                    Some(frame) => {
                        if slot.replace(frame).is_some() {
                            // 槽被覆盖，旧帧按丢弃计数
                            stats.add_dropped();
                        }
                    }
                    None => break,
                }
            }
            _ = tick.tick() => {
                if let Some(frame) = slot.take() {
                    if out_tx.send(frame).await.is_err() {
                        // 下游收端已关，通知源任务停下
                        let _ = cancel.send(true);
                        break;
                    }
                    stats.add_accepted();
                }
                let current = *fps_rx.borrow();
                if current != fps {
                    fps = current;
                    tick = tokio::time::interval(tick_period(fps));
                    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                }
            }
            _ = stat_tick.tick() => {
                stats.tick();
                let _ = hub.publish(TOPIC_CURRENT_FRAME_STATS, stats.snapshot());
            }
            req = get_sub.recv() => {
                if req.is_some() {
                    let _ = hub.publish(TOPIC_CURRENT_FRAME_STATS, stats.snapshot());
                }
            }
        }
    }
    drop(slot);
    stats.clear_per_second();
    drop(get_sub);
    hub.close();
}
