use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scout_config::{FaceConfig, MotionConfig, ObjectConfig};
use scout_detect::{FaceStage, MotionStage, ObjectStage};
use scout_pubsub::{PubSub, SubscriberId, Subscription};
use scout_types::{FrameStats, FrameStatsCombo, ProcessedFrame};
use scout_video::{delay_stream, ReaderHandle, VideoReader};
use tokio::sync::watch;
use tracing::info;

use crate::alert::{Alert, AlertTimes};
use crate::continuous::Continuous;
use crate::record::Record;

pub const TOPIC_MONITOR_IMAGES: &str = "monitor_images";
pub const TOPIC_GET_FRAME_STATS: &str = "get_frame_stats";
pub const TOPIC_CURRENT_FRAME_STATS: &str = "current_frame_stats";
pub const TOPIC_GET_ALERT_TIMES: &str = "get_alert_times";
pub const TOPIC_CURRENT_ALERT_TIMES: &str = "current_alert_times";

/// 单摄像头监控：reader → motion → object → face → 各 sink
///
/// 帧出延迟缓冲后按 sink 各取一个引用扇出；订阅者经 hub 的有界队列
/// 接收，慢订阅者只丢自己的。1 Hz 检查源端计数，停滞超时置 stale。
pub struct Monitor {
    name: String,
    pub config_paths: Vec<PathBuf>,
    out_fps: u32,
    buffer_size: usize,
    stale_timeout: u32,
    stale_max: u32,
    delay: Duration,
    hub: PubSub,
    reader: Option<VideoReader>,
    reader_handle: Option<ReaderHandle>,
    motion_config: MotionConfig,
    object_config: Option<ObjectConfig>,
    face_config: Option<FaceConfig>,
    record: Option<Record>,
    record_handle: Option<Arc<Record>>,
    continuous: Option<Continuous>,
    continuous_handle: Option<Arc<Continuous>>,
    alert: Option<Alert>,
    alert_handle: Option<Arc<Alert>>,
    subscriber_keys: Arc<Mutex<HashMap<String, SubscriberId>>>,
    is_stale: Arc<AtomicBool>,
    stale_retry: Arc<AtomicU32>,
    done: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

impl Monitor {
    pub fn new(name: &str, reader: VideoReader) -> Self {
        let (done, done_rx) = watch::channel(false);
        Self {
            name: name.to_string(),
            config_paths: Vec::new(),
            out_fps: reader.max_output_fps(),
            buffer_size: 0,
            stale_timeout: 20,
            stale_max: 10,
            delay: Duration::ZERO,
            hub: PubSub::new(),
            reader: Some(reader),
            reader_handle: None,
            motion_config: MotionConfig::default(),
            object_config: None,
            face_config: None,
            record: None,
            record_handle: None,
            continuous: None,
            continuous_handle: None,
            alert: None,
            alert_handle: None,
            subscriber_keys: Arc::new(Mutex::new(HashMap::new())),
            is_stale: Arc::new(AtomicBool::new(false)),
            stale_retry: Arc::new(AtomicU32::new(10)),
            done,
            done_rx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// stage 间通道容量 = buffer_seconds × out_fps，0 即无缓冲
    pub fn set_buffer_seconds(&mut self, seconds: u32) {
        self.buffer_size = (seconds * self.out_fps) as usize;
    }

    pub fn set_stale_config(&mut self, timeout: u32, max_retry: u32) {
        if timeout > 0 {
            self.stale_timeout = timeout;
        }
        if max_retry > 0 {
            self.stale_max = max_retry;
            self.stale_retry.store(max_retry, Ordering::Release);
        }
    }

    pub fn set_delay_millis(&mut self, millis: u64) {
        self.delay = Duration::from_millis(millis);
    }

    pub fn set_motion(&mut self, config: MotionConfig) {
        self.motion_config = config;
    }

    pub fn set_object(&mut self, config: ObjectConfig) {
        self.object_config = Some(config);
    }

    pub fn set_face(&mut self, config: FaceConfig) {
        self.face_config = Some(config);
    }

    pub fn set_record(&mut self, record: Record) {
        self.record = Some(record);
    }

    pub fn set_continuous(&mut self, continuous: Continuous) {
        self.continuous = Some(continuous);
    }

    pub fn set_alert(&mut self, alert: Alert) {
        self.alert = Some(alert);
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale.load(Ordering::Acquire)
    }

    pub fn stale_retry(&self) -> u32 {
        self.stale_retry.load(Ordering::Acquire)
    }

    /// 监督者重建实例时继承剩余重试次数
    pub fn set_stale_retry(&mut self, retries: u32) {
        self.stale_retry.store(retries, Ordering::Release);
    }

    pub fn stale_max(&self) -> u32 {
        self.stale_max
    }

    /// 搭起流水线并启动监控任务
    pub fn start(&mut self) {
        let mut reader = match self.reader.take() {
            Some(reader) => reader,
            None => return,
        };
        let reader_rx = reader.start();
        let mut source_stats = reader.subscribe_source_stats();
        let mut output_stats = reader.subscribe_output_stats();
        let reader = reader.handle();
        self.reader_handle = Some(reader.clone());

        let motion_out =
            MotionStage::new(self.motion_config.clone()).run(reader_rx, self.buffer_size);
        let object_stage = match &self.object_config {
            Some(config) => ObjectStage::new(config.clone()),
            // 未配置目标检测时该 stage 直通
            None => ObjectStage::new(ObjectConfig {
                skip: true,
                ..ObjectConfig::default()
            }),
        };
        let object_out = object_stage.run(motion_out, self.buffer_size);
        let face_stage = match &self.face_config {
            Some(config) => FaceStage::new(config.clone()),
            None => FaceStage::new(FaceConfig {
                skip: true,
                ..FaceConfig::default()
            }),
        };
        let face_out = face_stage.run(object_out, self.buffer_size);
        let mut processed = delay_stream(self.delay, face_out);

        let record = self.start_record();
        let continuous = self.start_continuous();
        let alert = self.start_alert();

        let hub = self.hub.clone();
        let name = self.name.clone();
        let is_stale = self.is_stale.clone();
        let stale_retry = self.stale_retry.clone();
        let stale_timeout = self.stale_timeout;
        let stale_max = self.stale_max;
        let done = self.done.clone();

        tokio::spawn(async move {
            let mut get_stats_sub = hub
                .subscribe::<()>(TOPIC_GET_FRAME_STATS, hub.unique_subscriber_id(), 4)
                .ok();
            let mut get_alert_sub = hub
                .subscribe::<()>(TOPIC_GET_ALERT_TIMES, hub.unique_subscriber_id(), 4)
                .ok();

            let mut combo = FrameStatsCombo::default();
            let mut stale_tick = tokio::time::interval_at(
                tokio::time::Instant::now() + Duration::from_secs(1),
                Duration::from_secs(1),
            );
            let mut stale_sec: u32 = 0;
            let mut last_total: u64 = 0;

            loop {
                tokio::select! {
                    incoming = processed.recv() => {
                        let img = match incoming {
                            Some(img) => img,
                            None => break,
                        };
                        // 每个 sink 各取一个引用
                        if let Some(alert) = &alert {
                            alert.push(img.clone());
                        }
                        if let Some(record) = &record {
                            record.send(img.clone());
                        }
                        if let Some(continuous) = &continuous {
                            continuous.send(img.clone());
                        }
                        let _ = hub.publish(TOPIC_MONITOR_IMAGES, img);
                    }
                    stats = recv_opt(&mut source_stats) => match stats {
                        Some(stats) => combo.source = stats,
                        None => source_stats = None,
                    },
                    stats = recv_opt(&mut output_stats) => match stats {
                        Some(stats) => combo.output = stats,
                        None => output_stats = None,
                    },
                    req = recv_opt(&mut get_stats_sub) => {
                        if req.is_some() {
                            let _ = hub.publish(TOPIC_CURRENT_FRAME_STATS, combo);
                        }
                    }
                    req = recv_opt(&mut get_alert_sub) => {
                        if req.is_some() {
                            let times = alert
                                .as_ref()
                                .map(|a| a.last_alert())
                                .unwrap_or_default();
                            let _ = hub.publish(TOPIC_CURRENT_ALERT_TIMES, times);
                        }
                    }
                    _ = stale_tick.tick() => {
                        let current = combo.source.accepted_total;
                        if current == last_total {
                            stale_sec += 1;
                        } else {
                            // 源在走，恢复重试额度
                            stale_sec = 0;
                            is_stale.store(false, Ordering::Release);
                            stale_retry.store(stale_max, Ordering::Release);
                        }
                        last_total = current;
                        if stale_sec >= stale_timeout {
                            is_stale.store(true, Ordering::Release);
                        }
                    }
                }
            }

            // 先 record、再 continuous、最后 alert，各自等干净
            if let Some(record) = &record {
                record.close();
                record.wait().await;
            }
            if let Some(continuous) = &continuous {
                continuous.close();
                continuous.wait().await;
            }
            if let Some(alert) = &alert {
                alert.close();
                alert.wait().await;
            }
            reader.wait().await;
            hub.close();
            is_stale.store(true, Ordering::Release);
            let _ = done.send(true);
            info!(monitor = %name, "done monitor");
        });
    }

    fn start_record(&mut self) -> Option<Arc<Record>> {
        let mut record = self.record.take()?;
        record.start();
        let record = Arc::new(record);
        self.record_handle = Some(record.clone());
        Some(record)
    }

    fn start_continuous(&mut self) -> Option<Arc<Continuous>> {
        let mut continuous = self.continuous.take()?;
        continuous.start();
        let continuous = Arc::new(continuous);
        self.continuous_handle = Some(continuous.clone());
        Some(continuous)
    }

    fn start_alert(&mut self) -> Option<Arc<Alert>> {
        let mut alert = self.alert.take()?;
        alert.start();
        let alert = Arc::new(alert);
        self.alert_handle = Some(alert.clone());
        Some(alert)
    }

    /// 停止，幂等：停 reader，各级通道随上游排空逐级关闭
    pub fn stop(&self) {
        if let Some(reader) = &self.reader_handle {
            reader.stop();
        }
    }

    pub async fn wait(&self) {
        let mut done = self.done_rx.clone();
        let _ = done.wait_for(|finished| *finished).await;
    }

    /// 按 key 订阅处理后的帧流，慢订阅者溢出丢帧
    ///
    /// 同一 key 重复订阅会替换旧队列；monitor 结束时全部订阅随 hub 关闭。
    pub fn subscribe(&self, key: &str, buffer: usize) -> Option<Subscription<ProcessedFrame>> {
        let id = match self.subscriber_keys.lock() {
            Ok(mut keys) => *keys
                .entry(key.to_string())
                .or_insert_with(|| self.hub.unique_subscriber_id()),
            Err(_) => return None,
        };
        self.hub
            .subscribe::<ProcessedFrame>(TOPIC_MONITOR_IMAGES, id, buffer.max(1))
            .ok()
    }

    /// 按 key 退订，重复退订为空操作
    pub fn unsubscribe(&self, key: &str) {
        let id = match self.subscriber_keys.lock() {
            Ok(mut keys) => keys.remove(key),
            Err(_) => None,
        };
        if let Some(id) = id {
            self.hub.unsubscribe(TOPIC_MONITOR_IMAGES, id);
        }
    }

    pub async fn frame_stats(&self, timeout_ms: u64) -> Option<FrameStatsCombo> {
        self.hub
            .send_receive::<(), FrameStatsCombo>(
                TOPIC_GET_FRAME_STATS,
                TOPIC_CURRENT_FRAME_STATS,
                (),
                timeout_ms,
            )
            .await
    }

    pub fn alert_times(&self) -> AlertTimes {
        if let Some(alert) = &self.alert_handle {
            return alert.last_alert();
        }
        if let Some(alert) = &self.alert {
            return alert.last_alert();
        }
        AlertTimes::default()
    }
}

async fn recv_opt<T>(sub: &mut Option<Subscription<T>>) -> Option<T> {
    match sub {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}

// 给监督者读 reader 统计用
impl Monitor {
    pub async fn source_stats(&self, timeout_ms: u64) -> Option<FrameStats> {
        match &self.reader_handle {
            Some(reader) => reader.source_stats(timeout_ms).await,
            None => None,
        }
    }
}
