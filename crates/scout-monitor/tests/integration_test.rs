use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use scout_config::{ContinuousConfig, MotionConfig};
use scout_core::Result;
use scout_monitor::{Continuous, Monitor};
use scout_types::Frame;
use scout_video::{FrameSink, SinkFactory, VideoReader, VideoSource};

/// 固定帧数后结束的合成源；frames 为 0 时打开即结束
struct SyntheticSource {
    frames_left: usize,
    hang_after: Option<usize>,
    produced: usize,
}

impl SyntheticSource {
    fn new(frames: usize) -> Self {
        Self {
            frames_left: frames,
            hang_after: None,
            produced: 0,
        }
    }

    fn hanging_after(frames: usize) -> Self {
        Self {
            frames_left: usize::MAX,
            hang_after: Some(frames),
            produced: 0,
        }
    }
}

#[async_trait]
impl VideoSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(limit) = self.hang_after {
            if self.produced >= limit {
                // 模拟卡死的摄像头
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
        if self.frames_left == 0 {
            return Ok(None);
        }
        self.frames_left -= 1;
        self.produced += 1;
        Ok(Some(Frame::new(RgbImage::from_pixel(
            32,
            24,
            Rgb([10, 20, 30]),
        ))))
    }

    async fn close(&mut self) {}
}

#[derive(Default)]
struct CountingFactory {
    segments: Arc<Mutex<Vec<(usize, bool)>>>,
}

struct CountingSink {
    index: usize,
    segments: Arc<Mutex<Vec<(usize, bool)>>>,
}

#[async_trait]
impl SinkFactory for CountingFactory {
    async fn open(
        &self,
        _path: &Path,
        _width: u32,
        _height: u32,
        _fps: u32,
    ) -> Result<Box<dyn FrameSink>> {
        let mut segments = self.segments.lock().unwrap();
        segments.push((0, false));
        Ok(Box::new(CountingSink {
            index: segments.len() - 1,
            segments: self.segments.clone(),
        }))
    }
}

#[async_trait]
impl FrameSink for CountingSink {
    async fn write(&mut self, _frame: &Frame) -> Result<()> {
        self.segments.lock().unwrap()[self.index].0 += 1;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.segments.lock().unwrap()[self.index].1 = true;
        Ok(())
    }
}

fn skip_motion() -> MotionConfig {
    MotionConfig {
        skip: true,
        ..MotionConfig::default()
    }
}

fn monitor_with_source(source: SyntheticSource) -> Monitor {
    let reader = VideoReader::new(Box::new(source), 10, 30).unwrap();
    let mut monitor = Monitor::new("itest", reader);
    monitor.set_motion(skip_motion());
    monitor
}

#[tokio::test(start_paused = true)]
async fn test_pipeline_preserves_order_and_completes() {
    let mut monitor = monitor_with_source(SyntheticSource::new(10));
    let mut sub = monitor.subscribe("viewer", 32).unwrap();
    monitor.start();

    let mut received = Vec::new();
    while let Some(img) = sub.recv().await {
        received.push(img.created_time());
    }
    assert!(!received.is_empty());
    // 顺序单调不减
    for pair in received.windows(2) {
        assert!(pair[0] <= pair[1]);
    }

    monitor.wait().await;
    // 源结束后 monitor 以 stale 收尾，供监督者决策
    assert!(monitor.is_stale());
}

#[tokio::test(start_paused = true)]
async fn test_slow_subscriber_does_not_block_pipeline() {
    let mut monitor = monitor_with_source(SyntheticSource::new(10));
    let mut fast = monitor.subscribe("fast", 32).unwrap();
    // 从不取的订阅者：队列塞满后只丢自己的
    let _never = monitor.subscribe("never", 1).unwrap();
    monitor.start();

    let mut fast_count = 0;
    while fast.recv().await.is_some() {
        fast_count += 1;
    }
    assert!(fast_count >= 9, "fast subscriber saw {}", fast_count);
    monitor.wait().await;
}

#[tokio::test(start_paused = true)]
async fn test_keyed_subscribe_replaces_and_unsubscribes() {
    let mut monitor = monitor_with_source(SyntheticSource::hanging_after(30));
    let mut first = monitor.subscribe("viewer", 8).unwrap();
    // 同 key 重复订阅替换旧队列
    let mut second = monitor.subscribe("viewer", 8).unwrap();
    monitor.start();

    assert!(first.recv().await.is_none());
    assert!(second.recv().await.is_some());

    // 按 key 退订后队列关闭，重复退订为空操作
    monitor.unsubscribe("viewer");
    monitor.unsubscribe("viewer");
    while second.recv().await.is_some() {}

    monitor.stop();
    monitor.wait().await;
}

#[tokio::test(start_paused = true)]
async fn test_continuous_records_every_frame() {
    let tmp = tempfile::tempdir().unwrap();
    let factory = Arc::new(CountingFactory::default());
    let segments = factory.segments.clone();

    let mut monitor = monitor_with_source(SyntheticSource::new(8));
    let continuous = Continuous::with_factory(
        "itest",
        tmp.path(),
        ContinuousConfig::default(),
        10,
        factory,
    )
    .await
    .unwrap();
    monitor.set_continuous(continuous);
    monitor.start();
    monitor.wait().await;

    let segments = segments.lock().unwrap();
    assert_eq!(segments.len(), 1, "one continuous segment expected");
    let (frames, finished) = segments[0];
    assert!(frames >= 7, "wrote {} frames", frames);
    assert!(finished);
}

#[tokio::test(start_paused = true)]
async fn test_stale_detected_when_source_hangs() {
    let mut monitor = monitor_with_source(SyntheticSource::hanging_after(3));
    monitor.set_stale_config(2, 5);
    monitor.start();

    // 源断流后 stale_timeout 秒内置位
    let mut waited = 0;
    while !monitor.is_stale() && waited < 60 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        waited += 1;
    }
    assert!(monitor.is_stale());

    monitor.stop();
    monitor.stop();
    monitor.wait().await;
}

#[tokio::test(start_paused = true)]
async fn test_frame_stats_query_round_trip() {
    // 源跑过 1 秒统计节拍之后才断流
    let mut monitor = monitor_with_source(SyntheticSource::hanging_after(15));
    monitor.start();

    // 等统计流入
    tokio::time::sleep(Duration::from_secs(3)).await;
    let combo = monitor.frame_stats(1_000).await;
    assert!(combo.is_some());
    let combo = combo.unwrap();
    assert!(combo.source.accepted_total >= 1);

    monitor.stop();
    monitor.wait().await;
}
