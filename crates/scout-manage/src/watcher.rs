use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Result;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// 事件合并窗口
const DEBOUNCE: Duration = Duration::from_millis(500);

/// 配置文件变更监视
///
/// notify 的回调线程把 Modify/Create 事件按 500ms 窗口去重后
/// 转入 tokio 通道。同一路径可被多个 monitor 引用，按计数注销。
pub struct ConfigWatcher {
    watcher: RecommendedWatcher,
    rx: Option<mpsc::Receiver<PathBuf>>,
    watched: HashMap<PathBuf, usize>,
}

impl ConfigWatcher {
    pub fn new() -> Result<Self> {
        let (event_tx, event_rx) = std::sync::mpsc::channel();
        let watcher = RecommendedWatcher::new(event_tx, notify::Config::default())?;
        let (tx, rx) = mpsc::channel(16);
        std::thread::spawn(move || bridge(event_rx, tx));
        Ok(Self {
            watcher,
            rx: Some(rx),
            watched: HashMap::new(),
        })
    }

    /// 取走事件接收端，便于放进调用方的 select 循环
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<PathBuf>> {
        self.rx.take()
    }

    /// 注册路径，重复注册只加计数
    pub fn add(&mut self, path: &Path) {
        let count = self.watched.entry(path.to_path_buf()).or_insert(0);
        *count += 1;
        if *count == 1 {
            if let Err(e) = self.watcher.watch(path, RecursiveMode::NonRecursive) {
                // 监视失败不影响 monitor 本身
                warn!(path = %path.display(), error = %e, "could not watch config path");
            } else {
                debug!(path = %path.display(), "watching config path");
            }
        }
    }

    /// 注销一次引用，计数归零才真正取消监视
    pub fn remove(&mut self, path: &Path) {
        if let Some(count) = self.watched.get_mut(path) {
            *count -= 1;
            if *count == 0 {
                self.watched.remove(path);
                if let Err(e) = self.watcher.unwatch(path) {
                    debug!(path = %path.display(), error = %e, "unwatch failed");
                }
            }
        }
    }

    /// 下一个变更路径（事件接收端未被取走时可用）
    pub async fn next_change(&mut self) -> Option<PathBuf> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }
}

fn bridge(
    event_rx: std::sync::mpsc::Receiver<notify::Result<Event>>,
    tx: mpsc::Sender<PathBuf>,
) {
    while let Ok(first) = event_rx.recv() {
        let mut paths = HashSet::new();
        collect(first, &mut paths);
        // 编辑器保存往往产生一串事件，窗口内合并
        let deadline = Instant::now() + DEBOUNCE;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match event_rx.recv_timeout(deadline - now) {
                Ok(event) => collect(event, &mut paths),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => break,
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        for path in paths {
            if tx.blocking_send(path).is_err() {
                return;
            }
        }
    }
}

fn collect(event: notify::Result<Event>, paths: &mut HashSet<PathBuf>) {
    match event {
        Ok(event) => {
            if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                paths.extend(event.paths);
            }
        }
        Err(e) => error!(error = %e, "watch error"),
    }
}

/// 事件路径与注册路径的比较（notify 可能返回规范化后的路径）
pub fn paths_match(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => false,
    }
}
