use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use scout_config::{ConfigLoader, ManageConfig, MonitorEntry};
use scout_monitor::{Alert, AlertTimes, Continuous, Monitor, Record};
use scout_notify::{Notifier, SmtpNotifier};
use scout_pubsub::{PubSub, Subscription};
use scout_types::{FrameStatsCombo, ProcessedFrame};
use scout_video::{FfmpegSource, VideoReader, VideoSource};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::watcher::{paths_match, ConfigWatcher};

pub const TOPIC_ADD_MON: &str = "add_mon";
pub const TOPIC_REMOVE_MON: &str = "remove_mon";
pub const TOPIC_SUBSCRIBE: &str = "subscribe";
pub const TOPIC_UNSUBSCRIBE: &str = "unsubscribe";
pub const TOPIC_GET_MONITOR_NAMES: &str = "get_monitor_names";
pub const TOPIC_CURRENT_MONITOR_NAMES: &str = "current_monitor_names";
pub const TOPIC_GET_FRAME_STATS: &str = "get_frame_stats";
pub const TOPIC_CURRENT_FRAME_STATS: &str = "current_frame_stats";
pub const TOPIC_GET_ALERT_TIMES: &str = "get_alert_times";
pub const TOPIC_CURRENT_ALERT_TIMES: &str = "current_alert_times";

/// 组件停不下来时的等待上限
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);
/// 转发给单个 monitor 的查询超时
const INNER_QUERY_TIMEOUT_MS: u64 = 200;

#[derive(Clone)]
struct FrameStatsRequest {
    name: String,
    reply_topic: String,
}

#[derive(Clone)]
struct SubscribeRequest {
    name: String,
    key: String,
    buffer: usize,
    reply: mpsc::Sender<Option<Subscription<ProcessedFrame>>>,
}

#[derive(Clone)]
struct UnsubscribeRequest {
    name: String,
    key: String,
}

/// 全体 monitor 的管理者
///
/// monitor 表只在管理任务里变更；外部调用一律通过 hub 的
/// 请求/响应话题。1 Hz 监督 stale monitor 并按剩余重试次数重建，
/// 配置文件变更触发 stop → setup → start 的热重载。
pub struct Manage {
    loader: Arc<ConfigLoader>,
    manage_conf: ManageConfig,
    notifier: Option<Arc<dyn Notifier>>,
    hub: PubSub,
    cancel: watch::Sender<bool>,
    done: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
    started: bool,
}

impl Manage {
    pub fn new(loader: ConfigLoader) -> Result<Self> {
        let manage_conf = loader.load_manage()?;
        let notifier: Option<Arc<dyn Notifier>> = match loader.load_notify_sender() {
            Ok(sender_conf) => match SmtpNotifier::new(&sender_conf) {
                Ok(notifier) => Some(Arc::new(notifier)),
                Err(e) => {
                    warn!(error = %e, "could not build smtp notifier");
                    None
                }
            },
            Err(_) => None,
        };
        let (cancel, _) = watch::channel(false);
        let (done, done_rx) = watch::channel(false);
        Ok(Self {
            loader: Arc::new(loader),
            manage_conf,
            notifier,
            hub: PubSub::new(),
            cancel,
            done,
            done_rx,
            started: false,
        })
    }

    pub fn data_directory(&self) -> &Path {
        &self.manage_conf.data
    }

    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        let task = ManageTask {
            loader: self.loader.clone(),
            manage_conf: self.manage_conf.clone(),
            notifier: self.notifier.clone(),
            hub: self.hub.clone(),
            mons: HashMap::new(),
            watcher: None,
            retry_list: Vec::new(),
        };
        let cancel = self.cancel.subscribe();
        let done = self.done.clone();
        tokio::spawn(async move {
            task.run(cancel).await;
            let _ = done.send(true);
        });
    }

    /// 停止全部 monitor，幂等
    pub fn stop(&self) {
        let _ = self.cancel.send(true);
    }

    pub async fn wait(&self) {
        let mut done = self.done_rx.clone();
        let _ = done.wait_for(|finished| *finished).await;
    }

    /// 排好序的 monitor 名单
    pub async fn monitor_names(&self, timeout_ms: u64) -> Vec<String> {
        self.hub
            .send_receive::<(), Vec<String>>(
                TOPIC_GET_MONITOR_NAMES,
                TOPIC_CURRENT_MONITOR_NAMES,
                (),
                timeout_ms,
            )
            .await
            .unwrap_or_default()
    }

    /// 单个 monitor 的读入/输出统计
    pub async fn frame_stats(&self, name: &str, timeout_ms: u64) -> Option<FrameStatsCombo> {
        let reply_topic = self.hub.response_topic(TOPIC_CURRENT_FRAME_STATS);
        self.hub
            .send_receive::<FrameStatsRequest, Option<FrameStatsCombo>>(
                TOPIC_GET_FRAME_STATS,
                &reply_topic,
                FrameStatsRequest {
                    name: name.to_string(),
                    reply_topic: reply_topic.clone(),
                },
                timeout_ms,
            )
            .await
            .flatten()
    }

    /// 所有 monitor 的最近告警时间
    pub async fn alert_times(&self, timeout_ms: u64) -> HashMap<String, AlertTimes> {
        self.hub
            .send_receive::<(), HashMap<String, AlertTimes>>(
                TOPIC_GET_ALERT_TIMES,
                TOPIC_CURRENT_ALERT_TIMES,
                (),
                timeout_ms,
            )
            .await
            .unwrap_or_default()
    }

    /// 按 key 订阅某个 monitor 的帧流，同 key 重复订阅替换旧队列
    pub async fn subscribe(
        &self,
        name: &str,
        key: &str,
        buffer: usize,
        timeout_ms: u64,
    ) -> Option<Subscription<ProcessedFrame>> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        let request = SubscribeRequest {
            name: name.to_string(),
            key: key.to_string(),
            buffer,
            reply: reply_tx,
        };
        if self.hub.publish(TOPIC_SUBSCRIBE, request).is_err() {
            return None;
        }
        tokio::time::timeout(Duration::from_millis(timeout_ms), reply_rx.recv())
            .await
            .ok()
            .flatten()
            .flatten()
    }

    /// 按 key 退订
    pub fn unsubscribe(&self, name: &str, key: &str) {
        let _ = self.hub.publish(
            TOPIC_UNSUBSCRIBE,
            UnsubscribeRequest {
                name: name.to_string(),
                key: key.to_string(),
            },
        );
    }

    /// 追加一个 monitor（配置项须可加载）
    pub fn add_monitor(&self, entry: MonitorEntry) {
        let _ = self.hub.publish(TOPIC_ADD_MON, entry);
    }

    pub fn remove_monitor(&self, name: &str) {
        let _ = self.hub.publish(TOPIC_REMOVE_MON, name.to_string());
    }
}

struct ManageTask {
    loader: Arc<ConfigLoader>,
    manage_conf: ManageConfig,
    notifier: Option<Arc<dyn Notifier>>,
    hub: PubSub,
    mons: HashMap<String, Monitor>,
    watcher: Option<ConfigWatcher>,
    retry_list: Vec<MonitorEntry>,
}

impl ManageTask {
    async fn run(mut self, mut cancel: watch::Receiver<bool>) {
        self.watcher = match ConfigWatcher::new() {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                error!(error = %e, "config watcher unavailable");
                None
            }
        };
        let mut change_rx = self.watcher.as_mut().and_then(|watcher| watcher.take_events());

        let entries = self.manage_conf.monitors.clone();
        for entry in entries {
            self.setup_and_add(entry).await;
        }

        let mut add_sub = self.subscribe_topic::<MonitorEntry>(TOPIC_ADD_MON);
        let mut remove_sub = self.subscribe_topic::<String>(TOPIC_REMOVE_MON);
        let mut names_sub = self.subscribe_topic::<()>(TOPIC_GET_MONITOR_NAMES);
        let mut stats_sub = self.subscribe_topic::<FrameStatsRequest>(TOPIC_GET_FRAME_STATS);
        let mut alert_sub = self.subscribe_topic::<()>(TOPIC_GET_ALERT_TIMES);
        let mut subscribe_sub = self.subscribe_topic::<SubscribeRequest>(TOPIC_SUBSCRIBE);
        let mut unsubscribe_sub = self.subscribe_topic::<UnsubscribeRequest>(TOPIC_UNSUBSCRIBE);

        let mut stale_tick = tokio::time::interval_at(
            tokio::time::Instant::now() + Duration::from_secs(1),
            Duration::from_secs(1),
        );
        let mut last_stale: HashSet<String> = HashSet::new();

        loop {
            tokio::select! {
                result = cancel.changed() => {
                    if result.is_err() || *cancel.borrow() {
                        break;
                    }
                }
                _ = stale_tick.tick() => {
                    last_stale = self.check_stale(last_stale).await;
                }
                change = next_path(&mut change_rx) => {
                    if let Some(path) = change {
                        self.handle_config_change(&path).await;
                    }
                }
                req = recv_opt(&mut add_sub) => {
                    if let Some(entry) = req {
                        self.setup_and_add(entry).await;
                    }
                }
                req = recv_opt(&mut remove_sub) => {
                    if let Some(name) = req {
                        self.remove_monitor(&name).await;
                    }
                }
                req = recv_opt(&mut names_sub) => {
                    if req.is_some() {
                        let mut names: Vec<String> = self.mons.keys().cloned().collect();
                        names.sort();
                        let _ = self.hub.publish(TOPIC_CURRENT_MONITOR_NAMES, names);
                    }
                }
                req = recv_opt(&mut stats_sub) => {
                    if let Some(req) = req {
                        let stats = match self.mons.get(&req.name) {
                            Some(mon) => mon.frame_stats(INNER_QUERY_TIMEOUT_MS).await,
                            None => None,
                        };
                        let _ = self.hub.publish(&req.reply_topic, stats);
                    }
                }
                req = recv_opt(&mut alert_sub) => {
                    if req.is_some() {
                        let times: HashMap<String, AlertTimes> = self
                            .mons
                            .iter()
                            .map(|(name, mon)| (name.clone(), mon.alert_times()))
                            .collect();
                        let _ = self.hub.publish(TOPIC_CURRENT_ALERT_TIMES, times);
                    }
                }
                req = recv_opt(&mut subscribe_sub) => {
                    if let Some(req) = req {
                        let sub = self
                            .mons
                            .get(&req.name)
                            .and_then(|mon| mon.subscribe(&req.key, req.buffer));
                        let _ = req.reply.try_send(sub);
                    }
                }
                req = recv_opt(&mut unsubscribe_sub) => {
                    if let Some(req) = req {
                        if let Some(mon) = self.mons.get(&req.name) {
                            mon.unsubscribe(&req.key);
                        }
                    }
                }
            }
        }

        // 关停：逐个停下并限时等待
        let names: Vec<String> = self.mons.keys().cloned().collect();
        for name in names {
            self.remove_monitor(&name).await;
        }
        self.hub.close();
        info!("manage stopped");
    }

    fn subscribe_topic<T: Send + 'static>(&self, topic: &str) -> Option<Subscription<T>> {
        self.hub
            .subscribe::<T>(topic, self.hub.unique_subscriber_id(), 16)
            .ok()
    }

    async fn setup_and_add(&mut self, entry: MonitorEntry) {
        match setup_monitor(
            &self.loader,
            &entry,
            &self.manage_conf.data,
            self.notifier.clone(),
        )
        .await
        {
            Ok(mon) => self.add_monitor(mon),
            Err(e) => {
                error!(monitor = %entry.name, error = %e, "could not setup monitor");
                if !self.retry_list.iter().any(|queued| queued.name == entry.name) {
                    self.retry_list.push(entry);
                }
            }
        }
    }

    fn add_monitor(&mut self, mut mon: Monitor) {
        if let Some(watcher) = self.watcher.as_mut() {
            for path in &mon.config_paths {
                watcher.add(path);
            }
        }
        mon.start();
        info!(monitor = mon.name(), "monitor started");
        self.mons.insert(mon.name().to_string(), mon);
    }

    /// 停掉并摘除一个 monitor，返回旧实例供监督者读重试计数
    async fn remove_monitor(&mut self, name: &str) -> Option<Monitor> {
        let mon = self.mons.remove(name)?;
        mon.stop();
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, mon.wait()).await.is_err() {
            // 按下不表，继续收场
            warn!(monitor = %name, "monitor did not stop in time");
        }
        if let Some(watcher) = self.watcher.as_mut() {
            for path in &mon.config_paths {
                watcher.remove(path);
            }
        }
        Some(mon)
    }

    async fn check_stale(&mut self, last_stale: HashSet<String>) -> HashSet<String> {
        let stale_names: Vec<String> = self
            .mons
            .iter()
            .filter(|(_, mon)| mon.is_stale())
            .map(|(name, _)| name.clone())
            .collect();
        let mut current = HashSet::new();
        for name in stale_names {
            warn!(monitor = %name, "stale monitor");
            let old = match self.remove_monitor(&name).await {
                Some(old) => old,
                None => continue,
            };
            current.insert(name.clone());
            let retries = old.stale_retry();
            if retries == 0 {
                // 重试耗尽，等运维介入
                continue;
            }
            let entry = match self
                .manage_conf
                .monitors
                .iter()
                .find(|entry| entry.name == name)
                .cloned()
            {
                Some(entry) => entry,
                None => continue,
            };
            match setup_monitor(&self.loader, &entry, &self.manage_conf.data, self.notifier.clone())
                .await
            {
                Ok(mut new_mon) => {
                    if last_stale.contains(&name) {
                        // 连续 stale 才消耗重试额度
                        new_mon.set_stale_retry(retries - 1);
                        warn!(monitor = %name, retries = retries - 1, "stale retry decremented");
                        if retries - 1 == 0 {
                            error!(monitor = %name, "stale last retry");
                        }
                    }
                    self.add_monitor(new_mon);
                    info!(monitor = %name, "stale restarted monitor");
                }
                Err(e) => {
                    error!(monitor = %name, error = %e, "stale restart failed");
                }
            }
        }
        current
    }

    async fn handle_config_change(&mut self, path: &Path) {
        info!(path = %path.display(), "config changed");
        let associated: Vec<String> = self
            .mons
            .iter()
            .filter(|(_, mon)| {
                mon.config_paths
                    .iter()
                    .any(|config_path| paths_match(config_path, path))
            })
            .map(|(name, _)| name.clone())
            .collect();

        for name in associated {
            self.remove_monitor(&name).await;
            let entry = match self
                .manage_conf
                .monitors
                .iter()
                .find(|entry| entry.name == name)
                .cloned()
            {
                Some(entry) => entry,
                None => continue,
            };
            match setup_monitor(&self.loader, &entry, &self.manage_conf.data, self.notifier.clone())
                .await
            {
                Ok(mon) => {
                    self.add_monitor(mon);
                    info!(monitor = %name, "config restarted monitor");
                }
                Err(e) => {
                    error!(monitor = %name, error = %e, "config restart failed");
                    if !self.retry_list.iter().any(|queued| queued.name == name) {
                        self.retry_list.push(entry);
                    }
                }
            }
        }

        // 之前失败的配置每次事件都再试一轮
        let queued = std::mem::take(&mut self.retry_list);
        for entry in queued {
            if !self.mons.contains_key(&entry.name) {
                self.setup_and_add(entry).await;
            }
        }
    }
}

async fn next_path(rx: &mut Option<mpsc::Receiver<PathBuf>>) -> Option<PathBuf> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn recv_opt<T>(sub: &mut Option<Subscription<T>>) -> Option<T> {
    match sub {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}

/// 按主配置搭一个 monitor：源、reader、各 stage 与 sink 的配置
async fn setup_monitor(
    loader: &ConfigLoader,
    entry: &MonitorEntry,
    data_dir: &Path,
    notifier: Option<Arc<dyn Notifier>>,
) -> Result<Monitor> {
    let conf = loader
        .load_monitor(&entry.config)
        .with_context(|| format!("monitor config {}", entry.config))?;

    let source: Box<dyn VideoSource> = if let Some(filename) = &conf.filename {
        Box::new(FfmpegSource::from_file(entry.name.clone(), filename.clone()))
    } else if let Some(url) = &conf.url {
        Box::new(FfmpegSource::from_url(entry.name.clone(), url.clone()))
    } else {
        bail!("no video source configured");
    };

    let mut reader = VideoReader::new(source, conf.max_source_fps, conf.max_output_fps)?;
    reader.set_quality(conf.quality);
    reader.set_capture_timeout(conf.capture_timeout_milli_seconds);

    let mut mon = Monitor::new(&entry.name, reader);
    mon.config_paths.push(loader.resolve(&entry.config));
    mon.set_buffer_seconds(conf.buffer_seconds);
    mon.set_delay_millis(conf.delay_buffer_milli_seconds);
    mon.set_stale_config(conf.stale_timeout, conf.stale_max_retry);

    if let Some(rel) = &conf.motion {
        mon.set_motion(loader.load_motion(rel)?);
        mon.config_paths.push(loader.resolve(rel));
    }
    if let Some(rel) = &conf.object {
        mon.set_object(loader.load_object(rel)?);
        mon.config_paths.push(loader.resolve(rel));
    }
    if let Some(rel) = &conf.face {
        mon.set_face(loader.load_face(rel)?);
        mon.config_paths.push(loader.resolve(rel));
    }
    if let Some(rel) = &conf.record {
        let record_conf = loader.load_record(rel)?;
        let record = Record::new(&entry.name, data_dir, record_conf, conf.max_output_fps).await?;
        mon.set_record(record);
        mon.config_paths.push(loader.resolve(rel));
    }
    if let Some(rel) = &conf.continuous {
        let continuous_conf = loader.load_continuous(rel)?;
        let continuous =
            Continuous::new(&entry.name, data_dir, continuous_conf, conf.max_output_fps).await?;
        mon.set_continuous(continuous);
        mon.config_paths.push(loader.resolve(rel));
    }
    if let Some(rel) = &conf.alert {
        let alert_conf = loader.load_alert(rel)?;
        let rx_conf = match &conf.notify_rx {
            Some(rx_rel) => {
                mon.config_paths.push(loader.resolve(rx_rel));
                Some(loader.load_notify_rx(rx_rel)?)
            }
            None => None,
        };
        let alert = Alert::new(&entry.name, notifier, rx_conf, data_dir, alert_conf).await?;
        mon.set_alert(alert);
        mon.config_paths.push(loader.resolve(rel));
    }
    Ok(mon)
}
