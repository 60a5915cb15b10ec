use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use scout_config::AlertConfig;
use scout_core::Result;
use scout_notify::{Notifier, RxConfig};
use scout_storage::Pruner;
use scout_types::ProcessedFrame;
use scout_video::{save_image, save_preview, RingBuffer};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::render::{alert_html, alert_text, alert_title, AttachedInfo, ImageInfo, LOGO_FILENAME};

/// 短信附件的体积上限（300 KB）
const MAX_TEXT_FILE_SIZE: u64 = 300_000;

/// 邮件 logo 资源目录，相对进程工作目录
const LOGO_ASSET_DIR: &str = "assets";

fn logo_asset_path() -> PathBuf {
    Path::new(LOGO_ASSET_DIR).join(LOGO_FILENAME)
}

/// 每类检测的最近一次时间
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertTimes {
    pub object_at: Option<DateTime<Utc>>,
    pub person_at: Option<DateTime<Utc>>,
    pub face_at: Option<DateTime<Utc>>,
}

fn kitchen_timestamp(t: DateTime<Local>) -> String {
    t.format("%I:%M:%S %p %m-%d-%Y").to_string()
}

/// 周期择优快照 + 限频通知
///
/// 只有带目标的帧才进环；环按内容排序（人脸数、人脸置信度、
/// 目标数、目标置信度降序），始终留下该周期里最有料的几帧。
pub struct Alert {
    name: String,
    dir: PathBuf,
    config: AlertConfig,
    notifier: Option<Arc<dyn Notifier>>,
    rx_conf: Option<RxConfig>,
    ring: Arc<Mutex<RingBuffer<ProcessedFrame>>>,
    last_alert: Arc<RwLock<AlertTimes>>,
    pruner: Arc<Pruner>,
    cancel: watch::Sender<bool>,
    done: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

impl Alert {
    pub async fn new(
        name: &str,
        notifier: Option<Arc<dyn Notifier>>,
        rx_conf: Option<RxConfig>,
        save_directory: &Path,
        config: AlertConfig,
    ) -> Result<Self> {
        let alert_dir = save_directory.join("alerts");
        tokio::fs::create_dir_all(&alert_dir).await?;
        let ring = RingBuffer::new(config.max_images_per_interval)
            .sorted_by(|a: &ProcessedFrame, b: &ProcessedFrame| a.content_key().cmp(&b.content_key()));
        let pruner = Arc::new(Pruner::new(
            alert_dir.clone(),
            name.to_string(),
            config.delete_after_hours,
            config.delete_after_gb,
        ));
        let (cancel, _) = watch::channel(false);
        let (done, done_rx) = watch::channel(false);
        Ok(Self {
            name: name.to_string(),
            dir: alert_dir,
            config,
            notifier,
            rx_conf,
            ring: Arc::new(Mutex::new(ring)),
            last_alert: Arc::new(RwLock::new(AlertTimes::default())),
            pruner,
            cancel,
            done,
            done_rx,
        })
    }

    /// 带目标的帧进环，其余直接释放
    pub fn push(&self, img: ProcessedFrame) {
        if !img.has_object() {
            return;
        }
        if let Ok(mut ring) = self.ring.lock() {
            // 挤出的低分帧随 drop 释放
            let _ = ring.push(img);
        }
    }

    pub fn last_alert(&self) -> AlertTimes {
        self.last_alert.read().map(|t| *t).unwrap_or_default()
    }

    pub fn start(&mut self) {
        let mut state = TaskState {
            name: self.name.clone(),
            dir: self.dir.clone(),
            config: self.config.clone(),
            notifier: self.notifier.clone(),
            rx_conf: self.rx_conf.clone(),
            ring: self.ring.clone(),
            last_alert: self.last_alert.clone(),
            pruner: self.pruner.clone(),
            hour_sent: 0,
        };
        let mut cancel = self.cancel.subscribe();
        let done = self.done.clone();
        tokio::spawn(async move {
            let interval_period =
                Duration::from_secs(state.config.interval_minutes.max(1) as u64 * 60);
            let mut interval_tick = tokio::time::interval_at(
                tokio::time::Instant::now() + interval_period,
                interval_period,
            );
            let hour = Duration::from_secs(3600);
            let mut hour_tick = tokio::time::interval_at(tokio::time::Instant::now() + hour, hour);
            loop {
                tokio::select! {
                    result = cancel.changed() => {
                        if result.is_err() || *cancel.borrow() {
                            state.pruner.prune().await;
                            state.do_alerts().await;
                            break;
                        }
                    }
                    _ = hour_tick.tick() => {
                        state.hour_sent = 0;
                        state.pruner.prune().await;
                    }
                    _ = interval_tick.tick() => {
                        state.do_alerts().await;
                    }
                }
            }
            let _ = done.send(true);
            info!(monitor = %state.name, "alert stopped");
        });
    }

    /// 停止，幂等；剩余帧在停止前做最后一轮告警
    pub fn close(&self) {
        let _ = self.cancel.send(true);
    }

    pub async fn wait(&self) {
        let mut done = self.done_rx.clone();
        let _ = done.wait_for(|finished| *finished).await;
    }
}

struct TaskState {
    name: String,
    dir: PathBuf,
    config: AlertConfig,
    notifier: Option<Arc<dyn Notifier>>,
    rx_conf: Option<RxConfig>,
    ring: Arc<Mutex<RingBuffer<ProcessedFrame>>>,
    last_alert: Arc<RwLock<AlertTimes>>,
    pruner: Arc<Pruner>,
    hour_sent: u32,
}

impl TaskState {
    async fn do_alerts(&mut self) {
        let mut popped = match self.ring.lock() {
            Ok(mut ring) => ring.drain_all(),
            Err(_) => return,
        };
        if popped.is_empty() {
            return;
        }
        popped.sort_by_key(|img| img.created_time());
        let now_str = kitchen_timestamp(Local::now());

        self.set_last_alerts(&popped);
        let images = self.save_alerts(&popped).await;
        self.send_alerts(&images, &now_str).await;
    }

    fn set_last_alerts(&self, popped: &[ProcessedFrame]) {
        let mut times = match self.last_alert.write() {
            Ok(times) => times,
            Err(_) => return,
        };
        for img in popped {
            let created = img.created_time();
            if img.has_object() {
                if img.has_person() {
                    if times.person_at.map(|t| created > t).unwrap_or(true) {
                        times.person_at = Some(created);
                    }
                } else if times.object_at.map(|t| created > t).unwrap_or(true) {
                    times.object_at = Some(created);
                }
            }
            if img.has_face() && times.face_at.map(|t| created > t).unwrap_or(true) {
                times.face_at = Some(created);
            }
        }
    }

    async fn save_alerts(&self, popped: &[ProcessedFrame]) -> Vec<ImageInfo> {
        let mut result = Vec::new();
        for (index, img) in popped.iter().enumerate() {
            let created = img.created_time().with_timezone(&Local);
            let mut attached = Vec::new();

            if self.config.save_original && img.frame.is_filled() {
                self.save_one(&img.frame, created, "Original", "", self.config.save_quality, &mut attached)
                    .await;
            }
            if self.config.save_highlighted && img.has_object() {
                let highlighted = img.highlighted_all();
                self.save_one(&highlighted, created, "Highlighted", "", self.config.save_quality, &mut attached)
                    .await;
            }
            for (i, object) in img.objects.iter().take(self.config.save_objects_count).enumerate() {
                let region = img.object_region(i);
                let percentage = object.confidence.to_string();
                self.save_one(&region, created, &object.label, &percentage, 100, &mut attached)
                    .await;
            }
            for (i, face) in img.faces.iter().take(self.config.save_faces_count).enumerate() {
                let region = img.face_region(i);
                let percentage = face.confidence.to_string();
                self.save_one(&region, created, "Face", &percentage, 100, &mut attached)
                    .await;
            }

            result.push(ImageInfo {
                name: format!("Image {}", index + 1),
                time: kitchen_timestamp(created),
                attached,
            });
        }
        result
    }

    async fn save_one(
        &self,
        frame: &scout_types::Frame,
        created: DateTime<Local>,
        title: &str,
        percentage: &str,
        quality: u8,
        attached: &mut Vec<AttachedInfo>,
    ) {
        if !frame.is_filled() {
            return;
        }
        if let Err(e) = save_preview(frame, created, &self.dir, &self.name, title, percentage).await
        {
            warn!(monitor = %self.name, error = %e, "could not save preview");
        }
        match save_image(frame, created, &self.dir, quality, &self.name, title, percentage).await {
            Ok(path) => {
                let display_pct = if percentage.is_empty() {
                    String::new()
                } else {
                    format!("{}%", percentage)
                };
                attached.push(AttachedInfo {
                    title: title.to_string(),
                    percentage: display_pct,
                    filename: path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default(),
                    full_path: path,
                });
            }
            Err(e) => warn!(monitor = %self.name, error = %e, "could not save alert image"),
        }
    }

    async fn send_alerts(&mut self, images: &[ImageInfo], alert_time: &str) {
        let notifier = match &self.notifier {
            Some(notifier) => notifier.clone(),
            None => return,
        };
        let rx = match &self.rx_conf {
            Some(rx) => rx.clone(),
            None => return,
        };
        if images.is_empty() {
            return;
        }
        let phones = rx.phones();
        if rx.email.is_empty() && phones.is_empty() {
            return;
        }

        let send_attachments = self.hour_sent < self.config.max_send_attachments_per_hour;
        let title = alert_title(&self.name);
        let html = alert_html(&self.name, alert_time, images, send_attachments);
        let text = alert_text(&self.name, alert_time, images);
        let attachments: Vec<PathBuf> = if send_attachments {
            images
                .iter()
                .flat_map(|image| image.attached.iter().map(|a| a.full_path.clone()))
                .collect()
        } else {
            Vec::new()
        };

        if !rx.email.is_empty() {
            // logo 永远随邮件内联，快照图受小时限额约束
            let mut embedded = Vec::with_capacity(attachments.len() + 1);
            embedded.push(logo_asset_path());
            embedded.extend(attachments.iter().cloned());
            if let Err(e) = notifier.send_email(&rx.email, &title, &html, &embedded).await {
                warn!(monitor = %self.name, error = %e, "email send failed");
            }
        }
        if !phones.is_empty() {
            if let Err(e) = notifier.send_text(&phones, &title, &text, &[]).await {
                warn!(monitor = %self.name, error = %e, "text send failed");
            }
            if self.config.text_attachments && send_attachments {
                for path in &attachments {
                    let small_enough = tokio::fs::metadata(path)
                        .await
                        .map(|meta| meta.len() <= MAX_TEXT_FILE_SIZE)
                        .unwrap_or(false);
                    if small_enough {
                        if let Err(e) = notifier
                            .send_text(&phones, &title, "", std::slice::from_ref(path))
                            .await
                        {
                            warn!(monitor = %self.name, error = %e, "text attachment send failed");
                        }
                    }
                }
            }
        }
        self.hour_sent += 1;
        info!(monitor = %self.name, images = images.len(), "alert sent");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use scout_notify::Phone;
    use scout_types::{Frame, Highlight, ObjectInfo, Rect};

    #[derive(Default)]
    struct MockNotifier {
        emails: Mutex<Vec<(Vec<String>, String, String, Vec<PathBuf>)>>,
        texts: Mutex<Vec<(usize, String)>>,
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn send_email(
            &self,
            to: &[String],
            subject: &str,
            html_body: &str,
            embedded: &[PathBuf],
        ) -> anyhow::Result<()> {
            self.emails.lock().unwrap().push((
                to.to_vec(),
                subject.to_string(),
                html_body.to_string(),
                embedded.to_vec(),
            ));
            Ok(())
        }

        async fn send_text(
            &self,
            phones: &[Phone],
            _subject: &str,
            body: &str,
            _attachments: &[PathBuf],
        ) -> anyhow::Result<()> {
            self.texts.lock().unwrap().push((phones.len(), body.to_string()));
            Ok(())
        }
    }

    fn object_frame(label: &str, confidence: i32) -> ProcessedFrame {
        let mut img = ProcessedFrame::new(Frame::new(RgbImage::from_pixel(
            64,
            64,
            Rgb([40, 40, 40]),
        )));
        img.objects.push(ObjectInfo {
            rect: Rect::new(8, 8, 32, 32),
            label: label.to_string(),
            confidence,
            highlight: Highlight::new("blue", 3),
        });
        img
    }

    fn config() -> AlertConfig {
        AlertConfig {
            interval_minutes: 60,
            max_images_per_interval: 2,
            save_original: true,
            save_highlighted: false,
            save_objects_count: 0,
            save_faces_count: 0,
            ..AlertConfig::default()
        }
    }

    async fn alert_with(
        dir: &Path,
        config: AlertConfig,
        notifier: Option<Arc<dyn Notifier>>,
        rx: Option<RxConfig>,
    ) -> Alert {
        Alert::new("cam", notifier, rx, dir, config).await.unwrap()
    }

    async fn saved_originals(dir: &Path) -> usize {
        scout_storage::list(&dir.join("alerts"), "cam")
            .await
            .unwrap()
            .iter()
            .filter(|f| f.path.to_string_lossy().ends_with("_Original.jpg"))
            .count()
    }

    #[tokio::test]
    async fn test_frames_without_object_never_enter_ring() {
        let tmp = tempfile::tempdir().unwrap();
        let mut alert = alert_with(tmp.path(), config(), None, None).await;
        alert.start();

        alert.push(ProcessedFrame::new(Frame::new(RgbImage::from_pixel(
            8,
            8,
            Rgb([0, 0, 0]),
        ))));
        alert.close();
        alert.wait().await;
        assert_eq!(saved_originals(tmp.path()).await, 0);
    }

    #[tokio::test]
    async fn test_best_frames_retained_up_to_capacity() {
        let tmp = tempfile::tempdir().unwrap();
        let mut alert = alert_with(tmp.path(), config(), None, None).await;
        alert.start();

        // 容量 2，push 3 帧，低置信度的被挤掉
        alert.push(object_frame("Cat", 50));
        alert.push(object_frame("Person", 95));
        alert.push(object_frame("Dog", 70));
        alert.close();
        alert.wait().await;
        assert_eq!(saved_originals(tmp.path()).await, 2);
    }

    #[tokio::test]
    async fn test_zero_capacity_disables_alerts() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = config();
        cfg.max_images_per_interval = 0;
        let notifier = Arc::new(MockNotifier::default());
        let rx = RxConfig {
            email: vec!["ops@example.com".to_string()],
            ..RxConfig::default()
        };
        let mut alert = alert_with(tmp.path(), cfg, Some(notifier.clone()), Some(rx)).await;
        alert.start();

        alert.push(object_frame("Person", 95));
        alert.close();
        alert.wait().await;
        assert_eq!(saved_originals(tmp.path()).await, 0);
        assert!(notifier.emails.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_alert_times_updated_per_category() {
        let tmp = tempfile::tempdir().unwrap();
        let mut alert = alert_with(tmp.path(), config(), None, None).await;
        alert.start();

        alert.push(object_frame("Person", 95));
        alert.push(object_frame("Car", 80));
        alert.close();
        alert.wait().await;

        let times = alert.last_alert();
        assert!(times.person_at.is_some());
        assert!(times.object_at.is_some());
        assert!(times.face_at.is_none());
    }

    #[tokio::test]
    async fn test_notification_sent_with_attachments_under_cap() {
        let tmp = tempfile::tempdir().unwrap();
        let notifier = Arc::new(MockNotifier::default());
        let rx = RxConfig {
            email: vec!["ops@example.com".to_string()],
            ..RxConfig::default()
        };
        let mut alert = alert_with(tmp.path(), config(), Some(notifier.clone()), Some(rx)).await;
        alert.start();

        alert.push(object_frame("Person", 95));
        alert.close();
        alert.wait().await;

        let emails = notifier.emails.lock().unwrap();
        assert_eq!(emails.len(), 1);
        let (to, subject, html, embedded) = &emails[0];
        assert_eq!(to.len(), 1);
        assert_eq!(subject, "Scout Alert cam");
        assert!(html.contains("cid:"));
        // logo 在最前面，其后是本轮快照
        assert_eq!(embedded.len(), 2);
        assert!(embedded[0].ends_with(logo_asset_path()));
        assert!(embedded[1]
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with("_Original.jpg"));
    }

    #[tokio::test]
    async fn test_sms_recipients_receive_text() {
        let tmp = tempfile::tempdir().unwrap();
        let notifier = Arc::new(MockNotifier::default());
        let rx = RxConfig {
            email: vec![],
            sms: scout_notify::SmsConfig {
                verizon: vec!["5551234567".to_string()],
                ..scout_notify::SmsConfig::default()
            },
        };
        let mut alert = alert_with(tmp.path(), config(), Some(notifier.clone()), Some(rx)).await;
        alert.start();

        alert.push(object_frame("Person", 95));
        alert.close();
        alert.wait().await;

        let texts = notifier.texts.lock().unwrap();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].0, 1);
        assert!(texts[0].1.contains("Scout Alert cam"));
    }
}
