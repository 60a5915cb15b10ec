use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use config::{Config, File, FileFormat};
use scout_notify::{RxConfig, SenderConfig};
use serde::de::DeserializeOwned;

use crate::{
    AlertConfig, ContinuousConfig, FaceConfig, ManageConfig, MonitorConfig, MotionConfig,
    ObjectConfig, RecordConfig,
};

/// 顶层配置文件名
pub const MANAGE_FILENAME: &str = "manage.yaml";
/// SMTP 发信配置文件名
pub const NOTIFY_SENDER_FILENAME: &str = "notify-sender.yaml";

/// 配置加载器，所有路径相对配置目录解析
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new<P: AsRef<Path>>(config_dir: P) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// 相对路径转配置目录下的绝对路径
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.config_dir.join(relative)
    }

    fn load_yaml<T: DeserializeOwned>(&self, relative: &str) -> Result<T> {
        let path = self.resolve(relative);
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("invalid config path {:?}", path))?;
        let config = Config::builder()
            .add_source(File::new(path_str, FileFormat::Yaml))
            .build()
            .with_context(|| format!("load {}", path.display()))?;
        config
            .try_deserialize()
            .with_context(|| format!("parse {}", path.display()))
    }

    pub fn load_manage(&self) -> Result<ManageConfig> {
        self.load_yaml(MANAGE_FILENAME)
    }

    pub fn load_monitor(&self, relative: &str) -> Result<MonitorConfig> {
        let config: MonitorConfig = self.load_yaml(relative)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_record(&self, relative: &str) -> Result<RecordConfig> {
        self.load_yaml(relative)
    }

    pub fn load_continuous(&self, relative: &str) -> Result<ContinuousConfig> {
        self.load_yaml(relative)
    }

    pub fn load_alert(&self, relative: &str) -> Result<AlertConfig> {
        self.load_yaml(relative)
    }

    pub fn load_motion(&self, relative: &str) -> Result<MotionConfig> {
        self.load_yaml(relative)
    }

    pub fn load_object(&self, relative: &str) -> Result<ObjectConfig> {
        self.load_yaml(relative)
    }

    pub fn load_face(&self, relative: &str) -> Result<FaceConfig> {
        self.load_yaml(relative)
    }

    pub fn load_notify_sender(&self) -> Result<SenderConfig> {
        self.load_yaml(NOTIFY_SENDER_FILENAME)
    }

    pub fn load_notify_rx(&self, relative: &str) -> Result<RxConfig> {
        self.load_yaml(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_config(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_load_manage() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(
            tmp.path(),
            "manage.yaml",
            r#"
data: /var/lib/scout
monitors:
  - name: porch
    config: porch.yaml
  - name: garage
    config: garage.yaml
"#,
        );
        let loader = ConfigLoader::new(tmp.path());
        let manage = loader.load_manage().unwrap();
        assert_eq!(manage.data, PathBuf::from("/var/lib/scout"));
        assert_eq!(manage.monitors.len(), 2);
        assert_eq!(manage.monitors[0].name, "porch");
    }

    #[test]
    fn test_load_monitor_with_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(
            tmp.path(),
            "porch.yaml",
            r#"
url: rtsp://cam.local/stream
maxSourceFps: 20
maxOutputFps: 5
quality: 70
record: record.yaml
"#,
        );
        let loader = ConfigLoader::new(tmp.path());
        let monitor = loader.load_monitor("porch.yaml").unwrap();
        assert_eq!(monitor.url.as_deref(), Some("rtsp://cam.local/stream"));
        assert_eq!(monitor.max_source_fps, 20);
        assert_eq!(monitor.quality, 70);
        // 未写的键取默认值
        assert_eq!(monitor.stale_timeout, 20);
        assert_eq!(monitor.buffer_seconds, 0);
        assert_eq!(monitor.record.as_deref(), Some("record.yaml"));
        assert!(monitor.motion.is_none());
    }

    #[test]
    fn test_monitor_source_exclusive() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(
            tmp.path(),
            "bad.yaml",
            r#"
filename: clip.mp4
url: rtsp://cam.local/stream
"#,
        );
        let loader = ConfigLoader::new(tmp.path());
        assert!(loader.load_monitor("bad.yaml").is_err());
    }

    #[test]
    fn test_monitor_requires_source() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(tmp.path(), "none.yaml", "maxSourceFps: 10\n");
        let loader = ConfigLoader::new(tmp.path());
        assert!(loader.load_monitor("none.yaml").is_err());
    }

    #[test]
    fn test_load_record_and_alert() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(
            tmp.path(),
            "record.yaml",
            r#"
recordObjects: true
maxPreSec: 2
timeoutSec: 3
maxSec: 10
deleteAfterHours: 24
deleteAfterGB: 5
portableOnly: true
"#,
        );
        write_config(
            tmp.path(),
            "alert.yaml",
            r#"
intervalMinutes: 1
maxImagesPerInterval: 0
saveObjectsCount: 2
"#,
        );
        let loader = ConfigLoader::new(tmp.path());
        let record = loader.load_record("record.yaml").unwrap();
        assert!(record.record_objects);
        assert_eq!(record.max_pre_sec, 2);
        assert_eq!(record.codec, "mp4v");
        assert!(record.portable_only);

        let alert = loader.load_alert("alert.yaml").unwrap();
        assert_eq!(alert.interval_minutes, 1);
        // 显式写 0 不会被默认值覆盖
        assert_eq!(alert.max_images_per_interval, 0);
        assert_eq!(alert.save_objects_count, 2);
    }

    #[test]
    fn test_load_motion_and_object() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(
            tmp.path(),
            "motion.yaml",
            r#"
minPercentage: 5
thresholdPercent: 30
highlightColor: red
"#,
        );
        write_config(
            tmp.path(),
            "object.yaml",
            r#"
inferenceUrl: http://127.0.0.1:8500
allowedList: [person, car]
minMotionFrames: 3
"#,
        );
        let loader = ConfigLoader::new(tmp.path());
        let motion = loader.load_motion("motion.yaml").unwrap();
        assert_eq!(motion.min_percentage, 5);
        assert_eq!(motion.max_percentage, 75);
        assert_eq!(motion.highlight_color, "red");

        let object = loader.load_object("object.yaml").unwrap();
        assert_eq!(object.inference_url, "http://127.0.0.1:8500");
        assert_eq!(object.allowed_list, vec!["person", "car"]);
        assert_eq!(object.min_motion_frames, 3);
        assert_eq!(object.same_overlap_percentage, 85);
    }

    #[test]
    fn test_load_notify_configs() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(
            tmp.path(),
            "notify-sender.yaml",
            r#"
host: smtp.example.com
port: 465
user: scout@example.com
password: hunter2
"#,
        );
        write_config(
            tmp.path(),
            "rx.yaml",
            r#"
email:
  - ops@example.com
sms:
  verizon: ["5551112222"]
  att: ["5553334444"]
"#,
        );
        let loader = ConfigLoader::new(tmp.path());
        let sender = loader.load_notify_sender().unwrap();
        assert_eq!(sender.host, "smtp.example.com");
        assert_eq!(sender.port, 465);

        let rx = loader.load_notify_rx("rx.yaml").unwrap();
        assert_eq!(rx.email.len(), 1);
        assert_eq!(rx.phones().len(), 2);
    }

    #[test]
    fn test_missing_file_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::new(tmp.path());
        assert!(loader.load_manage().is_err());
    }
}
