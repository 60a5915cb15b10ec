use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Local, Timelike};
use regex::Regex;

/// 文件名里的时间戳，字典序即时间序
static TIMESTAMP_RE: OnceLock<Regex> = OnceLock::new();

pub fn timestamp_regex() -> &'static Regex {
    TIMESTAMP_RE.get_or_init(|| {
        Regex::new("[0-9]{4}_[0-9]{2}_[0-9]{2}_[0-9]{2}_[0-9]{2}_[0-9]{2}_[0-9]+")
            .expect("timestamp regex is valid")
    })
}

/// `<dir>/<name>_YYYY_MM_DD_HH_MM_SS_nanos[_Title][_Percent]`
pub fn base_filename(
    t: DateTime<Local>,
    dir: &Path,
    name: &str,
    title: &str,
    percentage: &str,
) -> PathBuf {
    let mut filename = format!(
        "{}_{:04}_{:02}_{:02}_{:02}_{:02}_{:02}_{:09}",
        name,
        t.year(),
        t.month(),
        t.day(),
        t.hour(),
        t.minute(),
        t.second(),
        t.nanosecond()
    );
    if !title.is_empty() {
        filename.push('_');
        filename.push_str(title);
    }
    if !percentage.is_empty() {
        filename.push('_');
        filename.push_str(percentage);
    }
    dir.join(filename)
}

/// 视频文件名，portable 为缩放版
pub fn video_filename(
    t: DateTime<Local>,
    dir: &Path,
    name: &str,
    file_type: &str,
    portable: bool,
) -> PathBuf {
    let title = if portable { "Portable" } else { "Full" };
    let mut path = base_filename(t, dir, name, title, "");
    path.set_extension(file_type.to_ascii_lowercase());
    path
}

/// 图片文件名（.jpg）
pub fn image_filename(
    t: DateTime<Local>,
    dir: &Path,
    name: &str,
    title: &str,
    percentage: &str,
) -> PathBuf {
    let path = base_filename(t, dir, name, title, percentage);
    // set_extension 会把 `_85` 之类的尾巴当扩展名换掉，直接拼接
    PathBuf::from(format!("{}.jpg", path.to_string_lossy()))
}

/// 按文件名中的时间戳排序
pub fn sort_by_timestamp_name(names: &mut [String], ascending: bool) {
    let re = timestamp_regex();
    names.sort_by(|a, b| {
        let ta = re.find(a).map(|m| m.as_str()).unwrap_or("");
        let tb = re.find(b).map(|m| m.as_str()).unwrap_or("");
        if ascending {
            ta.cmp(tb)
        } else {
            tb.cmp(ta)
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 9, 14, 5, 9).unwrap()
    }

    #[test]
    fn test_base_filename_format() {
        let path = base_filename(sample_time(), Path::new("/data/alerts"), "porch", "Original", "");
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("porch_2025_03_09_14_05_09_"));
        assert!(name.ends_with("_Original"));
        assert!(timestamp_regex().is_match(&name));
    }

    #[test]
    fn test_image_filename_keeps_percentage() {
        let path = image_filename(sample_time(), Path::new("/data/alerts"), "porch", "Person", "85");
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with("_Person_85.jpg"));
    }

    #[test]
    fn test_video_filename_variants() {
        let full = video_filename(sample_time(), Path::new("/data/recordings"), "porch", "MP4", false);
        assert!(full.to_string_lossy().ends_with("_Full.mp4"));
        let portable = video_filename(sample_time(), Path::new("/data/recordings"), "porch", "mp4", true);
        assert!(portable.to_string_lossy().ends_with("_Portable.mp4"));
    }

    #[test]
    fn test_sort_by_timestamp_name() {
        let mut names = vec![
            "porch_2025_03_09_14_05_09_000000002_Full.mp4".to_string(),
            "porch_2025_03_09_14_05_08_000000001_Full.mp4".to_string(),
            "porch_2025_03_10_01_00_00_000000000_Full.mp4".to_string(),
        ];
        sort_by_timestamp_name(&mut names, true);
        assert!(names[0].contains("14_05_08"));
        assert!(names[2].contains("03_10"));

        sort_by_timestamp_name(&mut names, false);
        assert!(names[0].contains("03_10"));
    }
}
