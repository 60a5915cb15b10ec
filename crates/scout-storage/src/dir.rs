use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::Result;

/// 目录扫描条目
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

/// 列出名字以 prefix 开头的文件（租户隔离：prefix 即 monitor 名）
pub async fn list(dir: &Path, prefix: &str) -> Result<Vec<FileEntry>> {
    let mut result = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return Ok(result),
    };
    while let Some(entry) = entries.next_entry().await? {
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if prefix.is_empty() || name.starts_with(prefix) {
            result.push(FileEntry {
                path: entry.path(),
                size: meta.len(),
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
    }
    Ok(result)
}

/// prefix 范围内文件的总字节数
pub async fn size_of(dir: &Path, prefix: &str) -> Result<u64> {
    Ok(list(dir, prefix).await?.iter().map(|f| f.size).sum())
}

/// mtime 早于 now - max_age 的文件
pub async fn expired(
    dir: &Path,
    prefix: &str,
    now: SystemTime,
    max_age: Duration,
) -> Result<Vec<FileEntry>> {
    let files = list(dir, prefix).await?;
    Ok(files
        .into_iter()
        .filter(|f| match now.duration_since(f.modified) {
            Ok(age) => age > max_age,
            Err(_) => false,
        })
        .collect())
}

pub fn bytes_to_gb(bytes: u64) -> f64 {
    bytes as f64 / 1000.0 / 1000.0 / 1000.0
}
