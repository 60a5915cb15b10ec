use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use tracing::{debug, error};

use crate::dir;

/// 目录清理：先删超龄，再按体积删最旧
///
/// 只作用于名字以 monitor 名开头的文件。
pub struct Pruner {
    dir: PathBuf,
    prefix: String,
    delete_after: Duration,
    max_bytes: u64,
}

impl Pruner {
    pub fn new(dir: PathBuf, prefix: String, delete_after_hours: u64, delete_after_gb: u64) -> Self {
        Self {
            dir,
            prefix,
            delete_after: Duration::from_secs(delete_after_hours * 3600),
            max_bytes: delete_after_gb * 1_000_000_000,
        }
    }

    pub async fn prune(&self) {
        if let Err(e) = self.delete_expired().await {
            error!(dir = %self.dir.display(), error = %e, "prune expired failed");
        }
        if let Err(e) = self.delete_while_oversize().await {
            error!(dir = %self.dir.display(), error = %e, "prune oversize failed");
        }
    }

    async fn delete_expired(&self) -> Result<()> {
        if self.delete_after.is_zero() {
            return Ok(());
        }
        let expired =
            dir::expired(&self.dir, &self.prefix, SystemTime::now(), self.delete_after).await?;
        for file in expired {
            debug!(path = %file.path.display(), "deleting expired file");
            if let Err(e) = tokio::fs::remove_file(&file.path).await {
                error!(path = %file.path.display(), error = %e, "delete failed");
            }
        }
        Ok(())
    }

    async fn delete_while_oversize(&self) -> Result<()> {
        if self.max_bytes == 0 {
            return Ok(());
        }
        let mut files = dir::list(&self.dir, &self.prefix).await?;
        let mut total: u64 = files.iter().map(|f| f.size).sum();
        if total <= self.max_bytes {
            return Ok(());
        }
        files.sort_by_key(|f| f.modified);
        for file in files {
            if total <= self.max_bytes {
                break;
            }
            total = total.saturating_sub(file.size);
            debug!(path = %file.path.display(), "deleting oldest file over size bound");
            if let Err(e) = tokio::fs::remove_file(&file.path).await {
                error!(path = %file.path.display(), error = %e, "delete failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn test_prune_by_size_removes_oldest_first() {
        let tmp = tempfile::tempdir().unwrap();
        let old = tmp.path().join("cam_old");
        let new = tmp.path().join("cam_new");
        tokio::fs::write(&old, vec![0u8; 600]).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        tokio::fs::write(&new, vec![0u8; 600]).await.unwrap();

        // 上限 1 GB 换算成字节太大，直接构造一个小上限
        let pruner = Pruner {
            dir: tmp.path().to_path_buf(),
            prefix: "cam".to_string(),
            delete_after: Duration::ZERO,
            max_bytes: 700,
        };
        pruner.prune().await;

        assert!(!old.exists());
        assert!(new.exists());
    }

    #[tokio::test]
    async fn test_prune_scopes_by_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        let other = tmp.path().join("other_file");
        tokio::fs::write(&other, vec![0u8; 2000]).await.unwrap();

        let pruner = Pruner {
            dir: tmp.path().to_path_buf(),
            prefix: "cam".to_string(),
            delete_after: Duration::ZERO,
            max_bytes: 100,
        };
        pruner.prune().await;
        // 别的 monitor 的文件不受影响
        assert!(other.exists());
    }

    #[tokio::test]
    async fn test_zero_bounds_disable_pruning() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("cam_keep");
        tokio::fs::write(&file, vec![0u8; 2000]).await.unwrap();

        let pruner = Pruner::new(tmp.path().to_path_buf(), "cam".to_string(), 0, 0);
        pruner.prune().await;
        assert!(file.exists());
    }
}
