//! 模块存储
//!
//! 本地模块存储目录的唯一访问入口：列出模块目录、读写启用标志、
//! 创建安装用的临时目录，以及把新版本提交进存储。
//!
//! 存储根目录下，以前缀（默认 `m_`）开头的目录是模块包；以 `.` 开头的条目
//! （例如安装临时目录）一律忽略。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::core::config::StoreConfig;
use crate::utils::{CoreError, Result};

/// 启用标志文件名
pub const STATE_FILE: &str = ".module-state.json";

/// 安装临时目录名前缀
pub const SCRATCH_PREFIX: &str = ".install-";

#[derive(Debug, Serialize, Deserialize)]
struct ModuleState {
    enabled: bool,
}

/// 模块存储
#[derive(Debug, Clone)]
pub struct ModuleStore {
    root: PathBuf,
    prefix: String,
}

impl ModuleStore {
    /// 创建存储
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
        }
    }

    /// 由配置创建存储
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.root.clone(), config.prefix.clone())
    }

    /// 存储根目录
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 模块目录名前缀
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// 确保存储根目录存在
    pub async fn ensure(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// 补全前缀得到包键
    pub fn normalize_key(&self, name: &str) -> String {
        if name.starts_with(&self.prefix) {
            name.to_string()
        } else {
            format!("{}{}", self.prefix, name)
        }
    }

    /// 去掉包键的前缀
    pub fn strip_prefix<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(self.prefix.as_str()).unwrap_or(key)
    }

    /// 模块目录路径
    pub fn module_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// 存储中是否存在该模块（无论是否启用）
    pub async fn contains(&self, key: &str) -> bool {
        tokio::fs::metadata(self.module_path(key))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// 列出所有模块包键，按名称排序
    ///
    /// 存储根目录不存在时返回空列表。
    pub async fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(root = %self.root.display(), "模块存储目录不存在");
                return Ok(keys);
            }
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !name.starts_with(&self.prefix) {
                continue;
            }
            if entry.file_type().await?.is_dir() {
                keys.push(name);
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// 读取启用标志，状态文件不存在时视为启用
    pub async fn is_enabled(&self, key: &str) -> Result<bool> {
        let state_path = self.module_path(key).join(STATE_FILE);
        match tokio::fs::read_to_string(&state_path).await {
            Ok(content) => {
                let state: ModuleState = serde_json::from_str(&content)?;
                Ok(state.enabled)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    /// 写入启用标志
    ///
    /// # Errors
    ///
    /// 模块不存在时返回 `ModuleNotFound`
    pub async fn set_enabled(&self, key: &str, enabled: bool) -> Result<()> {
        if !self.contains(key).await {
            return Err(CoreError::ModuleNotFound(key.to_string()));
        }

        let state_path = self.module_path(key).join(STATE_FILE);
        if enabled {
            match tokio::fs::remove_file(&state_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        } else {
            let content = serde_json::to_string(&ModuleState { enabled })?;
            tokio::fs::write(&state_path, content).await?;
        }

        debug!(module_id = %key, enabled, "启用标志已更新");
        Ok(())
    }

    /// 删除模块目录
    ///
    /// # Returns
    ///
    /// 模块存在并被删除时返回 true
    pub async fn remove(&self, key: &str) -> Result<bool> {
        if !self.contains(key).await {
            return Ok(false);
        }
        tokio::fs::remove_dir_all(self.module_path(key)).await?;
        info!(module_id = %key, "模块已删除");
        Ok(true)
    }

    /// 在存储根目录内创建安装临时目录
    ///
    /// 与存储位于同一文件系统，提交时可以直接重命名。丢弃时自动删除。
    pub async fn scratch(&self) -> Result<TempDir> {
        self.ensure().await?;
        let root = self.root.clone();
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(SCRATCH_PREFIX)
                .tempdir_in(root)
        })
        .await
        .map_err(|e| CoreError::Internal(format!("创建临时目录任务失败: {}", e)))??;
        Ok(dir)
    }

    /// 把暂存目录提交为存储中的模块
    ///
    /// 已有同名模块时先把旧版本移入 `scratch`，再把新目录重命名进存储；
    /// 重命名失败时把旧版本移回原处。
    ///
    /// # Arguments
    ///
    /// * `staged` - 已解压、已规范命名的模块目录（须位于存储同一文件系统）
    /// * `key` - 目标包键
    /// * `scratch` - 本次安装的临时目录
    pub async fn commit(&self, staged: &Path, key: &str, scratch: &Path) -> Result<()> {
        let target = self.module_path(key);
        let backup = scratch.join(format!("previous-{}", key));

        let had_previous = self.contains(key).await;
        if had_previous {
            tokio::fs::rename(&target, &backup).await?;
            debug!(module_id = %key, "旧版本已移入临时目录");
        }

        if let Err(e) = tokio::fs::rename(staged, &target).await {
            if had_previous {
                if let Err(restore) = tokio::fs::rename(&backup, &target).await {
                    warn!(module_id = %key, error = %restore, "恢复旧版本失败");
                }
            }
            return Err(e.into());
        }

        info!(module_id = %key, replaced = had_previous, "模块已提交到存储");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with(keys: &[&str]) -> (TempDir, ModuleStore) {
        let dir = TempDir::new().unwrap();
        let store = ModuleStore::new(dir.path(), "m_");
        for key in keys {
            tokio::fs::create_dir_all(store.module_path(key)).await.unwrap();
        }
        (dir, store)
    }

    #[tokio::test]
    async fn test_list_keys_filters_and_sorts() {
        let (dir, store) = store_with(&["m_c", "m_a", "other", ".install-x", "m_b"]).await;
        tokio::fs::write(dir.path().join("m_file"), "x").await.unwrap();

        assert_eq!(store.list_keys().await.unwrap(), vec!["m_a", "m_b", "m_c"]);
    }

    #[tokio::test]
    async fn test_list_keys_missing_root() {
        let dir = TempDir::new().unwrap();
        let store = ModuleStore::new(dir.path().join("absent"), "m_");
        assert!(store.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enabled_flag() {
        let (_dir, store) = store_with(&["m_a"]).await;

        assert!(store.is_enabled("m_a").await.unwrap());
        store.set_enabled("m_a", false).await.unwrap();
        assert!(!store.is_enabled("m_a").await.unwrap());
        store.set_enabled("m_a", false).await.unwrap();
        assert!(!store.is_enabled("m_a").await.unwrap());
        store.set_enabled("m_a", true).await.unwrap();
        assert!(store.is_enabled("m_a").await.unwrap());

        assert!(matches!(
            store.set_enabled("m_missing", true).await,
            Err(CoreError::ModuleNotFound(_))
        ));
    }

    #[test]
    fn test_prefix_helpers() {
        let store = ModuleStore::new("/tmp", "m_");
        assert_eq!(store.normalize_key("http"), "m_http");
        assert_eq!(store.normalize_key("m_http"), "m_http");
        assert_eq!(store.strip_prefix("m_http"), "http");
        assert_eq!(store.strip_prefix("http"), "http");
    }

    #[tokio::test]
    async fn test_commit_replaces_previous() {
        let (_dir, store) = store_with(&["m_a"]).await;
        tokio::fs::write(store.module_path("m_a").join("old.txt"), "old").await.unwrap();

        let scratch = store.scratch().await.unwrap();
        let staged = scratch.path().join("m_a");
        tokio::fs::create_dir(&staged).await.unwrap();
        tokio::fs::write(staged.join("new.txt"), "new").await.unwrap();

        store.commit(&staged, "m_a", scratch.path()).await.unwrap();

        assert!(store.module_path("m_a").join("new.txt").exists());
        assert!(!store.module_path("m_a").join("old.txt").exists());

        let scratch_path = scratch.path().to_path_buf();
        drop(scratch);
        assert!(!scratch_path.exists());
        assert_eq!(store.list_keys().await.unwrap(), vec!["m_a"]);
    }

    #[tokio::test]
    async fn test_commit_failure_restores_previous() {
        let (_dir, store) = store_with(&["m_a"]).await;
        tokio::fs::write(store.module_path("m_a").join("old.txt"), "old").await.unwrap();

        let scratch = store.scratch().await.unwrap();
        let missing = scratch.path().join("does-not-exist");

        assert!(store.commit(&missing, "m_a", scratch.path()).await.is_err());
        assert!(store.module_path("m_a").join("old.txt").exists());
    }

    #[tokio::test]
    async fn test_remove() {
        let (_dir, store) = store_with(&["m_a"]).await;
        assert!(store.remove("m_a").await.unwrap());
        assert!(!store.remove("m_a").await.unwrap());
        assert!(!store.contains("m_a").await);
    }
}
