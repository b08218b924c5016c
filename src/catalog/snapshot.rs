//! 本地注册表快照持久化
//!
//! module.json 保存远程源列表和最近一次合并得到的目录。

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::models::RegistrySnapshot;
use crate::utils::Result;

/// 快照文件存储
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// 创建存储
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取快照，文件不存在时写入 `{"origins": []}` 并返回空快照
    pub async fn load(&self) -> Result<RegistrySnapshot> {
        if !tokio::fs::try_exists(&self.path).await? {
            debug!(path = %self.path.display(), "注册表快照不存在，创建空快照");
            tokio::fs::write(&self.path, r#"{"origins": []}"#).await?;
            return Ok(RegistrySnapshot::default());
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// 整体写入快照
    pub async fn save(&self, snapshot: &RegistrySnapshot) -> Result<()> {
        let content = serde_json::to_string_pretty(snapshot)?;
        tokio::fs::write(&self.path, content).await?;
        debug!(path = %self.path.display(), modules = snapshot.modules.len(), "注册表快照已保存");
        Ok(())
    }

    /// 远程源列表
    pub async fn origins(&self) -> Result<Vec<String>> {
        Ok(self.load().await?.origins)
    }

    /// 添加远程源
    ///
    /// # Returns
    ///
    /// 新增时返回 true，已存在时返回 false
    pub async fn add_origin(&self, url: &str) -> Result<bool> {
        let mut snapshot = self.load().await?;
        if snapshot.origins.iter().any(|o| o == url) {
            return Ok(false);
        }
        snapshot.origins.push(url.to_string());
        self.save(&snapshot).await?;
        info!(origin = %url, "远程源已添加");
        Ok(true)
    }

    /// 删除远程源
    ///
    /// # Returns
    ///
    /// 存在并删除时返回 true
    pub async fn remove_origin(&self, url: &str) -> Result<bool> {
        let mut snapshot = self.load().await?;
        let before = snapshot.origins.len();
        snapshot.origins.retain(|o| o != url);
        if snapshot.origins.len() == before {
            return Ok(false);
        }
        self.save(&snapshot).await?;
        info!(origin = %url, "远程源已删除");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_creates_empty_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("module.json"));

        let snapshot = store.load().await.unwrap();
        assert!(snapshot.origins.is_empty());
        let raw = tokio::fs::read_to_string(store.path()).await.unwrap();
        assert_eq!(raw, r#"{"origins": []}"#);
    }

    #[tokio::test]
    async fn test_origins_dedup_and_order() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("module.json"));

        assert!(store.add_origin("https://b.example/map.json").await.unwrap());
        assert!(store.add_origin("https://a.example/map.json").await.unwrap());
        assert!(!store.add_origin("https://b.example/map.json").await.unwrap());

        assert_eq!(
            store.origins().await.unwrap(),
            vec!["https://b.example/map.json", "https://a.example/map.json"]
        );

        assert!(store.remove_origin("https://b.example/map.json").await.unwrap());
        assert!(!store.remove_origin("https://b.example/map.json").await.unwrap());
        assert_eq!(store.origins().await.unwrap(), vec!["https://a.example/map.json"]);
    }
}
