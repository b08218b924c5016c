//! 源目录合并
//!
//! 依次获取每个远程源的目录文档，合并成以 `模块名@提供方` 为键的统一目录，
//! 成功后整体覆盖本地快照。任一源失败时整个刷新失败，快照保持不变。

use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::models::{CatalogKey, OriginDocument, RegistrySnapshot};
use super::snapshot::SnapshotStore;
use super::transport::Transport;
use crate::utils::Result;

/// 源目录合并器
pub struct CatalogMerger {
    transport: Arc<dyn Transport>,
    snapshots: SnapshotStore,
}

impl CatalogMerger {
    /// 创建合并器
    pub fn new(transport: Arc<dyn Transport>, snapshots: SnapshotStore) -> Self {
        Self {
            transport,
            snapshots,
        }
    }

    /// 快照存储
    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// 传输
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// 合并目录文档
    ///
    /// 源列表原样保留。同名提供方或同一键出现多次时，后面的源覆盖前面的。
    pub fn merge(origins: Vec<String>, documents: Vec<OriginDocument>) -> RegistrySnapshot {
        let mut snapshot = RegistrySnapshot {
            origins,
            ..Default::default()
        };

        for document in documents {
            if let Some(previous) = snapshot
                .providers
                .insert(document.name.clone(), document.base.clone())
            {
                if previous != document.base {
                    warn!(provider = %document.name, "多个源声明了同名提供方，使用后者");
                }
            }

            for (module_name, entry) in document.modules {
                let key = CatalogKey::new(module_name, document.name.as_str());
                snapshot.modules.insert(key.to_string(), entry);
            }
        }

        snapshot
    }

    /// 刷新源目录
    ///
    /// # Errors
    ///
    /// 任一源获取或解析失败时返回 `TransportFailure`，本地快照不被修改
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<RegistrySnapshot> {
        let current = self.snapshots.load().await?;

        let mut documents = Vec::with_capacity(current.origins.len());
        for origin in &current.origins {
            info!(origin = %origin, "获取源目录");
            let document = self.transport.fetch_catalog(origin).await.map_err(|e| {
                warn!(origin = %origin, error = %e, "源目录获取失败，刷新中止");
                e
            })?;
            documents.push(document);
        }

        let snapshot = Self::merge(current.origins, documents);
        self.snapshots.save(&snapshot).await?;

        info!(
            providers = snapshot.providers.len(),
            modules = snapshot.modules.len(),
            "源目录已刷新"
        );
        Ok(snapshot)
    }
}
