//! 源发布
//!
//! 把本地存储中已启用的模块打包成一个可发布的远程源：
//! 每个模块一个 `<包键>.zip`，外加描述全部模块的 `map.json`。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::archive;
use crate::catalog::{CatalogModule, OriginDocument};
use crate::core::config::OriginMakerConfig;
use crate::module::{ModuleRegistry, ModuleStore};
use crate::utils::Result;

/// 目录文档文件名
pub const MAP_FILE: &str = "map.json";

/// 源的身份信息（origin-maker-config.json）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginIdentity {
    /// 提供方名称
    pub name: String,
    /// 下载基础地址
    pub base: String,
}

/// 源发布器
#[derive(Debug, Clone)]
pub struct OriginMaker {
    store: ModuleStore,
    config: OriginMakerConfig,
}

impl OriginMaker {
    pub fn new(store: ModuleStore, config: OriginMakerConfig) -> Self {
        Self { store, config }
    }

    /// 发布输出目录
    pub fn release_dir(&self) -> &Path {
        &self.config.release_dir
    }

    /// 读取源身份，文件不存在时返回 None
    pub async fn load_identity(&self) -> Result<Option<OriginIdentity>> {
        match tokio::fs::read_to_string(&self.config.config_file).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 写入源身份
    pub async fn save_identity(&self, identity: &OriginIdentity) -> Result<()> {
        let content = serde_json::to_string_pretty(identity)?;
        tokio::fs::write(&self.config.config_file, content).await?;
        Ok(())
    }

    /// 生成发布目录
    ///
    /// 输出目录会被清空重建。
    ///
    /// # Returns
    ///
    /// 写入 `map.json` 的目录文档
    pub async fn make(&self, identity: OriginIdentity) -> Result<OriginDocument> {
        let release = self.config.release_dir.clone();
        if tokio::fs::try_exists(&release).await? {
            tokio::fs::remove_dir_all(&release).await?;
        }
        tokio::fs::create_dir_all(&release).await?;

        let registry = ModuleRegistry::new(self.store.clone());
        registry.scan().await?;

        let mut modules: BTreeMap<String, CatalogModule> = BTreeMap::new();
        for module in registry.enabled().await {
            let key = module.key().to_string();
            if modules.contains_key(&module.descriptor.name) {
                warn!(module_id = %key, name = %module.descriptor.name, "逻辑名重复，跳过");
                continue;
            }
            let file_name = format!("{}.zip", key);
            info!(module_id = %key, "打包模块");

            archive::pack_dir_async(module.path.clone(), release.join(&file_name), key.clone())
                .await?;

            let descriptor = module.descriptor;
            let entry = CatalogModule {
                version: descriptor.version,
                author: descriptor.author,
                description: descriptor.description,
                dependencies: descriptor.dependencies,
                optional_dependencies: descriptor.optional_dependencies,
                path: format!("/{}", file_name),
            };
            modules.insert(descriptor.name, entry);
        }

        let document = OriginDocument {
            name: identity.name,
            base: identity.base,
            modules,
        };
        let map_path: PathBuf = release.join(MAP_FILE);
        tokio::fs::write(&map_path, serde_json::to_string_pretty(&document)?).await?;

        info!(
            path = %release.display(),
            modules = document.modules.len(),
            "源发布目录已生成"
        );
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn write_module(store: &ModuleStore, key: &str, yaml: &str) {
        let dir = store.module_path(key);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("module.yaml"), yaml).await.unwrap();
    }

    #[tokio::test]
    async fn test_make_release() {
        let dir = TempDir::new().unwrap();
        let store = ModuleStore::new(dir.path().join("modules"), "m_");
        write_module(&store, "m_http", "name: http\nversion: '1.2'\ndependencies: [m_log]\n").await;
        write_module(&store, "m_log", "name: log\nversion: '0.1'\n").await;
        write_module(&store, "m_off", "name: off\nversion: '1.0'\n").await;
        store.set_enabled("m_off", false).await.unwrap();

        let config = OriginMakerConfig {
            config_file: dir.path().join("origin-maker-config.json"),
            release_dir: dir.path().join("origin-release"),
        };
        let maker = OriginMaker::new(store, config);

        assert!(maker.load_identity().await.unwrap().is_none());
        let identity = OriginIdentity {
            name: "main".to_string(),
            base: "https://example.com/mods".to_string(),
        };
        maker.save_identity(&identity).await.unwrap();
        assert_eq!(maker.load_identity().await.unwrap(), Some(identity.clone()));

        let document = maker.make(identity).await.unwrap();

        let names: Vec<&String> = document.modules.keys().collect();
        assert_eq!(names, vec!["http", "log"]);
        assert_eq!(document.modules["http"].path, "/m_http.zip");
        assert_eq!(document.modules["http"].dependencies, vec!["m_log"]);

        let release = maker.release_dir();
        assert!(release.join("m_http.zip").is_file());
        assert!(!release.join("m_off.zip").exists());

        let written: OriginDocument =
            serde_json::from_str(&std::fs::read_to_string(release.join(MAP_FILE)).unwrap()).unwrap();
        assert_eq!(written, document);
    }
}
