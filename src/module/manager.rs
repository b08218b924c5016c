//! 模块管理器
//!
//! 整合注册表、依赖图和加载器，提供启动加载序列以及
//! 启用、禁用、删除、查询等存储管理接口。

use tracing::{info, instrument, warn};

use super::dependency::DependencyGraph;
use super::loader::ModuleLoader;
use super::metadata::InstalledModule;
use super::namespace::CompositionNamespace;
use super::registry::ModuleRegistry;
use super::runtime::EntryPoints;
use super::store::ModuleStore;
use crate::utils::{CoreError, Result};

/// 启用/禁用/删除操作的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// 状态已改变
    Changed,
    /// 已经处于目标状态
    Unchanged,
}

/// 模块管理器
///
/// 负责：
/// - 扫描模块存储
/// - 解析已启用模块的加载顺序
/// - 按序加载到组合命名空间
/// - 启用、禁用、删除模块
#[derive(Debug)]
pub struct ModuleManager {
    /// 模块注册表
    registry: ModuleRegistry,
    /// 模块加载器
    loader: ModuleLoader,
}

impl ModuleManager {
    /// 创建新的模块管理器
    pub fn new(store: ModuleStore, entry_points: EntryPoints) -> Self {
        Self {
            registry: ModuleRegistry::new(store),
            loader: ModuleLoader::new(entry_points),
        }
    }

    /// 模块注册表
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// 模块存储
    pub fn store(&self) -> &ModuleStore {
        self.registry.store()
    }

    /// 启动加载序列：扫描、解析顺序、按序加载
    ///
    /// 任一步失败即中止启动，命名空间不可再用。
    ///
    /// # Returns
    ///
    /// 已加载模块的逻辑名，按加载顺序
    #[instrument(skip(self, namespace))]
    pub async fn initialize(&self, namespace: &mut CompositionNamespace) -> Result<Vec<String>> {
        info!("初始化模块管理器");

        let ordered = self.resolve_enabled().await?;
        self.loader.load(&ordered, namespace)
    }

    /// 只解析加载顺序，不实例化
    pub async fn load_order(&self) -> Result<Vec<String>> {
        let ordered = self.resolve_enabled().await?;
        Ok(ordered.iter().map(|m| m.key().to_string()).collect())
    }

    async fn resolve_enabled(&self) -> Result<Vec<InstalledModule>> {
        self.registry.scan_strict().await?;
        let enabled = self.registry.enabled().await;

        let graph = DependencyGraph::from_modules(&enabled);
        let order = graph.topological_sort()?;
        info!(order = ?order, "加载顺序已解析");

        Ok(order
            .iter()
            .filter_map(|key| enabled.iter().find(|m| m.key() == key).cloned())
            .collect())
    }

    /// 重新扫描并列出所有已安装模块
    pub async fn list(&self) -> Result<Vec<InstalledModule>> {
        self.registry.scan().await?;
        Ok(self.registry.list().await)
    }

    /// 查询单个模块
    pub async fn info(&self, key: &str) -> Result<InstalledModule> {
        self.registry.scan().await?;
        self.registry.require(key).await
    }

    /// 依赖该模块的已安装模块（直接或间接）
    pub async fn dependents(&self, key: &str) -> Result<Vec<String>> {
        self.registry.scan().await?;
        let graph = DependencyGraph::from_modules(&self.registry.list().await);
        Ok(graph.get_all_dependents(key))
    }

    /// 启用模块
    pub async fn enable(&self, key: &str) -> Result<ToggleOutcome> {
        self.set_enabled(key, true).await
    }

    /// 禁用模块
    ///
    /// 仍有已启用模块依赖它时记录警告，下次启动会因未解析依赖而失败。
    pub async fn disable(&self, key: &str) -> Result<ToggleOutcome> {
        let outcome = self.set_enabled(key, false).await?;
        if outcome == ToggleOutcome::Changed {
            let enabled = self.registry.enabled().await;
            let dependents: Vec<&str> = enabled
                .iter()
                .filter(|m| m.descriptor.dependencies.iter().any(|d| d == key))
                .map(|m| m.key())
                .collect();
            if !dependents.is_empty() {
                warn!(module_id = %key, dependents = ?dependents, "已禁用的模块仍被其他模块依赖");
            }
        }
        Ok(outcome)
    }

    async fn set_enabled(&self, key: &str, enabled: bool) -> Result<ToggleOutcome> {
        let store = self.store();
        if !store.contains(key).await {
            return Err(CoreError::ModuleNotFound(key.to_string()));
        }

        if store.is_enabled(key).await? == enabled {
            info!(module_id = %key, enabled, "模块已处于目标状态");
            return Ok(ToggleOutcome::Unchanged);
        }

        store.set_enabled(key, enabled).await?;
        self.registry.scan().await?;
        info!(module_id = %key, enabled, "模块启用状态已更新");
        Ok(ToggleOutcome::Changed)
    }

    /// 删除模块
    ///
    /// 模块不存在时返回 `Unchanged`。
    pub async fn delete(&self, key: &str) -> Result<ToggleOutcome> {
        let dependents = self.dependents(key).await?;
        if !dependents.is_empty() {
            warn!(module_id = %key, dependents = ?dependents, "删除的模块仍被其他模块依赖");
        }

        let removed = self.store().remove(key).await?;
        self.registry.scan().await?;
        Ok(if removed {
            ToggleOutcome::Changed
        } else {
            ToggleOutcome::Unchanged
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::runtime::ModuleInstance;
    use std::any::Any;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Plain;

    impl ModuleInstance for Plain {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    async fn write_module(root: &Path, key: &str, name: &str, deps: &[&str]) {
        let dir = root.join(key);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let json = serde_json::json!({ "name": name, "version": "1.0", "dependencies": deps });
        tokio::fs::write(dir.join("module.json"), json.to_string())
            .await
            .unwrap();
    }

    fn entry_points(keys: &[&str]) -> EntryPoints {
        let mut entry_points = EntryPoints::new();
        for key in keys {
            entry_points.register(*key, |_ns, _logger| Ok(Arc::new(Plain) as Arc<dyn ModuleInstance>));
        }
        entry_points
    }

    #[tokio::test]
    async fn test_initialize_loads_in_dependency_order() {
        let dir = TempDir::new().unwrap();
        write_module(dir.path(), "m_c", "c", &["m_b"]).await;
        write_module(dir.path(), "m_a", "a", &[]).await;
        write_module(dir.path(), "m_b", "b", &["m_a"]).await;

        let manager = ModuleManager::new(
            ModuleStore::new(dir.path(), "m_"),
            entry_points(&["m_a", "m_b", "m_c"]),
        );
        let mut ns = CompositionNamespace::new();
        let loaded = manager.initialize(&mut ns).await.unwrap();

        assert_eq!(loaded, vec!["a", "b", "c"]);
        assert_eq!(manager.load_order().await.unwrap(), vec!["m_a", "m_b", "m_c"]);
    }

    #[tokio::test]
    async fn test_disabled_dependency_aborts_startup() {
        let dir = TempDir::new().unwrap();
        write_module(dir.path(), "m_a", "a", &[]).await;
        write_module(dir.path(), "m_b", "b", &["m_a"]).await;

        let manager = ModuleManager::new(
            ModuleStore::new(dir.path(), "m_"),
            entry_points(&["m_a", "m_b"]),
        );
        assert_eq!(manager.disable("m_a").await.unwrap(), ToggleOutcome::Changed);
        assert_eq!(manager.disable("m_a").await.unwrap(), ToggleOutcome::Unchanged);

        let mut ns = CompositionNamespace::new();
        let err = manager.initialize(&mut ns).await.unwrap_err();
        assert!(matches!(err, CoreError::UnresolvedDependency { ref dependency, .. } if dependency == "m_a"));
        assert!(ns.is_empty());

        assert_eq!(manager.enable("m_a").await.unwrap(), ToggleOutcome::Changed);
        assert_eq!(manager.initialize(&mut ns).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_disabled_module_never_loaded() {
        let dir = TempDir::new().unwrap();
        write_module(dir.path(), "m_a", "a", &[]).await;
        write_module(dir.path(), "m_off", "off", &[]).await;

        // m_off 没有入口点，但被禁用后不会被加载
        let manager = ModuleManager::new(ModuleStore::new(dir.path(), "m_"), entry_points(&["m_a"]));
        manager.disable("m_off").await.unwrap();

        let mut ns = CompositionNamespace::new();
        assert_eq!(manager.initialize(&mut ns).await.unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_delete_and_info() {
        let dir = TempDir::new().unwrap();
        write_module(dir.path(), "m_a", "a", &[]).await;
        write_module(dir.path(), "m_b", "b", &["m_a"]).await;

        let manager = ModuleManager::new(ModuleStore::new(dir.path(), "m_"), EntryPoints::new());
        assert_eq!(manager.info("m_a").await.unwrap().name(), "a");
        assert_eq!(manager.dependents("m_a").await.unwrap(), vec!["m_b"]);

        assert_eq!(manager.delete("m_a").await.unwrap(), ToggleOutcome::Changed);
        assert_eq!(manager.delete("m_a").await.unwrap(), ToggleOutcome::Unchanged);
        assert!(matches!(
            manager.info("m_a").await,
            Err(CoreError::ModuleNotFound(_))
        ));
        assert!(matches!(
            manager.enable("m_a").await,
            Err(CoreError::ModuleNotFound(_))
        ));
    }
}
