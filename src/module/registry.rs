//! 模块注册表
//!
//! 扫描模块存储得到的已安装模块视图，按发现顺序保存，提供查询功能。

use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::module::metadata::InstalledModule;
use crate::module::parser::ModuleParser;
use crate::module::store::ModuleStore;
use crate::utils::{CoreError, Result};

/// 模块注册表
///
/// 保存最近一次扫描的结果：
/// - 已安装模块（启用和禁用的都在）
/// - 发现顺序（存储目录名排序），依赖图以此作为稳定次序
#[derive(Debug, Clone)]
pub struct ModuleRegistry {
    /// 已安装模块，按发现顺序
    modules: Arc<RwLock<Vec<InstalledModule>>>,

    /// 模块存储
    store: ModuleStore,
}

impl ModuleRegistry {
    /// 创建新的模块注册表
    ///
    /// # Arguments
    ///
    /// * `store` - 模块存储
    pub fn new(store: ModuleStore) -> Self {
        Self {
            modules: Arc::new(RwLock::new(Vec::new())),
            store,
        }
    }

    /// 模块存储
    pub fn store(&self) -> &ModuleStore {
        &self.store
    }

    /// 扫描模块存储，替换当前视图
    ///
    /// # Returns
    ///
    /// 成功解析的模块包键，按发现顺序
    ///
    /// # Notes
    ///
    /// - 只处理以前缀开头的目录
    /// - 跳过没有描述文件或描述无效的目录（记录警告日志）
    pub async fn scan(&self) -> Result<Vec<String>> {
        self.scan_with(false).await
    }

    /// 严格扫描，用于启动
    ///
    /// 与 [`scan`](Self::scan) 相同，但已启用模块的描述无法读取时直接失败，
    /// 不会在缺少该模块的情况下继续启动。已禁用的模块不会被加载，
    /// 其描述无效时仍只记录警告。
    ///
    /// # Errors
    ///
    /// 已启用模块描述无效时返回 `InvalidMetadata`，消息中带有包键和原因
    pub async fn scan_strict(&self) -> Result<Vec<String>> {
        self.scan_with(true).await
    }

    async fn scan_with(&self, strict: bool) -> Result<Vec<String>> {
        let mut scanned = Vec::new();

        for key in self.store.list_keys().await? {
            let path = self.store.module_path(&key);
            match self.read_module(&key, &path).await {
                Ok(module) => {
                    tracing::debug!(
                        module_id = %key,
                        name = %module.descriptor.name,
                        version = %module.descriptor.version,
                        enabled = module.enabled,
                        "发现模块"
                    );
                    scanned.push(module);
                }
                Err(e) => {
                    if strict && self.store.is_enabled(&key).await? {
                        tracing::error!(module_id = %key, error = %e, "已启用模块的描述无效");
                        return Err(CoreError::InvalidMetadata(format!(
                            "模块 '{}' 无法读取: {}",
                            key, e
                        )));
                    }
                    tracing::warn!(module_id = %key, error = %e, "模块描述无效，跳过");
                }
            }
        }

        let keys: Vec<String> = scanned.iter().map(|m| m.key().to_string()).collect();
        *self.modules.write().await = scanned;

        tracing::info!(count = keys.len(), "模块扫描完成");
        Ok(keys)
    }

    async fn read_module(&self, key: &str, path: &Path) -> Result<InstalledModule> {
        let descriptor = ModuleParser::parse_dir(path).await?;
        let enabled = self.store.is_enabled(key).await?;
        Ok(InstalledModule {
            descriptor,
            enabled,
            path: path.to_path_buf(),
        })
    }

    /// 获取模块信息
    pub async fn get(&self, key: &str) -> Option<InstalledModule> {
        let modules = self.modules.read().await;
        modules.iter().find(|m| m.key() == key).cloned()
    }

    /// 获取模块信息，不存在时返回 `ModuleNotFound`
    pub async fn require(&self, key: &str) -> Result<InstalledModule> {
        self.get(key)
            .await
            .ok_or_else(|| CoreError::ModuleNotFound(key.to_string()))
    }

    /// 获取所有已安装模块，按发现顺序
    pub async fn list(&self) -> Vec<InstalledModule> {
        self.modules.read().await.clone()
    }

    /// 获取已启用模块，按发现顺序
    pub async fn enabled(&self) -> Vec<InstalledModule> {
        let modules = self.modules.read().await;
        modules.iter().filter(|m| m.enabled).cloned().collect()
    }

    /// 检查模块是否存在
    pub async fn exists(&self, key: &str) -> bool {
        let modules = self.modules.read().await;
        modules.iter().any(|m| m.key() == key)
    }

    /// 获取已安装模块数量
    pub async fn count(&self) -> usize {
        self.modules.read().await.len()
    }
}
