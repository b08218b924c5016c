//! 模块加载器
//!
//! 按解析好的顺序把模块实例化进组合命名空间。

use tracing::{debug, error, info};

use super::metadata::InstalledModule;
use super::namespace::CompositionNamespace;
use super::runtime::EntryPoints;
use crate::utils::{CoreError, ModuleLogger, Result};

/// 模块加载器
///
/// 持有入口点注册表，负责单个模块的构造、名称检查、安装钩子和注册。
#[derive(Debug, Default)]
pub struct ModuleLoader {
    /// 入口点注册表
    entry_points: EntryPoints,
}

impl ModuleLoader {
    /// 创建新的模块加载器
    pub fn new(entry_points: EntryPoints) -> Self {
        debug!(entry_points = entry_points.len(), "创建模块加载器");
        Self { entry_points }
    }

    /// 入口点注册表
    pub fn entry_points(&self) -> &EntryPoints {
        &self.entry_points
    }

    /// 按顺序加载模块
    ///
    /// 任一模块失败即中止。失败前已注册的模块留在命名空间中，
    /// 调用方应视整个命名空间为不可用。
    ///
    /// # Arguments
    ///
    /// * `ordered` - 已按依赖关系排好序的已启用模块
    /// * `namespace` - 组合命名空间
    ///
    /// # Returns
    ///
    /// 成功加载的模块逻辑名，按加载顺序
    pub fn load(
        &self,
        ordered: &[InstalledModule],
        namespace: &mut CompositionNamespace,
    ) -> Result<Vec<String>> {
        let mut loaded = Vec::with_capacity(ordered.len());

        for module in ordered {
            if let Err(e) = self.load_one(module, namespace) {
                error!(
                    module_id = %module.key(),
                    error_code = e.error_code(),
                    error = %e,
                    "模块加载失败，中止加载"
                );
                return Err(e);
            }
            loaded.push(module.name().to_string());
        }

        info!(count = loaded.len(), "模块加载完成");
        Ok(loaded)
    }

    /// 加载单个模块
    ///
    /// # 加载流程
    /// 1. 检查必需依赖已在命名空间中
    /// 2. 查找入口点
    /// 3. 以命名空间和模块日志句柄构造实例
    /// 4. 检查逻辑名未被占用
    /// 5. 调用安装钩子（恰好一次）
    /// 6. 注册实例
    pub fn load_one(
        &self,
        module: &InstalledModule,
        namespace: &mut CompositionNamespace,
    ) -> Result<()> {
        let key = module.key();
        let name = module.name();
        info!(module_id = %key, module = %name, "加载模块 {} -> {}", key, name);

        if let Some(dep) = module
            .descriptor
            .dependencies
            .iter()
            .find(|dep| !namespace.has_package(dep))
        {
            return Err(CoreError::UnresolvedDependency {
                module: key.to_string(),
                dependency: dep.clone(),
            });
        }

        let factory = self
            .entry_points
            .get(key)
            .ok_or_else(|| CoreError::MissingEntryPoint(key.to_string()))?;

        let instance = factory(&*namespace, ModuleLogger::new(name))?;

        if namespace.contains(name) {
            return Err(CoreError::DuplicateModuleName {
                name: name.to_string(),
                package: key.to_string(),
            });
        }

        instance.install(namespace)?;
        namespace.register(module.descriptor.clone(), instance)?;

        debug!(module_id = %key, "模块已注册到命名空间");
        Ok(())
    }
}
