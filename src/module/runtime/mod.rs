//! 模块入口点
//!
//! 每个模块通过一个 "Main" 工厂构造：工厂接收当前组合命名空间和模块日志句柄，
//! 返回模块实例。工厂按包键登记在 [`EntryPoints`] 中，加载器只从这里查找。

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::module::namespace::CompositionNamespace;
use crate::utils::{ModuleLogger, Result};

/// 模块实例
///
/// 构造完成后注册进组合命名空间，可以通过 [`CompositionNamespace::instance`] 按具体类型取回。
pub trait ModuleInstance: Send + Sync + 'static {
    /// 用于向下转型
    fn as_any(&self) -> &dyn Any;

    /// 安装钩子
    ///
    /// 注册前调用一次，可以扩展、包装或整体替换命名空间。
    fn install(&self, _namespace: &mut CompositionNamespace) -> Result<()> {
        Ok(())
    }
}

/// "Main" 工厂
pub type ModuleFactory = Box<
    dyn Fn(&CompositionNamespace, ModuleLogger) -> Result<Arc<dyn ModuleInstance>> + Send + Sync,
>;

/// 入口点注册表：包键 -> 工厂
#[derive(Default)]
pub struct EntryPoints {
    factories: HashMap<String, ModuleFactory>,
}

impl EntryPoints {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记模块工厂，同一包键后登记的覆盖先登记的
    pub fn register<F>(&mut self, package_key: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&CompositionNamespace, ModuleLogger) -> Result<Arc<dyn ModuleInstance>>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(package_key.into(), Box::new(factory));
        self
    }

    /// 构建器风格的登记
    pub fn with<F>(mut self, package_key: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&CompositionNamespace, ModuleLogger) -> Result<Arc<dyn ModuleInstance>>
            + Send
            + Sync
            + 'static,
    {
        self.register(package_key, factory);
        self
    }

    /// 查找工厂
    pub fn get(&self, package_key: &str) -> Option<&ModuleFactory> {
        self.factories.get(package_key)
    }

    /// 是否登记了该包键
    pub fn contains(&self, package_key: &str) -> bool {
        self.factories.contains_key(package_key)
    }

    /// 已登记的包键，按名称排序
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// 已登记数量
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for EntryPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoints")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl ModuleInstance for Echo {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_register_and_construct() {
        let entry_points = EntryPoints::new()
            .with("m_echo", |_ns, _logger| Ok(Arc::new(Echo) as Arc<dyn ModuleInstance>));

        assert!(entry_points.contains("m_echo"));
        assert_eq!(entry_points.keys(), vec!["m_echo"]);

        let namespace = CompositionNamespace::new();
        let factory = entry_points.get("m_echo").unwrap();
        let instance = factory(&namespace, ModuleLogger::new("echo")).unwrap();
        assert!(instance.as_any().downcast_ref::<Echo>().is_some());
    }

    #[test]
    fn test_default_install_is_noop() {
        let mut namespace = CompositionNamespace::new();
        Echo.install(&mut namespace).unwrap();
        assert!(namespace.is_empty());
    }
}
