//! 组合命名空间
//!
//! 模块实例按逻辑名注册到这里。命名空间同时携带环境变量快照、
//! 框架日志句柄，以及模块安装钩子挂上的共享能力。
//!
//! `env`、`logger`、`util` 是保留名，模块不能占用。

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::core::env::EnvMap;
use crate::module::metadata::ModuleDescriptor;
use crate::module::runtime::ModuleInstance;
use crate::utils::{CoreError, ModuleLogger, Result};

/// 保留名
pub const RESERVED_NAMES: &[&str] = &["env", "logger", "util"];

/// 已注册模块
#[derive(Clone)]
pub struct RegisteredModule {
    /// 模块描述
    pub descriptor: ModuleDescriptor,
    /// 模块实例
    pub instance: Arc<dyn ModuleInstance>,
    /// 注册时间
    pub loaded_at: DateTime<Utc>,
}

impl fmt::Debug for RegisteredModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredModule")
            .field("descriptor", &self.descriptor)
            .field("loaded_at", &self.loaded_at)
            .finish_non_exhaustive()
    }
}

/// 组合命名空间
pub struct CompositionNamespace {
    /// 逻辑名 -> 已注册模块
    modules: HashMap<String, RegisteredModule>,
    /// 注册顺序
    order: Vec<String>,
    /// 共享能力：名称 -> 任意值
    capabilities: HashMap<String, Arc<dyn Any + Send + Sync>>,
    /// 环境变量快照
    env: EnvMap,
    /// 框架日志句柄
    logger: ModuleLogger,
}

impl Default for CompositionNamespace {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositionNamespace {
    /// 创建空的命名空间
    pub fn new() -> Self {
        Self::with_env(EnvMap::new())
    }

    /// 创建带环境变量快照的命名空间
    pub fn with_env(env: EnvMap) -> Self {
        Self {
            modules: HashMap::new(),
            order: Vec::new(),
            capabilities: HashMap::new(),
            env,
            logger: ModuleLogger::new("SDK"),
        }
    }

    /// 环境变量快照
    pub fn env(&self) -> &EnvMap {
        &self.env
    }

    /// 读取单个环境变量
    pub fn env_get(&self, key: &str) -> Option<&Value> {
        self.env.get(key)
    }

    /// 覆盖环境变量（只影响本次运行）
    pub fn env_set(&mut self, key: impl Into<String>, value: Value) {
        self.env.insert(key.into(), value);
    }

    /// 框架日志句柄
    pub fn logger(&self) -> &ModuleLogger {
        &self.logger
    }

    /// 是否为保留名
    pub fn is_reserved(name: &str) -> bool {
        RESERVED_NAMES.contains(&name)
    }

    /// 名称是否已被占用（保留名、模块或共享能力）
    pub fn contains(&self, name: &str) -> bool {
        Self::is_reserved(name)
            || self.modules.contains_key(name)
            || self.capabilities.contains_key(name)
    }

    /// 是否已注册某个包键对应的模块
    pub fn has_package(&self, package_key: &str) -> bool {
        self.modules
            .values()
            .any(|m| m.descriptor.package_key == package_key)
    }

    /// 注册模块实例
    ///
    /// # Errors
    ///
    /// 名称已被占用时返回 `DuplicateModuleName`，命名空间保持不变
    pub fn register(
        &mut self,
        descriptor: ModuleDescriptor,
        instance: Arc<dyn ModuleInstance>,
    ) -> Result<()> {
        if self.contains(&descriptor.name) {
            return Err(CoreError::DuplicateModuleName {
                name: descriptor.name.clone(),
                package: descriptor.package_key.clone(),
            });
        }

        let name = descriptor.name.clone();
        self.modules.insert(
            name.clone(),
            RegisteredModule {
                descriptor,
                instance,
                loaded_at: Utc::now(),
            },
        );
        self.order.push(name);
        Ok(())
    }

    /// 获取已注册模块
    pub fn get(&self, name: &str) -> Option<&RegisteredModule> {
        self.modules.get(name)
    }

    /// 按具体类型获取模块实例
    pub fn instance<T: 'static>(&self, name: &str) -> Option<&T> {
        self.modules.get(name)?.instance.as_any().downcast_ref::<T>()
    }

    /// 挂载共享能力
    ///
    /// # Errors
    ///
    /// 名称已被占用时返回 `DuplicateModuleName`
    pub fn attach<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: T) -> Result<()> {
        let name = name.into();
        if self.contains(&name) {
            return Err(CoreError::DuplicateModuleName {
                package: "<capability>".to_string(),
                name,
            });
        }
        self.capabilities.insert(name, Arc::new(value));
        Ok(())
    }

    /// 按具体类型获取共享能力
    pub fn capability<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.capabilities
            .get(name)
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    /// 已注册模块名，按注册顺序
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// 已注册模块，按注册顺序
    pub fn modules(&self) -> impl Iterator<Item = &RegisteredModule> {
        self.order.iter().filter_map(|name| self.modules.get(name))
    }

    /// 已注册模块数量
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// 是否没有注册任何模块
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl fmt::Debug for CompositionNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut capabilities: Vec<&String> = self.capabilities.keys().collect();
        capabilities.sort();
        f.debug_struct("CompositionNamespace")
            .field("modules", &self.order)
            .field("capabilities", &capabilities)
            .field("env_keys", &self.env.len())
            .finish()
    }
}
