//! 模块管理模块
//!
//! 包含模块管理系统的核心组件：
//! - 模块描述与版本号
//! - 模块存储与注册表
//! - 依赖解析
//! - 入口点、组合命名空间与加载器

pub mod dependency;
pub mod loader;
pub mod manager;
pub mod metadata;
pub mod namespace;
pub mod parser;
pub mod registry;
pub mod runtime;
pub mod store;
pub mod version;

// 重导出常用类型
pub use dependency::DependencyGraph;
pub use loader::ModuleLoader;
pub use manager::{ModuleManager, ToggleOutcome};
pub use metadata::{InstalledModule, ModuleDescriptor, OptionalDependency};
pub use namespace::{CompositionNamespace, RegisteredModule};
pub use parser::ModuleParser;
pub use registry::ModuleRegistry;
pub use runtime::{EntryPoints, ModuleFactory, ModuleInstance};
pub use store::ModuleStore;
pub use version::DottedVersion;
