//! # SDK Frame - 可插拔模块框架
//!
//! 提供以下核心功能：
//!
//! - **模块注册表**: 发现本地存储中的模块，读取描述与启用状态
//! - **依赖解析**: 把模块依赖关系排成安全的加载顺序，检测循环和缺失依赖
//! - **模块加载**: 按序实例化模块并注册到共享的组合命名空间
//! - **远程源**: 合并多个远程源的目录，键为 `模块名@提供方`
//! - **模块获取**: 安装、升级、级联安装依赖，以及发布本地模块
//! - **日志系统**: 结构化日志记录
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use sdk_frame::{CoreConfig, EntryPoints, SdkFrame};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut frame = SdkFrame::new(CoreConfig::default(), EntryPoints::new())?;
//!     let namespace = frame.start().await?;
//!     println!("{} modules loaded", namespace.len());
//!     Ok(())
//! }
//! ```
//!
//! ## 模块结构
//!
//! - `module` - 模块描述、存储、依赖解析与加载
//! - `catalog` - 远程源目录与传输
//! - `acquire` - 安装、升级与源发布
//! - `core` - 配置与环境变量
//! - `utils` - 错误类型与日志
//! - `api` - 公共 API 接口

#![warn(rustdoc::missing_crate_level_docs)]

pub mod acquire;
pub mod api;
pub mod catalog;
pub mod core;
pub mod module;
pub mod utils;

// 重导出常用类型，方便使用
pub use module::{
    CompositionNamespace, DependencyGraph, DottedVersion, EntryPoints, InstalledModule,
    ModuleDescriptor, ModuleFactory, ModuleInstance, ModuleLoader, ModuleManager, ModuleRegistry,
    ModuleStore, OptionalDependency,
};

pub use catalog::{CatalogKey, CatalogMerger, CatalogModule, HttpTransport, OriginDocument, RegistrySnapshot, Transport};

pub use acquire::{
    AcquisitionEngine, AcquisitionStage, CandidateView, ConsoleDecisions, InstallReport,
    OperatorDecision, OriginIdentity, OriginMaker, ScriptedDecisions, UpgradePlanItem,
    UpgradeReport,
};

pub use utils::{error_code, CoreError, Result};
pub use utils::logger::{fields, LogGuard, Logger, LoggerConfig, LoggerConfigBuilder, ModuleLogger, RotationStrategy};

pub use core::config::{CoreConfig, CoreConfigBuilder, LogConfig, StoreConfig, CatalogConfig};
pub use core::env::EnvStore;
pub use api::sdk::SdkFrame;

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
