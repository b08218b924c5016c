//! 核心模块
//!
//! 包含框架配置和环境变量存储。

pub mod config;
pub mod env;

pub use config::{
    CatalogConfig, CoreConfig, CoreConfigBuilder, LogConfig, OriginMakerConfig, StoreConfig,
    DEFAULT_CONFIG_FILE,
};
pub use env::{EnvMap, EnvStore, EnvValueType};
