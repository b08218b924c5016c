//! 远程源目录
//!
//! 包含：
//! - 目录文档与快照数据结构
//! - module.json 快照持久化
//! - 传输接口及 HTTP 实现
//! - 多源合并

pub mod merger;
pub mod models;
pub mod snapshot;
pub mod transport;

pub use merger::CatalogMerger;
pub use models::{CatalogKey, CatalogModule, OriginDocument, RegistrySnapshot};
pub use snapshot::SnapshotStore;
pub use transport::{HttpTransport, Transport};
