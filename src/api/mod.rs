//! API 模块
//!
//! 对外提供的 SDK 接口。
//!
//! # 示例
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sdk_frame::{CoreConfig, EntryPoints, SdkFrame, ScriptedDecisions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let frame = SdkFrame::new(CoreConfig::default(), EntryPoints::new())?;
//!     frame.snapshots().add_origin("https://example.com/map.json").await?;
//!     frame.refresh_catalog().await?;
//!
//!     let engine = frame.engine(Arc::new(ScriptedDecisions::new().confirm(true)));
//!     let report = engine.install("http").await?;
//!     println!("{:?}", report.installed);
//!     Ok(())
//! }
//! ```

pub mod sdk;

// 重导出主要类型
pub use sdk::{FrameState, SdkFrame};
