//! 模块获取
//!
//! 包含：
//! - 安装包读写
//! - 操作者决策
//! - 安装、升级状态机
//! - 源发布

pub mod archive;
pub mod decision;
pub mod engine;
pub mod origin_maker;

pub use decision::{
    CandidateView, ConsoleDecisions, OperatorDecision, ScriptedDecisions, UpgradePlanItem,
};
pub use engine::{
    AcquisitionEngine, AcquisitionStage, InstallReport, InstalledPackage, UpgradeReport,
};
pub use origin_maker::{OriginIdentity, OriginMaker};
