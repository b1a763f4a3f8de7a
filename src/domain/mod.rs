//! 领域模型模块
//!
//! 纯数据结构，不依赖 axum/tokio

pub mod provision;

// Re-exports for convenience
pub use provision::{
    OperatorIdentity, ProvisionStage, ProvisioningFailure, ProvisioningOutcome,
    ProvisioningRequest, ProvisioningSuccess, Site, StageReport, StageStatus, StagedArtifact,
};
