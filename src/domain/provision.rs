//! 站点开通相关领域模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::ProvisionError;

/// 已通过校验的开通请求
///
/// 只能由 `validator::validate` 构造，持有者可以确信域名和用户名
/// 都在安全字符集内。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProvisioningRequest {
    domain: String,
    username: String,
}

impl ProvisioningRequest {
    pub(crate) fn new(domain: String, username: String) -> Self {
        Self { domain, username }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

/// 已开通站点的持久化记录
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: i64,
    /// 域名（唯一）
    pub domain: String,
    /// 系统用户名（唯一）
    pub username: String,
    /// 由 registry 写入时分配
    pub created_at: DateTime<Utc>,
}

/// 渲染后暂存的 vhost 配置
///
/// `staged_path` 是进程私有的临时文件，`target_path` 是生成脚本最终要
/// 移动到的位置。脚本未执行前两者都处于"已暂存、未激活"状态。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StagedArtifact {
    pub staged_path: PathBuf,
    pub target_path: PathBuf,
}

/// 操作者身份
///
/// 显式传入编排器，不从会话等全局状态读取。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperatorIdentity(String);

impl OperatorIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OperatorIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 开通流水线阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStage {
    Validating,
    Staging,
    Rendering,
    ScriptGenerating,
    Recording,
    Done,
}

impl ProvisionStage {
    /// 按执行顺序排列的非终态阶段
    pub const PIPELINE: [ProvisionStage; 5] = [
        ProvisionStage::Validating,
        ProvisionStage::Staging,
        ProvisionStage::Rendering,
        ProvisionStage::ScriptGenerating,
        ProvisionStage::Recording,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionStage::Validating => "validating",
            ProvisionStage::Staging => "staging",
            ProvisionStage::Rendering => "rendering",
            ProvisionStage::ScriptGenerating => "script_generating",
            ProvisionStage::Recording => "recording",
            ProvisionStage::Done => "done",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProvisionStage::Validating => "Validate Input",
            ProvisionStage::Staging => "Prepare Web Root",
            ProvisionStage::Rendering => "Render Vhost Config",
            ProvisionStage::ScriptGenerating => "Generate Provisioning Script",
            ProvisionStage::Recording => "Record Site",
            ProvisionStage::Done => "Done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProvisionStage::Done)
    }
}

impl std::fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 阶段状态
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

/// 单个阶段的执行记录
#[derive(Clone, Debug, Serialize)]
pub struct StageReport {
    pub stage: ProvisionStage,
    pub display_name: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// 持续时间（毫秒）
    pub duration_ms: Option<i64>,
    pub status: StageStatus,
    pub message: Option<String>,
}

impl StageReport {
    /// 创建新的待执行阶段
    pub fn new(stage: ProvisionStage) -> Self {
        Self {
            stage,
            display_name: stage.display_name().to_string(),
            started_at: None,
            finished_at: None,
            duration_ms: None,
            status: StageStatus::Pending,
            message: None,
        }
    }

    /// 开始执行阶段
    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
        self.status = StageStatus::Running;
    }

    /// 完成阶段
    pub fn finish(&mut self, success: bool, message: Option<String>) {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.status = if success {
            StageStatus::Success
        } else {
            StageStatus::Failed
        };
        self.message = message;
        if let Some(started) = self.started_at {
            self.duration_ms = Some((now - started).num_milliseconds());
        }
    }

    /// 跳过阶段
    pub fn skip(&mut self, reason: Option<String>) {
        self.status = StageStatus::Skipped;
        self.message = reason;
    }
}

/// 成功结果
#[derive(Debug, Serialize)]
pub struct ProvisioningSuccess {
    pub run_id: Uuid,
    pub operator: OperatorIdentity,
    pub domain: String,
    pub username: String,
    /// 生成的开通脚本
    pub script_path: PathBuf,
    /// 特权操作者需要执行的命令
    pub activation_command: String,
    pub site: Site,
    pub stages: Vec<StageReport>,
}

/// 失败结果
#[derive(Debug, Serialize)]
pub struct ProvisioningFailure {
    pub run_id: Uuid,
    pub operator: OperatorIdentity,
    /// 失败所在阶段
    pub stage: ProvisionStage,
    /// 错误类型标签 (invalid_domain, duplicate, ...)
    pub kind: &'static str,
    /// 面向用户的错误信息
    pub message: String,
    pub stages: Vec<StageReport>,
    #[serde(skip)]
    pub error: ProvisionError,
}

/// 一次流水线运行的最终结果
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProvisioningOutcome {
    Done(ProvisioningSuccess),
    Failed(ProvisioningFailure),
}

impl ProvisioningOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, ProvisioningOutcome::Done(_))
    }

    pub fn run_id(&self) -> Uuid {
        match self {
            ProvisioningOutcome::Done(s) => s.run_id,
            ProvisioningOutcome::Failed(f) => f.run_id,
        }
    }

    /// 成功时返回脚本路径
    pub fn script_path(&self) -> Option<&Path> {
        match self {
            ProvisioningOutcome::Done(s) => Some(&s.script_path),
            ProvisioningOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ProvisioningFailure> {
        match self {
            ProvisioningOutcome::Done(_) => None,
            ProvisioningOutcome::Failed(f) => Some(f),
        }
    }

    pub fn stages(&self) -> &[StageReport] {
        match self {
            ProvisioningOutcome::Done(s) => &s.stages,
            ProvisioningOutcome::Failed(f) => &f.stages,
        }
    }
}
