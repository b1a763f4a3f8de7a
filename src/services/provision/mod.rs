//! 站点开通流水线
//!
//! Validating → Staging → Rendering → ScriptGenerating → Recording → Done，
//! 任意阶段失败即进入 Failed 并终止。不重试、不回滚：已创建的目录和暂存
//! 文件保留在原处，由操作者根据失败阶段处理。
//!
//! 默认顺序与原有部署一致，唯一性在最后由登记表判定，所以重复提交仍会
//! 留下目录和（被覆盖的）脚本。开启 `precheck_uniqueness` 可在写文件前先做
//! 一次只读检查，但并发下仍以最后的 INSERT 为准。
//!
//! 文件系统暂存没有事务保证：同一域名的并发请求会写同一个脚本文件名，
//! 后写者覆盖先写者。这里不加锁。

pub mod script;
pub mod staging;
pub mod template;
pub mod validator;

use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PathsConfig;
use crate::domain::provision::{
    OperatorIdentity, ProvisionStage, ProvisioningFailure, ProvisioningOutcome,
    ProvisioningSuccess, Site, StageReport,
};
use crate::error::ProvisionError;
use crate::infra::SiteRegistry;

pub use script::{ProvisioningScript, ScriptSynthesizer};
pub use staging::FilesystemStager;
pub use template::TemplateRenderer;

/// 开通编排器
#[derive(Clone)]
pub struct Provisioner {
    paths: PathsConfig,
    registry: SiteRegistry,
    precheck_uniqueness: bool,
}

impl Provisioner {
    pub fn new(paths: PathsConfig, registry: SiteRegistry) -> Self {
        Self {
            paths,
            registry,
            precheck_uniqueness: false,
        }
    }

    /// 在写文件前先做只读唯一性检查
    pub fn with_uniqueness_precheck(mut self, enabled: bool) -> Self {
        self.precheck_uniqueness = enabled;
        self
    }

    pub fn registry(&self) -> &SiteRegistry {
        &self.registry
    }

    /// 执行一次开通流水线
    ///
    /// 所有组件错误都在这里转换为带阶段标签的 `ProvisioningOutcome`。
    pub async fn provision(
        &self,
        raw_domain: &str,
        raw_username: &str,
        operator: &OperatorIdentity,
    ) -> ProvisioningOutcome {
        let mut run = PipelineRun::new(operator.clone());
        info!(run_id = %run.run_id, operator = %operator, domain = %raw_domain, "Provisioning started");

        // Validating
        run.enter(ProvisionStage::Validating);
        let request = match validator::validate(raw_domain, raw_username) {
            Ok(request) => request,
            Err(e) => return run.fail(e),
        };
        if self.precheck_uniqueness {
            match self
                .registry
                .is_taken(request.domain(), request.username())
                .await
            {
                Ok(None) => {}
                Ok(Some(field)) => return run.fail(ProvisionError::Duplicate(field)),
                Err(e) => return run.fail(ProvisionError::Storage(e)),
            }
        }
        run.complete(None);
        let (domain, username) = (request.domain(), request.username());

        // Staging
        run.enter(ProvisionStage::Staging);
        let web_root =
            match FilesystemStager::ensure_web_root(&self.paths.hosts_base_dir, username).await {
                Ok(path) => path,
                Err(e) => return run.fail(e),
            };
        if let Err(e) =
            FilesystemStager::write_placeholder_page(&web_root, domain, username).await
        {
            return run.fail(e);
        }
        run.complete(Some(web_root.display().to_string()));

        // Rendering
        run.enter(ProvisionStage::Rendering);
        let rendered =
            match TemplateRenderer::render(&self.paths.template_path, domain, username).await {
                Ok(text) => text,
                Err(e) => return run.fail(e),
            };
        let target_path = self.paths.vhost_target_path(domain);
        let artifact =
            match FilesystemStager::stage_vhost(&self.paths.staging_dir, &rendered, &target_path)
                .await
            {
                Ok(artifact) => artifact,
                Err(e) => return run.fail(e),
            };
        run.complete(Some(target_path.display().to_string()));

        // ScriptGenerating
        run.enter(ProvisionStage::ScriptGenerating);
        let script_path = match ScriptSynthesizer::synthesize(
            &self.paths.scripts_dir,
            domain,
            username,
            &artifact.staged_path,
            &artifact.target_path,
            &self.paths.admin_email,
        )
        .await
        {
            Ok(path) => path,
            Err(e) => return run.fail(e),
        };
        run.complete(Some(script_path.display().to_string()));

        // Recording
        run.enter(ProvisionStage::Recording);
        let site = match self.registry.record_site(domain, username).await {
            Ok(site) => site,
            Err(e) => return run.fail(e),
        };
        run.complete(None);

        run.done(site, script_path)
    }
}

/// 一次流水线运行的状态
struct PipelineRun {
    run_id: Uuid,
    operator: OperatorIdentity,
    stages: Vec<StageReport>,
    current: usize,
}

impl PipelineRun {
    fn new(operator: OperatorIdentity) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            operator,
            stages: ProvisionStage::PIPELINE
                .iter()
                .map(|stage| StageReport::new(*stage))
                .collect(),
            current: 0,
        }
    }

    fn enter(&mut self, stage: ProvisionStage) {
        if let Some(index) = self.stages.iter().position(|r| r.stage == stage) {
            self.current = index;
            self.stages[index].start();
        }
    }

    fn complete(&mut self, message: Option<String>) {
        let report = &mut self.stages[self.current];
        report.finish(true, message);
        tracing::debug!(
            run_id = %self.run_id,
            stage = %report.stage,
            duration_ms = report.duration_ms.unwrap_or_default(),
            "Stage completed"
        );
    }

    fn fail(mut self, error: ProvisionError) -> ProvisioningOutcome {
        let stage = self.stages[self.current].stage;
        let message = error.user_message();

        self.stages[self.current].finish(false, Some(message.clone()));
        for report in self.stages.iter_mut().skip(self.current + 1) {
            report.skip(Some(format!("{} failed", stage)));
        }

        warn!(
            run_id = %self.run_id,
            stage = %stage,
            kind = error.kind(),
            error = %error,
            "Provisioning failed"
        );

        ProvisioningOutcome::Failed(ProvisioningFailure {
            run_id: self.run_id,
            operator: self.operator,
            stage,
            kind: error.kind(),
            message,
            stages: self.stages,
            error,
        })
    }

    fn done(self, site: Site, script_path: PathBuf) -> ProvisioningOutcome {
        info!(
            run_id = %self.run_id,
            domain = %site.domain,
            username = %site.username,
            script = %script_path.display(),
            "Site prepared, waiting for privileged activation"
        );

        ProvisioningOutcome::Done(ProvisioningSuccess {
            run_id: self.run_id,
            operator: self.operator,
            domain: site.domain.clone(),
            username: site.username.clone(),
            activation_command: activation_command(&script_path),
            script_path,
            site,
            stages: self.stages,
        })
    }
}

/// 操作者需要执行的命令
pub fn activation_command(script_path: &std::path::Path) -> String {
    format!(
        "sudo sh {}",
        script::shell_quote(&script_path.to_string_lossy())
    )
}
