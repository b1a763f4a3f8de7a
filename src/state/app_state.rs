//! 应用状态

use chrono::{DateTime, Utc};

use crate::config::EnvConfig;
use crate::infra::SiteRegistry;
use crate::services::Provisioner;

/// 应用状态
pub struct AppState {
    /// API 密钥（用于验证请求）
    pub api_key: String,
    /// 开通编排器
    pub provisioner: Provisioner,
    /// 服务启动时间
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: EnvConfig, registry: SiteRegistry) -> Self {
        let provisioner = Provisioner::new(config.paths, registry)
            .with_uniqueness_precheck(config.precheck_uniqueness);

        Self {
            api_key: config.api_key,
            provisioner,
            started_at: Utc::now(),
        }
    }

    pub fn registry(&self) -> &SiteRegistry {
        self.provisioner.registry()
    }
}
