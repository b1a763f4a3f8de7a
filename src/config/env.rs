//! 环境变量配置加载

use regex::Regex;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::warn;

/// 默认 API Key，生产环境必须覆盖
const DEFAULT_API_KEY: &str = "change-me-in-production";

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("admin email {0:?} is not a plain address")]
    InvalidAdminEmail(String),

    #[error("{name} must not be empty")]
    EmptyPath { name: &'static str },
}

/// 路径与管理员邮箱配置
///
/// 流水线需要的全部外部位置，均为普通路径/字符串。
#[derive(Clone, Debug)]
pub struct PathsConfig {
    /// vhost 模板文件
    pub template_path: PathBuf,
    /// Apache sites-available 目录
    pub sites_available_dir: PathBuf,
    /// 站点根目录的父目录
    pub hosts_base_dir: PathBuf,
    /// 开通脚本输出目录
    pub scripts_dir: PathBuf,
    /// 渲染后配置的暂存目录
    pub staging_dir: PathBuf,
    /// Let's Encrypt 注册邮箱
    pub admin_email: String,
}

impl PathsConfig {
    /// 目标 vhost 配置路径 `<sites_available>/<domain>.conf`
    pub fn vhost_target_path(&self, domain: &str) -> PathBuf {
        self.sites_available_dir.join(format!("{domain}.conf"))
    }

    /// 校验配置
    ///
    /// 管理员邮箱会写进 root 执行的脚本，只接受简单地址。
    pub fn validate(&self) -> Result<(), ConfigError> {
        let paths = [
            ("template_path", &self.template_path),
            ("sites_available_dir", &self.sites_available_dir),
            ("hosts_base_dir", &self.hosts_base_dir),
            ("scripts_dir", &self.scripts_dir),
            ("staging_dir", &self.staging_dir),
        ];
        for (name, path) in paths {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::EmptyPath { name });
            }
        }

        if !email_re().is_match(&self.admin_email) {
            return Err(ConfigError::InvalidAdminEmail(self.admin_email.clone()));
        }

        Ok(())
    }
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)+$").expect("email pattern")
    })
}

/// 环境配置
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// API 密钥
    pub api_key: String,
    /// 服务监听端口
    pub port: u16,
    /// SQLite 数据库 URL
    pub database_url: String,
    /// 在写文件之前先查一次唯一性
    pub precheck_uniqueness: bool,
    /// 路径配置
    pub paths: PathsConfig,
}

impl EnvConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意 key-value 来源加载，便于测试
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let path_or = |key: &str, default: &str| PathBuf::from(get(key).unwrap_or_else(|| default.to_string()));

        // API Key - 支持旧名称兼容
        let api_key = match get("PROVISION_API_KEY").or_else(|| get("API_KEY")) {
            Some(key) => key,
            None => {
                warn!("PROVISION_API_KEY not set, using the default key");
                DEFAULT_API_KEY.to_string()
            }
        };

        let port = get("PORT").and_then(|v| v.parse().ok()).unwrap_or(9877);

        let database_url = get("PROVISION_DATABASE_URL")
            .or_else(|| get("DATABASE_URL"))
            .unwrap_or_else(|| "sqlite://app.db".to_string());

        let precheck_uniqueness = get("PROVISION_PRECHECK_UNIQUENESS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let paths = PathsConfig {
            template_path: path_or(
                "PROVISION_TEMPLATE_PATH",
                "/var/www/app/templates/vhost_template.conf",
            ),
            sites_available_dir: path_or(
                "PROVISION_SITES_AVAILABLE_DIR",
                "/etc/apache2/sites-available",
            ),
            hosts_base_dir: path_or("PROVISION_HOSTS_BASE_DIR", "/var/www/hosts"),
            scripts_dir: path_or(
                "PROVISION_SCRIPTS_DIR",
                "/var/www/app/provisioning_scripts",
            ),
            staging_dir: get("PROVISION_STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(env::temp_dir),
            admin_email: get("PROVISION_ADMIN_EMAIL")
                .unwrap_or_else(|| "admin@example.com".to_string()),
        };

        Self {
            api_key,
            port,
            database_url,
            precheck_uniqueness,
            paths,
        }
    }

    /// 是否仍在使用默认 API Key
    pub fn uses_default_api_key(&self) -> bool {
        self.api_key == DEFAULT_API_KEY
    }
}

/// 常量
pub mod constants {
    /// 服务名
    pub const SERVICE_NAME: &str = "site-provision-agent";

    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}
