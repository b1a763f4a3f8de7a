//! Site Provision Agent - 主机站点开通代理
//!
//! 校验域名/用户名，暂存 web 根目录和 vhost 配置，生成由特权操作者
//! 执行的激活脚本，并在 SQLite 中登记站点。

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod middleware;
pub mod services;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub use config::{EnvConfig, PathsConfig};
pub use domain::{OperatorIdentity, ProvisioningOutcome};
pub use error::ProvisionError;
pub use infra::SiteRegistry;
pub use services::Provisioner;

use crate::config::env::constants::{SERVICE_NAME, VERSION};
use crate::state::AppState;

/// 运行时参数（来自命令行）
#[derive(Clone, Debug, Default)]
pub struct RuntimeConfig {
    /// 覆盖监听端口
    pub port_override: Option<u16>,
}

/// 初始化日志
///
/// 默认级别 `site_provision_agent=info`，可用 `RUST_LOG` 覆盖。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("site_provision_agent=info,tower_http=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// 加载并校验配置，打开站点登记表
pub async fn bootstrap(config: &EnvConfig) -> anyhow::Result<SiteRegistry> {
    config.paths.validate()?;
    if config.uses_default_api_key() {
        warn!("Running with the default API key; set PROVISION_API_KEY");
    }

    let registry = SiteRegistry::connect(&config.database_url).await?;
    Ok(registry)
}

/// 启动 HTTP 服务
pub async fn run_server(config: EnvConfig, runtime: RuntimeConfig) -> anyhow::Result<()> {
    let registry = bootstrap(&config).await?;
    let port = runtime.port_override.unwrap_or(config.port);

    let state = Arc::new(AppState::new(config, registry));
    let app = api::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, service = SERVICE_NAME, version = VERSION, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
