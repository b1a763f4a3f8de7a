//! 文件系统暂存
//!
//! 创建站点 web 根目录、占位首页，并把渲染好的 vhost 配置写入临时文件。
//! 不触碰正在使用的配置目录，移动到位由生成的脚本完成。

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::domain::provision::StagedArtifact;
use crate::error::ProvisionError;

/// web 根目录权限
pub const WEB_ROOT_MODE: u32 = 0o755;

/// 站点 web 根目录名
const PUBLIC_HTML: &str = "public_html";

/// 占位首页文件名
const INDEX_FILE: &str = "index.html";

/// 暂存 vhost 文件名前缀
const STAGED_VHOST_PREFIX: &str = "vhost";

/// 文件系统暂存器
pub struct FilesystemStager;

impl FilesystemStager {
    /// `<base>/<username>/public_html`
    pub fn web_root_path(base_path: &Path, username: &str) -> PathBuf {
        base_path.join(username).join(PUBLIC_HTML)
    }

    /// 创建 web 根目录（幂等）
    pub async fn ensure_web_root(base_path: &Path, username: &str) -> Result<PathBuf, ProvisionError> {
        let web_root = Self::web_root_path(base_path, username);
        tracing::debug!(path = %web_root.display(), "Creating web root");

        ensure_dir(&web_root, WEB_ROOT_MODE)
            .await
            .map_err(|source| ProvisionError::Staging {
                path: web_root.clone(),
                source,
            })?;

        Ok(web_root)
    }

    /// 写入占位首页，总是覆盖
    pub async fn write_placeholder_page(
        web_root: &Path,
        domain: &str,
        username: &str,
    ) -> Result<PathBuf, ProvisionError> {
        let index_path = web_root.join(INDEX_FILE);
        fs::write(&index_path, placeholder_page(domain, username))
            .await
            .map_err(|source| ProvisionError::Staging {
                path: index_path.clone(),
                source,
            })?;

        tracing::debug!(path = %index_path.display(), "Created placeholder index.html");
        Ok(index_path)
    }

    /// 把渲染后的配置写入 `staging_dir` 下名字不可预测的临时文件
    ///
    /// 文件在返回后保留在磁盘上，由生成的脚本负责移走。
    pub async fn stage_vhost(
        staging_dir: &Path,
        rendered: &str,
        target_path: &Path,
    ) -> Result<StagedArtifact, ProvisionError> {
        let dir = staging_dir.to_path_buf();
        let content = rendered.to_owned();

        let staged_path = tokio::task::spawn_blocking(move || write_temp_file(&dir, &content))
            .await
            .map_err(io::Error::other)
            .and_then(|r| r)
            .map_err(|source| ProvisionError::Staging {
                path: staging_dir.to_path_buf(),
                source,
            })?;

        Ok(StagedArtifact {
            staged_path,
            target_path: target_path.to_path_buf(),
        })
    }
}

/// 占位首页内容
pub fn placeholder_page(domain: &str, username: &str) -> String {
    format!("<h1>Welcome to {domain}!</h1><p>Site created for user: {username}</p>")
}

fn write_temp_file(dir: &Path, content: &str) -> io::Result<PathBuf> {
    let mut file = tempfile::Builder::new()
        .prefix(STAGED_VHOST_PREFIX)
        .suffix(".conf")
        .tempfile_in(dir)?;
    file.write_all(content.as_bytes())?;
    file.as_file().sync_all()?;

    file.into_temp_path().keep().map_err(|e| e.error)
}

/// 递归创建目录，已存在时不报错
///
/// 目录存在但不是目录（例如同名文件）时返回错误。权限只作用于新建的目录。
pub(crate) async fn ensure_dir(path: &Path, mode: u32) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;

    builder.create(path).await
}
