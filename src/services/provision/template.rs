//! Vhost 模板渲染
//!
//! 模板格式由部署方提供并视为可信；替换是字面、单遍、与顺序无关的。

use std::path::Path;
use tokio::fs;

use crate::error::ProvisionError;

pub const DOMAIN_PLACEHOLDER: &str = "{DOMAIN}";
pub const USERNAME_PLACEHOLDER: &str = "{USERNAME}";

/// 模板渲染器
pub struct TemplateRenderer;

impl TemplateRenderer {
    /// 读取模板并替换占位符
    pub async fn render(
        template_path: &Path,
        domain: &str,
        username: &str,
    ) -> Result<String, ProvisionError> {
        let template = fs::read_to_string(template_path)
            .await
            .map_err(|source| ProvisionError::TemplateRead {
                path: template_path.to_path_buf(),
                source,
            })?;

        Ok(substitute(&template, domain, username))
    }
}

/// 单遍扫描替换 `{DOMAIN}` 和 `{USERNAME}`
///
/// 替换进去的值不会再被扫描，因此值里出现占位符文本也不会二次展开。
pub fn substitute(template: &str, domain: &str, username: &str) -> String {
    let mut out = String::with_capacity(template.len() + domain.len() + username.len());
    let mut rest = template;

    while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(after) = tail.strip_prefix(DOMAIN_PLACEHOLDER) {
            out.push_str(domain);
            rest = after;
        } else if let Some(after) = tail.strip_prefix(USERNAME_PLACEHOLDER) {
            out.push_str(username);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);

    out
}
