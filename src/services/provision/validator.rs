//! 输入校验
//!
//! 域名与系统用户名的规范化和校验。纯函数，不访问网络和文件系统。
//!
//! 这里的字符集限制同时是生成脚本安全性的前提：域名和用户名会被原样
//! 写入以 root 身份执行的 shell 脚本。放宽这里的规则前先看 `script.rs`。

use regex::Regex;
use std::sync::OnceLock;

use crate::domain::provision::ProvisioningRequest;
use crate::error::ProvisionError;

/// 主机名总长度上限
pub const MAX_DOMAIN_LEN: usize = 253;

/// 单个 label 长度上限
pub const MAX_LABEL_LEN: usize = 63;

fn username_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_-]{3,15}$").expect("username pattern"))
}

fn label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9](?:[a-z0-9-]*[a-z0-9])?$").expect("label pattern"))
}

/// 校验原始输入，生成开通请求
///
/// 先校验域名；两者都无效时报告域名错误。
pub fn validate(raw_domain: &str, raw_username: &str) -> Result<ProvisioningRequest, ProvisionError> {
    let domain = normalize_domain(raw_domain)
        .ok_or_else(|| ProvisionError::InvalidDomain(raw_domain.to_string()))?;
    let username = normalize_username(raw_username)
        .ok_or_else(|| ProvisionError::InvalidUsername(raw_username.to_string()))?;

    Ok(ProvisioningRequest::new(domain, username))
}

/// 规范化域名：去掉首尾空白和一个结尾的 `.`，转为小写
///
/// 返回 `None` 表示不是合法主机名。
pub fn normalize_domain(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);
    if trimmed.is_empty() || trimmed.len() > MAX_DOMAIN_LEN || !trimmed.is_ascii() {
        return None;
    }

    let domain = trimmed.to_ascii_lowercase();
    let labels_ok = domain
        .split('.')
        .all(|label| label.len() <= MAX_LABEL_LEN && label_re().is_match(label));

    labels_ok.then_some(domain)
}

/// 校验用户名：原样匹配，不去空白，大小写敏感
pub fn normalize_username(raw: &str) -> Option<String> {
    username_re().is_match(raw).then(|| raw.to_string())
}
