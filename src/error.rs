//! 统一错误处理
//!
//! - `ProvisionError`：开通流水线各组件的错误分类
//! - `ApiError`：HTTP 层错误，实现 `IntoResponse`

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// 唯一性冲突的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateField {
    Domain,
    Username,
    /// 存储层未说明是哪一列
    Unknown,
}

impl std::fmt::Display for DuplicateField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuplicateField::Domain => write!(f, "domain"),
            DuplicateField::Username => write!(f, "username"),
            DuplicateField::Unknown => write!(f, "domain or username"),
        }
    }
}

/// 开通流水线错误
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("invalid domain name: {0:?}")]
    InvalidDomain(String),

    #[error("invalid username: {0:?}")]
    InvalidUsername(String),

    #[error("failed to stage {}: {source}", path.display())]
    Staging { path: PathBuf, source: io::Error },

    #[error("could not read vhost template {}: {source}", path.display())]
    TemplateRead { path: PathBuf, source: io::Error },

    #[error("failed to write provisioning script {}: {source}", path.display())]
    ScriptGeneration { path: PathBuf, source: io::Error },

    #[error("{0} is already provisioned")]
    Duplicate(DuplicateField),

    #[error("site registry error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl ProvisionError {
    /// 稳定的错误类型标签，用于 JSON 和日志
    pub fn kind(&self) -> &'static str {
        match self {
            ProvisionError::InvalidDomain(_) => "invalid_domain",
            ProvisionError::InvalidUsername(_) => "invalid_username",
            ProvisionError::Staging { .. } => "staging_error",
            ProvisionError::TemplateRead { .. } => "template_read_error",
            ProvisionError::ScriptGeneration { .. } => "script_generation_error",
            ProvisionError::Duplicate(_) => "duplicate",
            ProvisionError::Storage(_) => "storage_error",
        }
    }

    /// 调用方修改输入后可重试
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ProvisionError::InvalidDomain(_) | ProvisionError::InvalidUsername(_)
        )
    }

    /// 面向操作者的错误信息
    ///
    /// 只包含操作者能据此行动的路径，不暴露临时文件和存储层细节。
    pub fn user_message(&self) -> String {
        match self {
            ProvisionError::InvalidDomain(_) => "Invalid domain name format.".to_string(),
            ProvisionError::InvalidUsername(_) => "Invalid username format: use 4-16 characters \
                 (lower-case letters, digits, '_' or '-'), starting with a letter or '_'."
                .to_string(),
            ProvisionError::Staging { path, source } => format!(
                "Failed to prepare {}: {}. Check permissions.",
                path.display(),
                source.kind()
            ),
            ProvisionError::TemplateRead { path, .. } => {
                format!("Could not read vhost template file {}.", path.display())
            }
            ProvisionError::ScriptGeneration { path, source } => format!(
                "Could not write provisioning script {}: {}.",
                path.display(),
                source.kind()
            ),
            ProvisionError::Duplicate(DuplicateField::Domain) => {
                "This domain is already provisioned.".to_string()
            }
            ProvisionError::Duplicate(DuplicateField::Username) => {
                "This username is already in use by another site.".to_string()
            }
            ProvisionError::Duplicate(DuplicateField::Unknown) => {
                "This domain or username is already provisioned.".to_string()
            }
            ProvisionError::Storage(_) => {
                "Site registry is unavailable; the site was not recorded.".to_string()
            }
        }
    }
}

/// API 错误响应结构
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

/// 统一 API 错误类型
#[derive(Debug)]
pub enum ApiError {
    /// 401 - 未授权（API Key 无效或缺失）
    Unauthorized,
    /// 400 - 请求无效
    BadRequest(String),
    /// 404 - 资源未找到
    NotFound(String),
    /// 500 - 内部错误
    Internal(String),
}

impl ApiError {
    pub fn unauthorized() -> Self {
        Self::Unauthorized
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Invalid or missing API key".to_string(),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("{} not found", resource),
            ),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        (status, Json(ErrorResponse::new(error_type, message))).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Unauthorized => write!(f, "Unauthorized"),
            ApiError::BadRequest(m) => write!(f, "Bad request: {}", m),
            ApiError::NotFound(r) => write!(f, "Not found: {}", r),
            ApiError::Internal(m) => write!(f, "Internal error: {}", m),
        }
    }
}

impl std::error::Error for ApiError {}

/// 便捷类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ProvisionError::InvalidDomain("x y".into()).kind(),
            "invalid_domain"
        );
        assert_eq!(
            ProvisionError::Duplicate(DuplicateField::Domain).kind(),
            "duplicate"
        );
        assert!(ProvisionError::InvalidUsername("A".into()).is_input_error());
        assert!(!ProvisionError::Duplicate(DuplicateField::Username).is_input_error());
    }

    #[test]
    fn test_staging_message_keeps_path_hides_debug() {
        let err = ProvisionError::Staging {
            path: PathBuf::from("/var/www/hosts/alice/public_html"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        let msg = err.user_message();
        assert!(msg.contains("/var/www/hosts/alice/public_html"));
        assert!(msg.contains("permission denied"));
        assert!(!msg.contains("Os {"));
    }

    #[test]
    fn test_duplicate_messages_name_the_field() {
        assert!(ProvisionError::Duplicate(DuplicateField::Domain)
            .user_message()
            .contains("domain"));
        assert!(ProvisionError::Duplicate(DuplicateField::Username)
            .user_message()
            .contains("username"));
        assert_eq!(
            ProvisionError::Duplicate(DuplicateField::Unknown).to_string(),
            "domain or username is already provisioned"
        );
    }

    #[test]
    fn test_error_response_new() {
        let resp = ErrorResponse::new("test_error", "Test message");
        assert_eq!(resp.error, "test_error");
        assert_eq!(resp.message, "Test message");
    }
}
