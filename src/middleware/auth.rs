//! API Key 认证中间件
//!
//! 提供 `RequireApiKey` extractor，同时解析出本次请求的操作者身份，
//! 由 handler 显式传给开通流水线。

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::HeaderMap, request::Parts},
};
use std::sync::Arc;

use crate::domain::provision::OperatorIdentity;
use crate::error::ApiError;
use crate::state::AppState;

/// 操作者 header
pub const OPERATOR_HEADER: &str = "x-operator";

/// 未提供操作者时的默认身份
pub const DEFAULT_OPERATOR: &str = "api";

/// 操作者名称最大长度
const MAX_OPERATOR_LEN: usize = 64;

/// 通过认证的调用方
///
/// `operator` 取自 `x-operator`，缺省为 `api`，随后写入日志和开通结果。
#[derive(Debug, Clone)]
pub struct RequireApiKey {
    pub operator: OperatorIdentity,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireApiKey {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        verify_api_key(&parts.headers, &state.api_key)
    }
}

/// 验证 API Key 并解析操作者
///
/// 检查 `x-api-key` header 是否与配置的 API key 匹配
pub fn verify_api_key(headers: &HeaderMap, expected_key: &str) -> Result<RequireApiKey, ApiError> {
    let provided_key = headers.get("x-api-key").and_then(|v| v.to_str().ok());

    match provided_key {
        Some(key) if key == expected_key => Ok(RequireApiKey {
            operator: operator_from_headers(headers)?,
        }),
        Some(_) => {
            tracing::warn!("Invalid API key provided");
            Err(ApiError::unauthorized())
        }
        None => {
            tracing::warn!("Missing x-api-key header");
            Err(ApiError::unauthorized())
        }
    }
}

fn operator_from_headers(headers: &HeaderMap) -> Result<OperatorIdentity, ApiError> {
    let Some(value) = headers.get(OPERATOR_HEADER) else {
        return Ok(OperatorIdentity::new(DEFAULT_OPERATOR));
    };

    let name = value
        .to_str()
        .map(str::trim)
        .map_err(|_| ApiError::bad_request("x-operator must be visible ASCII"))?;

    if name.is_empty() || name.len() > MAX_OPERATOR_LEN {
        return Err(ApiError::bad_request(format!(
            "x-operator must be 1-{} characters",
            MAX_OPERATOR_LEN
        )));
    }

    Ok(OperatorIdentity::new(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_verify_api_key_success() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("test-key"));

        let auth = verify_api_key(&headers, "test-key").unwrap();
        assert_eq!(auth.operator.as_str(), DEFAULT_OPERATOR);
    }

    #[test]
    fn test_verify_api_key_with_operator() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("test-key"));
        headers.insert(OPERATOR_HEADER, HeaderValue::from_static(" alice "));

        let auth = verify_api_key(&headers, "test-key").unwrap();
        assert_eq!(auth.operator.as_str(), "alice");
    }

    #[test]
    fn test_verify_api_key_blank_operator() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("test-key"));
        headers.insert(OPERATOR_HEADER, HeaderValue::from_static("   "));

        let result = verify_api_key(&headers, "test-key");
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_verify_api_key_wrong_key() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("wrong-key"));

        let result = verify_api_key(&headers, "test-key");
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[test]
    fn test_verify_api_key_missing() {
        let headers = HeaderMap::new();

        let result = verify_api_key(&headers, "test-key");
        assert!(result.is_err());
    }
}
