//! 站点开通 API
//!
//! 包含 POST /sites, GET /sites, GET /sites/:domain 端点

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::provision::{ProvisioningOutcome, Site};
use crate::error::{ApiError, ApiResult, ProvisionError};
use crate::middleware::RequireApiKey;
use crate::state::AppState;

/// 本次流水线运行 ID 的响应 header
pub const RUN_ID_HEADER: &str = "x-run-id";

/// 开通请求
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSiteRequest {
    pub domain: String,
    pub username: String,
}

/// 站点列表响应
#[derive(Debug, Serialize)]
pub struct SiteListResponse {
    pub sites: Vec<Site>,
    pub total: usize,
}

/// 创建站点路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sites", get(list_sites).post(create_site))
        .route("/sites/:domain", get(get_site))
}

/// 开通站点
///
/// POST /sites
/// 需要 API Key。请求体能解析时，响应体总是带标签的流水线结果；
/// 解析失败返回 400 `ErrorResponse`，流水线不会启动。
async fn create_site(
    auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateSiteRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::warn!(error = %rejection, "Rejected malformed provisioning request");
        ApiError::bad_request(rejection.body_text())
    })?;

    let outcome = state
        .provisioner
        .provision(&request.domain, &request.username, &auth.operator)
        .await;

    let run_id = outcome.run_id().to_string();
    Ok((
        outcome_status(&outcome),
        [(RUN_ID_HEADER, run_id)],
        Json(outcome),
    )
        .into_response())
}

/// 流水线结果对应的 HTTP 状态码
pub fn outcome_status(outcome: &ProvisioningOutcome) -> StatusCode {
    match outcome {
        ProvisioningOutcome::Done(_) => StatusCode::CREATED,
        ProvisioningOutcome::Failed(failure) => match &failure.error {
            e if e.is_input_error() => StatusCode::BAD_REQUEST,
            ProvisionError::Duplicate(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

/// GET /sites
async fn list_sites(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<SiteListResponse>> {
    let sites = state.registry().list_sites().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to list sites");
        ApiError::internal("Site registry is unavailable")
    })?;

    Ok(Json(SiteListResponse {
        total: sites.len(),
        sites,
    }))
}

/// GET /sites/:domain
async fn get_site(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
) -> ApiResult<Json<Site>> {
    let site = state.registry().find_by_domain(&domain).await.map_err(|e| {
        tracing::error!(error = %e, domain = %domain, "Failed to look up site");
        ApiError::internal("Site registry is unavailable")
    })?;

    site.map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Site {}", domain)))
}
