//! Web 服务路由模块

use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use common::errors::AppError;
use common::middleware::request_id::RequestId;
use common::models::{Operation, OperationResult, ServiceKind, ServiceStatus, TestParams};
use common::response::ApiResponse;

use crate::page;
use crate::state::AppState;

/// 创建服务测试路由
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/api/services", get(list_services))
        .route("/api/test/{service}", post(test_service))
        .route("/api/list/{service}", get(list_resources))
        .route("/api/operations/{service}", post(run_operation))
        .route("/api/health", get(health_check))
}

/// 单页界面，每个已启用的服务一个标签页
pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(page::render(&state.manager.statuses()))
}

/// 列出已启用的服务及其可用状态
#[utoipa::path(
    get,
    path = "/api/services",
    tag = "services",
    responses(
        (status = 200, description = "已启用服务列表", body = ApiResponse<Vec<ServiceStatus>>)
    )
)]
pub async fn list_services(
    State(state): State<AppState>,
    request_id: Option<Extension<RequestId>>,
) -> Json<ApiResponse<Vec<ServiceStatus>>> {
    let started = Instant::now();
    Json(envelope(
        ApiResponse::ok(state.manager.statuses()),
        &state,
        request_id,
        started,
    ))
}

/// 执行测试事务（写入后读回）
#[utoipa::path(
    post,
    path = "/api/test/{service}",
    tag = "operations",
    params(
        ("service" = String, Path, description = "服务 ID（rabbitmq / valkey / mysql / postgres）")
    ),
    request_body(content = TestParams, description = "可选的测试参数"),
    responses(
        (status = 200, description = "测试成功", body = ApiResponse<OperationResult>),
        (status = 400, description = "参数无效"),
        (status = 404, description = "服务未启用或不可用"),
        (status = 502, description = "后端连接或操作失败", body = ApiResponse<OperationResult>)
    )
)]
pub async fn test_service(
    State(state): State<AppState>,
    Path(service): Path<String>,
    request_id: Option<Extension<RequestId>>,
    params: Option<Json<TestParams>>,
) -> Result<Response, AppError> {
    let params = params.map(|Json(p)| p).unwrap_or_default();
    params.validate()?;
    dispatch(&state, &service, params.into(), request_id).await
}

/// 列表查询参数
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// 关系型数据库：要分页查看的表，省略时列出所有表
    pub table: Option<String>,
    /// 每页行数或返回键数上限
    pub limit: Option<u32>,
    /// 行偏移量
    pub offset: Option<u32>,
    /// Valkey 键匹配模式
    pub pattern: Option<String>,
}

impl ListQuery {
    /// Maps the query onto the listing operation of a kind.
    fn into_operation(self, kind: ServiceKind) -> Operation {
        match kind {
            ServiceKind::MySql | ServiceKind::Postgres => match self.table {
                Some(table) => Operation::ShowTable {
                    table,
                    limit: self.limit.unwrap_or(50),
                    offset: self.offset.unwrap_or(0),
                },
                None => Operation::ListTables,
            },
            ServiceKind::RabbitMq => Operation::ListQueues,
            ServiceKind::Valkey => Operation::ListKeys {
                pattern: self.pattern.unwrap_or_else(|| "*".to_string()),
                limit: self.limit.unwrap_or(100),
            },
        }
    }
}

/// 列出资源：表、表数据、队列或键
#[utoipa::path(
    get,
    path = "/api/list/{service}",
    tag = "operations",
    params(
        ("service" = String, Path, description = "服务 ID"),
        ListQuery
    ),
    responses(
        (status = 200, description = "资源列表", body = ApiResponse<OperationResult>),
        (status = 404, description = "服务未启用或不可用"),
        (status = 502, description = "后端连接或操作失败", body = ApiResponse<OperationResult>)
    )
)]
pub async fn list_resources(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Query(query): Query<ListQuery>,
    request_id: Option<Extension<RequestId>>,
) -> Result<Response, AppError> {
    let kind = state.manager.resolve(&service)?.kind();
    dispatch(&state, &service, query.into_operation(kind), request_id).await
}

/// 执行单个服务操作
#[utoipa::path(
    post,
    path = "/api/operations/{service}",
    tag = "operations",
    params(
        ("service" = String, Path, description = "服务 ID")
    ),
    request_body = Operation,
    responses(
        (status = 200, description = "操作成功", body = ApiResponse<OperationResult>),
        (status = 400, description = "参数无效或服务不支持该操作"),
        (status = 404, description = "服务未启用或不可用"),
        (status = 502, description = "后端连接或操作失败", body = ApiResponse<OperationResult>)
    )
)]
pub async fn run_operation(
    State(state): State<AppState>,
    Path(service): Path<String>,
    request_id: Option<Extension<RequestId>>,
    Json(operation): Json<Operation>,
) -> Result<Response, AppError> {
    dispatch(&state, &service, operation, request_id).await
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let statuses = state.manager.statuses();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.service_name().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        services_enabled: statuses.len(),
        services_available: statuses.iter().filter(|s| s.available).count(),
    })
}

/// Runs an operation and wraps the outcome in the response envelope.
///
/// Lookup errors (unknown, disabled or unavailable service) are 404s raised
/// before anything runs.
async fn dispatch(
    state: &AppState,
    service: &str,
    operation: Operation,
    request_id: Option<Extension<RequestId>>,
) -> Result<Response, AppError> {
    let started = Instant::now();
    let handler = state.manager.resolve(service)?;
    let kind = handler.kind();
    let action = operation.action();

    let outcome = handler.run(operation).await;
    let (status, body) = ApiResponse::from_outcome(kind, action, outcome)?;
    let body = envelope(body, state, request_id, started);
    Ok((status, Json(body)).into_response())
}

fn envelope<T: Serialize>(
    response: ApiResponse<T>,
    state: &AppState,
    request_id: Option<Extension<RequestId>>,
    started: Instant,
) -> ApiResponse<T> {
    let response = response
        .with_service(state.service_name())
        .with_duration(started.elapsed().as_millis() as u64);
    match request_id {
        Some(Extension(id)) => response.with_request_id(id.0),
        None => response,
    }
}

/// 健康检查响应
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 服务名称
    pub service: String,
    /// 服务版本
    pub version: String,
    /// 当前时间戳
    pub timestamp: DateTime<Utc>,
    /// 已启用的服务数
    pub services_enabled: usize,
    /// 已解析到凭据的服务数
    pub services_available: usize,
}
