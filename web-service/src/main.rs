//! Cloud Foundry 服务连通性测试 Web 服务
//!
//! 提供以下功能：
//! - 每个已启用服务一个标签页的测试界面
//! - 测试事务、资源列表与单个操作的 JSON API
//! - OpenAPI 文档

mod page;
mod routes;
mod state;

use anyhow::Context;
use axum::{middleware, routing::get, Json, Router};
use common::config::{load_dotenv, AppConfig, ServicesConfig};
use common::discovery::{discover, ProcessEnv};
use common::middleware::request_id::request_id_middleware;
use handlers::HandlerManager;
use state::AppState;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

const SERVICE_NAME: &str = "web-service";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "服务连通性测试 API",
        version = "0.1.0",
        description = "RabbitMQ / Valkey / MySQL / PostgreSQL 连通性测试"
    ),
    paths(
        routes::list_services,
        routes::test_service,
        routes::list_resources,
        routes::run_operation,
        routes::health_check,
    ),
    components(schemas(
        common::models::ServiceKind,
        common::models::ServiceStatus,
        common::models::ConnectionDescriptor,
        common::models::TestParams,
        common::models::Operation,
        common::models::OperationResult,
        common::models::TableListing,
        common::models::TableInfo,
        common::models::TableData,
        common::models::QueueListing,
        common::models::QueueInfo,
        common::models::KeyListing,
        common::models::KeyInfo,
        routes::HealthResponse,
    )),
    tags(
        (name = "services", description = "服务发现端点"),
        (name = "operations", description = "服务操作端点"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 先加载 .env 文件（如果存在）
    load_dotenv();

    // 初始化日志追踪
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // 加载配置
    let config = AppConfig::load_with_service(SERVICE_NAME);
    let services = ServicesConfig::load(&config.services_config_path)
        .context("failed to load services configuration")?;

    // 发现服务绑定并创建处理器
    let registry = discover(&ProcessEnv);
    let manager = HandlerManager::new(services, registry);
    let state = AppState::new(config.clone(), manager);

    // 创建路由
    let app = create_router(state);

    // 启动服务
    let addr = config.bind_address();
    info!(service = SERVICE_NAME, address = %addr, "启动服务");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定地址失败: {addr}"))?;
    axum::serve(listener, app).await.context("服务启动失败")?;
    Ok(())
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
