//! # Server Configuration
//!
//! Router assembly, request trace context and the OpenAPI document.

use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::handlers;
use crate::sync::RepositorySynchronizer;
use crate::telemetry::{TraceContext, with_trace_context};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub synchronizer: Arc<RepositorySynchronizer>,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route(
            "/repositories",
            get(handlers::repositories::list_repositories)
                .post(handlers::repositories::register_repository),
        )
        .route(
            "/repositories/{id}",
            get(handlers::repositories::get_repository),
        )
        .route(
            "/repositories/{id}/commits",
            get(handlers::commits::list_commits),
        )
        .route(
            "/repositories/{id}/top-authors",
            get(handlers::commits::top_authors),
        )
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(trace_context))
        .layer(TraceLayer::new_for_http())
}

/// Runs every request inside a task-local trace context.
async fn trace_context(request: Request, next: Next) -> Response {
    let context = TraceContext::from_headers(request.headers());
    with_trace_context(context, next.run(request)).await
}

/// Serves the API until `shutdown` is cancelled.
pub async fn run_server(state: AppState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = state.config.bind_addr()?;
    let profile = state.config.profile.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::repositories::register_repository,
        crate::handlers::repositories::list_repositories,
        crate::handlers::repositories::get_repository,
        crate::handlers::commits::list_commits,
        crate::handlers::commits::top_authors,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::repository::SyncStatus,
            crate::handlers::HealthResponse,
            crate::handlers::repositories::RegisterRepositoryRequest,
            crate::handlers::types::RepositoryResponse,
            crate::handlers::types::CommitResponse,
            crate::handlers::types::CommitsResponse,
            crate::handlers::types::PageInfo,
            crate::repositories::AuthorCommitCount,
            crate::error::ApiError,
        )
    ),
    tags(
        (name = "root", description = "Service information"),
        (name = "repositories", description = "Repository registration and sync status"),
        (name = "commits", description = "Synchronized commit history"),
    ),
    info(
        title = "Repository Sync API",
        description = "Tracks remote repositories and serves their synchronized commit history",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::GitHubClient;
    use crate::sync::{SyncContext, SyncSettings};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{ConnectOptions, Database};
    use tower::ServiceExt;

    async fn setup_test_app() -> Router {
        let mut options = ConnectOptions::new("sqlite::memory:");
        options.max_connections(1);
        let db = Database::connect(options).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        let db = Arc::new(db);

        let provider = GitHubClient::new("http://127.0.0.1:9", None).unwrap();
        let ctx = SyncContext::from_database(db.clone(), Arc::new(provider), SyncSettings::default());
        let synchronizer = RepositorySynchronizer::new(ctx, CancellationToken::new());

        create_app(AppState {
            config: Arc::new(AppConfig::default()),
            db,
            synchronizer: Arc::new(synchronizer),
        })
    }

    #[tokio::test]
    async fn test_root_returns_service_info() {
        let app = setup_test_app().await;

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let info: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(info["service"], "repo-sync");
    }

    #[tokio::test]
    async fn test_openapi_document_lists_routes() {
        let app = setup_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&body).unwrap();
        for path in [
            "/repositories",
            "/repositories/{id}",
            "/repositories/{id}/commits",
            "/repositories/{id}/top-authors",
        ] {
            assert!(doc["paths"].get(path).is_some(), "{path}");
        }
    }

    #[tokio::test]
    async fn test_trace_id_header_is_propagated_to_errors() {
        let app = setup_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/repositories/{}", uuid::Uuid::new_v4()))
                    .header("x-request-id", "req-1234")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(error["trace_id"], "req-1234");
    }
}
