//! # Repository API Handlers
//!
//! Registration and status queries for tracked repositories.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::types::RepositoryResponse;
use crate::server::AppState;

/// Request payload for registering a repository
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterRepositoryRequest {
    /// Full repository name in `owner/repo` form
    #[schema(example = "octo/hello")]
    pub name: String,
}

/// Register a repository and start its backfill
#[utoipa::path(
    post,
    path = "/repositories",
    request_body = RegisterRepositoryRequest,
    responses(
        (status = 201, description = "Repository registered, backfill started", body = RepositoryResponse, headers(
            ("Location", description = "URL of the registered repository")
        )),
        (status = 400, description = "Invalid repository name", body = ApiError),
        (status = 409, description = "Repository already registered", body = ApiError),
        (status = 429, description = "Provider rate limit exceeded", body = ApiError),
        (status = 502, description = "Repository metadata unavailable", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "repositories"
)]
pub async fn register_repository(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRepositoryRequest>, JsonRejection>,
) -> Result<
    (
        StatusCode,
        [(header::HeaderName, String); 1],
        Json<RepositoryResponse>,
    ),
    ApiError,
> {
    let Json(request) = payload?;
    let record = state.synchronizer.register(&request.name).await?;
    let location = format!("/repositories/{}", record.id);

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(RepositoryResponse::from(record)),
    ))
}

/// List every tracked repository
#[utoipa::path(
    get,
    path = "/repositories",
    responses(
        (status = 200, description = "Tracked repositories", body = [RepositoryResponse]),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "repositories"
)]
pub async fn list_repositories(
    State(state): State<AppState>,
) -> Result<Json<Vec<RepositoryResponse>>, ApiError> {
    let records = state.synchronizer.repositories().await?;
    Ok(Json(
        records.into_iter().map(RepositoryResponse::from).collect(),
    ))
}

/// Get a repository and its synchronization state
#[utoipa::path(
    get,
    path = "/repositories/{id}",
    params(
        ("id" = Uuid, Path, description = "Repository public id")
    ),
    responses(
        (status = 200, description = "Repository found", body = RepositoryResponse),
        (status = 404, description = "Repository not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "repositories"
)]
pub async fn get_repository(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RepositoryResponse>, ApiError> {
    let record = state.synchronizer.repository(id).await?;
    Ok(Json(RepositoryResponse::from(record)))
}
