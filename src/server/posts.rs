//! Per-post endpoints: inspect, publish and refresh.

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;

use super::AppState;
use super::error::ApiError;
use crate::discourse::RemoteClient;
use crate::publish::{PublishOptions, PublishReport};
use crate::refresh::RefreshOutcome;
use crate::types::{PostId, SyncedPost};

/// Body of `POST /api/v1/posts/{id}/publish`.
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub title: String,
    pub raw: String,
    #[serde(flatten)]
    pub options: PublishOptions,
}

pub async fn post_handler<C>(
    State(app_state): State<AppState<C>>,
    Path(id): Path<u64>,
) -> Result<Json<SyncedPost>, ApiError>
where
    C: RemoteClient + Send + Sync + 'static,
{
    let post_id = PostId(id);
    app_state
        .store()
        .load(post_id)?
        .map(Json)
        .ok_or(ApiError::NotFound(post_id))
}

pub async fn publish_handler<C>(
    State(app_state): State<AppState<C>>,
    Path(id): Path<u64>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<PublishReport>, ApiError>
where
    C: RemoteClient + Send + Sync + 'static,
{
    let report = app_state
        .publisher()
        .publish(PostId(id), &request.title, &request.raw, request.options)
        .await?;
    Ok(Json(report))
}

pub async fn refresh_handler<C>(
    State(app_state): State<AppState<C>>,
    Path(id): Path<u64>,
) -> Result<Json<RefreshOutcome>, ApiError>
where
    C: RemoteClient + Send + Sync + 'static,
{
    let outcome = app_state.refresher().maybe_refresh(PostId(id)).await?;
    Ok(Json(outcome))
}
