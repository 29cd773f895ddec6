use axum::{
    Extension, Json,
    extract::{Path, State},
};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    AppState,
    database::{Artwork, ViewEvent},
    error::AppError,
    routes::MessageResponse,
    utils::Claims,
};

use super::model::{
    self, ArtworkEngagement, DailyViews, Overview, VIEWS_WINDOW_DAYS,
};

/// 记录一次浏览并累加作品计数；登录用户会被关联到浏览记录
pub async fn log_view(
    State(state): State<AppState>,
    viewer: Option<Extension<Claims>>,
    Path(artwork_id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let raw = artwork_id.trim();
    if raw.is_empty() || raw == "undefined" {
        return Err(AppError::BadRequest("artworkId required".into()));
    }
    let artwork_id =
        Uuid::parse_str(raw).map_err(|_| AppError::BadRequest("invalid artworkId".into()))?;

    let view = ViewEvent::new(artwork_id, viewer.map(|Extension(claims)| claims.user_id));
    state
        .store
        .insert_view(&view)
        .await
        .map_err(|e| AppError::Internal(format!("failed to log view event: {e}")))?;

    // 计数器只是冗余字段，失败不影响本次请求
    if let Err(e) = state.store.increment_artwork_views(artwork_id).await {
        tracing::warn!("Failed to increment view counter for {}: {}", artwork_id, e);
    }

    Ok(Json(MessageResponse {
        message: "view logged and counter incremented",
    }))
}

pub async fn overview(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Overview>, AppError> {
    let artworks = state
        .store
        .list_artworks_by_owner(claims.user_id, false)
        .await?;
    let views = state.store.list_views_for_owner(claims.user_id, None).await?;
    Ok(Json(model::overview(artworks.len(), &views)))
}

pub async fn views_over_time(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<DailyViews>>, AppError> {
    let since = Utc::now() - Duration::days(VIEWS_WINDOW_DAYS);
    let views = state
        .store
        .list_views_for_owner(claims.user_id, Some(since))
        .await?;
    Ok(Json(model::views_over_time(&views, since)))
}

pub async fn most_viewed(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Artwork>>, AppError> {
    let artworks = state
        .store
        .list_artworks_by_owner(claims.user_id, true)
        .await?;
    Ok(Json(model::most_viewed(artworks)))
}

pub async fn engagement_split(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ArtworkEngagement>>, AppError> {
    let artworks = state
        .store
        .list_artworks_by_owner(claims.user_id, false)
        .await?;
    let views = state.store.list_views_for_owner(claims.user_id, None).await?;
    Ok(Json(model::engagement_split(&views, &artworks)))
}
