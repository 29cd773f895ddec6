use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    AppState,
    database::Artwork,
    error::AppError,
    middleware::ArtworkUpload,
    routes::MessageResponse,
    utils::{Claims, slugify},
};

use super::model::{ArtworkList, Profile, PublicProfileResponse, UploadResponse, parse_artwork_id};

pub async fn upload_artwork(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    upload: ArtworkUpload,
) -> Result<impl IntoResponse, AppError> {
    let ArtworkUpload { title, file } = upload;
    let stored = state.media.upload(file, &state.config.upload_folder).await?;

    let artwork = Artwork {
        id: Uuid::new_v4(),
        user_id: claims.user_id,
        slug: slugify(&title),
        title,
        url: stored.secure_url,
        public_id: stored.public_id,
        views: 0,
        is_public: true,
        created_at: Utc::now(),
    };

    if let Err(e) = state.store.insert_artwork(&artwork).await {
        // 入库失败时回收已上传的资源
        if let Err(cleanup) = state.media.destroy(&artwork.public_id).await {
            tracing::warn!("failed to clean up media {}: {}", artwork.public_id, cleanup);
        }
        return Err(e.into());
    }
    tracing::info!("artwork {} uploaded by {}", artwork.id, claims.user_id);

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "upload successful",
            artwork,
        }),
    ))
}

pub async fn list_public_artworks(
    State(state): State<AppState>,
) -> Result<Json<Vec<Artwork>>, AppError> {
    Ok(Json(state.store.list_public_artworks().await?))
}

/// 返回作品并异步累加浏览数；累加失败只记日志
pub async fn get_artwork(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Artwork>, AppError> {
    let id = parse_artwork_id(&id)?;
    let artwork = state
        .store
        .find_public_artwork(id)
        .await?
        .ok_or_else(|| AppError::NotFound("artwork not found".into()))?;

    let store = Arc::clone(&state.store);
    tokio::spawn(async move {
        if let Err(e) = store.increment_artwork_views(id).await {
            tracing::warn!("failed to increment views for artwork {}: {}", id, e);
        }
    });

    Ok(Json(artwork))
}

pub async fn my_artworks(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ArtworkList>, AppError> {
    let artworks = state
        .store
        .list_artworks_by_owner(claims.user_id, false)
        .await?;
    Ok(Json(artworks.into()))
}

pub async fn delete_artwork(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = parse_artwork_id(&id)?;
    let artwork = state
        .store
        .find_owned_artwork(id, claims.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("artwork not found or you do not own it".into()))?;

    // 先删托管资源，失败则保留数据库记录
    if !artwork.public_id.is_empty() {
        state.media.destroy(&artwork.public_id).await?;
    }

    if !state.store.delete_artwork(id, claims.user_id).await? {
        return Err(AppError::NotFound("artwork not found or you do not own it".into()));
    }
    tracing::info!("artwork {} deleted by {}", id, claims.user_id);

    Ok(Json(MessageResponse {
        message: "artwork deleted successfully",
    }))
}

/// 按艺术家名字（`-` 代替空格）查看其公开作品
pub async fn public_profile(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<PublicProfileResponse>, AppError> {
    let normalized = name.replace('-', " ");
    let user = state
        .store
        .find_user_by_full_name(normalized.trim())
        .await?
        .ok_or_else(|| AppError::NotFound("artist not found".into()))?;

    let artworks = state.store.list_artworks_by_owner(user.id, true).await?;
    Ok(Json(PublicProfileResponse {
        profile: Profile {
            name: user.full_name,
        },
        list: artworks.into(),
    }))
}
