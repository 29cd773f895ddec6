use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    AppState,
    database::Portfolio,
    error::AppError,
    routes::auth::invalid_input,
    utils::Claims,
};

use super::model::{CreatePortfolioRequest, parse_portfolio_id};

pub async fn create_portfolio(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<CreatePortfolioRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload.map_err(invalid_input)?;
    req.validate()?;

    let now = Utc::now();
    let portfolio = Portfolio {
        id: Uuid::new_v4(),
        user_id: claims.user_id,
        title: req.title.trim().to_string(),
        description: req.description,
        image_url: req.image_url,
        tags: req.tags,
        views: 0,
        created_at: now,
        updated_at: now,
    };
    state.store.insert_portfolio(&portfolio).await?;

    Ok((StatusCode::CREATED, Json(portfolio)))
}

pub async fn my_portfolios(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Portfolio>>, AppError> {
    Ok(Json(
        state.store.list_portfolios_by_owner(claims.user_id).await?,
    ))
}

pub async fn get_portfolio(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Portfolio>, AppError> {
    let id = parse_portfolio_id(&id)?;
    let portfolio = state
        .store
        .find_portfolio(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Portfolio not found".into()))?;

    // 浏览数异步累加，丢失一次更新可以接受
    let store = Arc::clone(&state.store);
    tokio::spawn(async move {
        if let Err(e) = store.increment_portfolio_views(id).await {
            tracing::warn!("failed to increment views for portfolio {}: {}", id, e);
        }
    });

    Ok(Json(portfolio))
}
