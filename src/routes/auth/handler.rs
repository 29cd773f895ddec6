use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    AppState,
    database::{User, models::DEFAULT_ROLE},
    error::AppError,
    routes::MessageResponse,
    utils::{generate_token, hash_password, slugify, verify_password},
};

use super::model::{
    LoginRequest, LoginResponse, SignupRequest, SignupResponse, UserSummary,
};

pub(crate) fn invalid_input(rejection: JsonRejection) -> AppError {
    AppError::BadRequest(format!("Invalid input: {}", rejection.body_text()))
}

fn issue_token(user: &User, state: &AppState) -> Result<String, AppError> {
    generate_token(user.id, &user.email, &user.role, &state.config)
        .map_err(|e| AppError::Internal(format!("JWT generation failed: {e}")))
}

pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload.map_err(invalid_input)?;
    req.validate()?;

    let password_hash = hash_password(&req.password, state.config.bcrypt_cost)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {e}")))?;

    let id = Uuid::new_v4();
    let full_name = req.full_name.trim().to_string();
    // 名字里没有可用字符时用 id 前缀兜底，保证 slug 非空
    let mut slug = slugify(&full_name);
    if slug.is_empty() {
        slug = id.simple().to_string()[..8].to_string();
    }

    let now = Utc::now();
    let user = User {
        id,
        full_name,
        email: req.email.trim().to_string(),
        password_hash,
        role: DEFAULT_ROLE.to_string(),
        slug,
        portfolio_views: 0,
        created_at: now,
        updated_at: now,
    };

    state.store.insert_user(&user).await.map_err(|e| match AppError::from(e) {
        AppError::Conflict(_) => AppError::Conflict("Email or username already exists".into()),
        other => other,
    })?;
    tracing::info!("new user signed up: {}", user.id);

    let token = issue_token(&user, &state)?;
    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "Signup successful",
            token,
            user: UserSummary::from(&user),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload.map_err(invalid_input)?;
    let invalid = || AppError::Unauthorized("Invalid credentials".into());

    let user = state
        .store
        .find_user_by_email(req.email.trim())
        .await?
        .ok_or_else(invalid)?;

    // 哈希格式损坏同样按凭证无效处理
    if !verify_password(&req.password, &user.password_hash).unwrap_or(false) {
        return Err(invalid());
    }

    let token = issue_token(&user, &state)?;
    Ok(Json(LoginResponse {
        token,
        user: UserSummary::from(&user),
    }))
}

/// token 无状态，客户端自行丢弃即可
pub async fn logout() -> impl IntoResponse {
    Json(MessageResponse {
        message: "Logged out successfully",
    })
}
