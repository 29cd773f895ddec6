use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};

use crate::{
    AppState,
    error::AppError,
    utils::{Claims, verify_token},
};

type BearerHeader = Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>;

fn claims_from_header(bearer: BearerHeader, state: &AppState) -> Option<Claims> {
    let TypedHeader(Authorization(bearer)) = bearer.ok()?;
    match verify_token(bearer.token(), &state.config) {
        Ok(claims) => Some(claims),
        Err(e) => {
            tracing::debug!("token rejected: {}", e);
            None
        }
    }
}

/// 校验 Bearer token，成功后把 [`Claims`] 放入请求扩展
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: BearerHeader,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let claims = claims_from_header(bearer, &state)
        .ok_or_else(|| AppError::Unauthorized("unauthorized".into()))?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// 有合法 token 时附带 [`Claims`]，没有也放行
pub async fn optional_auth(
    State(state): State<AppState>,
    bearer: BearerHeader,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(claims) = claims_from_header(bearer, &state) {
        req.extensions_mut().insert(claims);
    }
    next.run(req).await
}
