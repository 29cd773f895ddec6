use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{
    AppState,
    config::{Config, RouteLimits},
    middleware::{
        LimitError, RateLimiter, auth_middleware, log_errors, optional_auth, rate_limit,
        rate_limit::SWEEP_INTERVAL,
    },
    routes::{analytics, artwork, auth, portfolio},
};

// multipart 边界与文本字段的额外开销
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// 每条路由各自的限流器；同一实例的注册表不与其他路由共享
pub struct RouteLimiters {
    pub upload: Arc<RateLimiter>,
    pub public_list: Arc<RateLimiter>,
    pub single_item: Arc<RateLimiter>,
    pub mine: Arc<RateLimiter>,
    pub delete: Arc<RateLimiter>,
    pub auth: Arc<RateLimiter>,
    pub overview: Arc<RateLimiter>,
    pub views_over_time: Arc<RateLimiter>,
    pub most_viewed: Arc<RateLimiter>,
    pub engagement_split: Arc<RateLimiter>,
    pub log_view: Arc<RateLimiter>,
    pub public_profile: Arc<RateLimiter>,
    pub portfolio_get: Arc<RateLimiter>,
    pub portfolio_create: Arc<RateLimiter>,
    pub portfolio_mine: Arc<RateLimiter>,
}

impl RouteLimiters {
    pub fn from_config(limits: &RouteLimits) -> Result<Self, LimitError> {
        let build = |limit| RateLimiter::new(limit).map(Arc::new);
        Ok(Self {
            upload: build(limits.upload)?,
            public_list: build(limits.public_list)?,
            single_item: build(limits.single_item)?,
            mine: build(limits.mine)?,
            delete: build(limits.delete)?,
            auth: build(limits.auth)?,
            overview: build(limits.analytics)?,
            views_over_time: build(limits.analytics)?,
            most_viewed: build(limits.analytics)?,
            engagement_split: build(limits.analytics)?,
            log_view: build(limits.log_view)?,
            public_profile: build(limits.single_item)?,
            portfolio_get: build(limits.single_item)?,
            portfolio_create: build(limits.mine)?,
            portfolio_mine: build(limits.mine)?,
        })
    }

    fn all(&self) -> [&Arc<RateLimiter>; 15] {
        [
            &self.upload,
            &self.public_list,
            &self.single_item,
            &self.mine,
            &self.delete,
            &self.auth,
            &self.overview,
            &self.views_over_time,
            &self.most_viewed,
            &self.engagement_split,
            &self.log_view,
            &self.public_profile,
            &self.portfolio_get,
            &self.portfolio_create,
            &self.portfolio_mine,
        ]
    }

    /// 为每个限流器启动清理任务，`shutdown` 取消后全部退出
    pub fn spawn_sweepers(&self, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        self.all()
            .into_iter()
            .map(|limiter| limiter.spawn_sweeper(SWEEP_INTERVAL, shutdown.clone()))
            .collect()
    }
}

pub fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([header::CONTENT_LENGTH])
        .allow_credentials(true)
        .max_age(Duration::from_secs(12 * 3600))
}

async fn ping() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}

/// 组装全部路由。限流层总在认证层之外，被拒绝的请求不会进入认证与业务逻辑
pub fn create_router(state: AppState, limiters: &RouteLimiters) -> Router {
    let limit = |limiter: &Arc<RateLimiter>| from_fn_with_state(Arc::clone(limiter), rate_limit);
    let auth_layer = || from_fn_with_state(state.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route_layer(limit(&limiters.auth));

    let artwork_routes = Router::new()
        .route(
            "/upload",
            post(artwork::upload_artwork)
                .layer(DefaultBodyLimit::max(
                    state.config.max_upload_bytes().saturating_add(MULTIPART_OVERHEAD),
                ))
                .layer(auth_layer())
                .layer(limit(&limiters.upload)),
        )
        .route(
            "/public",
            get(artwork::list_public_artworks).layer(limit(&limiters.public_list)),
        )
        .route(
            "/mine",
            get(artwork::my_artworks)
                .layer(auth_layer())
                .layer(limit(&limiters.mine)),
        )
        .route(
            "/{id}",
            get(artwork::get_artwork)
                .layer(limit(&limiters.single_item))
                .merge(
                    delete(artwork::delete_artwork)
                        .layer(auth_layer())
                        .layer(limit(&limiters.delete)),
                ),
        );

    let analytics_routes = Router::new()
        .route(
            "/overview",
            get(analytics::overview)
                .layer(auth_layer())
                .layer(limit(&limiters.overview)),
        )
        .route(
            "/views-over-time",
            get(analytics::views_over_time)
                .layer(auth_layer())
                .layer(limit(&limiters.views_over_time)),
        )
        .route(
            "/most-viewed",
            get(analytics::most_viewed)
                .layer(auth_layer())
                .layer(limit(&limiters.most_viewed)),
        )
        .route(
            "/engagement-split",
            get(analytics::engagement_split)
                .layer(auth_layer())
                .layer(limit(&limiters.engagement_split)),
        )
        .route(
            "/log-view/{artwork_id}",
            post(analytics::log_view)
                .layer(from_fn_with_state(state.clone(), optional_auth))
                .layer(limit(&limiters.log_view)),
        );

    let portfolio_routes = Router::new()
        .route(
            "/",
            post(portfolio::create_portfolio)
                .layer(auth_layer())
                .layer(limit(&limiters.portfolio_create)),
        )
        .route(
            "/me",
            get(portfolio::my_portfolios)
                .layer(auth_layer())
                .layer(limit(&limiters.portfolio_mine)),
        )
        .route(
            "/{id}",
            get(portfolio::get_portfolio).layer(limit(&limiters.portfolio_get)),
        );

    Router::new()
        .route("/ping", get(ping))
        .nest("/auth", auth_routes)
        .nest("/artworks", artwork_routes)
        .nest("/analytics", analytics_routes)
        .route(
            "/portfolio/{name}",
            get(artwork::public_profile).layer(limit(&limiters.public_profile)),
        )
        .nest("/api/portfolios", portfolio_routes)
        .layer(from_fn(log_errors))
        .layer(cors_layer(&state.config))
        .with_state(state)
}
