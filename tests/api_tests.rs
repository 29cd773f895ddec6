use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use artfolio::{
    AppState,
    config::{CloudinaryConfig, Config, RouteLimit, RouteLimits},
    database::{
        Artwork, ArtworkStore, MemoryStore, Portfolio, PortfolioStore, StoreError, User,
        UserStore, ViewEvent, ViewStore,
    },
    media::{MediaError, MediaFile, MediaHost, StoredMedia},
    router::{RouteLimiters, create_router},
};

const BOUNDARY: &str = "artfolio-test-boundary";

#[derive(Default)]
struct FakeMedia {
    uploads: Mutex<Vec<String>>,
    destroyed: Mutex<Vec<String>>,
    fail_destroy: AtomicBool,
}

#[async_trait]
impl MediaHost for FakeMedia {
    async fn upload(&self, file: MediaFile, folder: &str) -> Result<StoredMedia, MediaError> {
        let public_id = format!("{}/{}", folder, Uuid::new_v4().simple());
        self.uploads.lock().unwrap().push(file.file_name);
        Ok(StoredMedia {
            secure_url: format!("https://media.example/{public_id}.png"),
            public_id,
        })
    }

    async fn destroy(&self, public_id: &str) -> Result<(), MediaError> {
        if self.fail_destroy.load(Ordering::SeqCst) {
            return Err(MediaError::Rejected {
                status: 503,
                body: "media host unavailable".into(),
            });
        }
        self.destroyed.lock().unwrap().push(public_id.to_string());
        Ok(())
    }
}

/// 内存存储外包一层，可让作品写入失败
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_artwork_insert: AtomicBool,
}

#[async_trait]
impl UserStore for FlakyStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.inner.insert_user(user).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.inner.find_user_by_email(email).await
    }

    async fn find_user_by_full_name(&self, full_name: &str) -> Result<Option<User>, StoreError> {
        self.inner.find_user_by_full_name(full_name).await
    }
}

#[async_trait]
impl ArtworkStore for FlakyStore {
    async fn insert_artwork(&self, artwork: &Artwork) -> Result<(), StoreError> {
        if self.fail_artwork_insert.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.insert_artwork(artwork).await
    }

    async fn list_public_artworks(&self) -> Result<Vec<Artwork>, StoreError> {
        self.inner.list_public_artworks().await
    }

    async fn find_public_artwork(&self, id: Uuid) -> Result<Option<Artwork>, StoreError> {
        self.inner.find_public_artwork(id).await
    }

    async fn list_artworks_by_owner(
        &self,
        owner: Uuid,
        public_only: bool,
    ) -> Result<Vec<Artwork>, StoreError> {
        self.inner.list_artworks_by_owner(owner, public_only).await
    }

    async fn find_owned_artwork(
        &self,
        id: Uuid,
        owner: Uuid,
    ) -> Result<Option<Artwork>, StoreError> {
        self.inner.find_owned_artwork(id, owner).await
    }

    async fn delete_artwork(&self, id: Uuid, owner: Uuid) -> Result<bool, StoreError> {
        self.inner.delete_artwork(id, owner).await
    }

    async fn increment_artwork_views(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.increment_artwork_views(id).await
    }
}

#[async_trait]
impl ViewStore for FlakyStore {
    async fn insert_view(&self, view: &ViewEvent) -> Result<(), StoreError> {
        self.inner.insert_view(view).await
    }

    async fn list_views_for_owner(
        &self,
        owner: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ViewEvent>, StoreError> {
        self.inner.list_views_for_owner(owner, since).await
    }
}

#[async_trait]
impl PortfolioStore for FlakyStore {
    async fn insert_portfolio(&self, portfolio: &Portfolio) -> Result<(), StoreError> {
        self.inner.insert_portfolio(portfolio).await
    }

    async fn list_portfolios_by_owner(&self, owner: Uuid) -> Result<Vec<Portfolio>, StoreError> {
        self.inner.list_portfolios_by_owner(owner).await
    }

    async fn find_portfolio(&self, id: Uuid) -> Result<Option<Portfolio>, StoreError> {
        self.inner.find_portfolio(id).await
    }

    async fn increment_portfolio_views(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.increment_portfolio_views(id).await
    }
}

struct TestApp {
    router: Router,
    store: Arc<FlakyStore>,
    media: Arc<FakeMedia>,
}

fn generous_limits() -> RouteLimits {
    let wide = RouteLimit::new(1000.0, 1000);
    RouteLimits {
        upload: wide,
        public_list: wide,
        single_item: wide,
        mine: wide,
        delete: wide,
        auth: wide,
        analytics: wide,
        log_view: wide,
    }
}

fn test_config(rate_limits: RouteLimits) -> Config {
    Config {
        database_url: "postgres://unused".into(),
        jwt_secret: "integration-secret".into(),
        jwt_expiration_secs: 3600,
        server_host: "127.0.0.1".into(),
        server_port: 0,
        cloudinary: CloudinaryConfig {
            cloud_name: "demo".into(),
            api_key: "key".into(),
            api_secret: "secret".into(),
        },
        upload_folder: "artfolio".into(),
        max_upload_mb: 1,
        bcrypt_cost: 4,
        cors_origins: vec!["http://localhost:3001".into()],
        rate_limits,
    }
}

fn spawn_app(rate_limits: RouteLimits) -> TestApp {
    let config = test_config(rate_limits);
    let store = Arc::new(FlakyStore::default());
    let media = Arc::new(FakeMedia::default());
    let limiters = RouteLimiters::from_config(&config.rate_limits).expect("valid limits");
    let state = AppState {
        store: store.clone(),
        media: media.clone(),
        config,
    };
    TestApp {
        router: create_router(state, &limiters),
        store,
        media,
    }
}

impl TestApp {
    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(req).await.expect("infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn signup(&self, name: &str, email: &str) -> String {
        let (status, body) = self
            .send(json_request(
                "POST",
                "/auth/signup",
                json!({"fullName": name, "email": email, "password": "secret123"}),
                "198.51.100.1",
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["token"].as_str().unwrap().to_string()
    }

    async fn upload(&self, token: &str, title: &str, ip: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri("/artworks/upload")
            .header("x-forwarded-for", ip)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(
                Some(title),
                Some(("image/png", b"\x89PNG fake image bytes")),
            )))
            .unwrap();
        self.send(req).await
    }
}

fn json_request(method: &str, uri: &str, body: Value, ip: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", ip)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", "203.0.113.9");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn multipart_body(title: Option<&str>, file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(title) = title {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\n{title}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"art.png\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

#[tokio::test]
async fn ping_responds() {
    let app = spawn_app(generous_limits());
    let (status, body) = app.send(request("GET", "/ping", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "pong"}));
}

#[tokio::test]
async fn auth_routes_share_one_limiter_and_reject_before_handler() {
    let app = spawn_app(RouteLimits::default());
    let ip = "203.0.113.5, 10.0.0.1";

    // 默认 auth 限流 0.5/2：两次放行，第三次拒绝
    for _ in 0..2 {
        let (status, _) = app
            .send(json_request("POST", "/auth/logout", json!({}), ip))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = app
        .send(json_request(
            "POST",
            "/auth/signup",
            json!({"fullName": "Late Comer", "email": "late@example.com", "password": "secret123"}),
            ip,
        ))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body, json!({"error": "Too many requests. Slow down."}));

    // 被拒绝的请求没有写入任何数据
    let (status, _) = app
        .send(json_request(
            "POST",
            "/auth/login",
            json!({"email": "late@example.com", "password": "secret123"}),
            "203.0.113.77",
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // 同一代理后的其他客户端不受影响
    let (status, _) = app
        .send(json_request("POST", "/auth/logout", json!({}), "203.0.113.6"))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn limiter_runs_before_authentication() {
    let app = spawn_app(RouteLimits::default());

    // mine 限流 1/3，未带 token
    for _ in 0..3 {
        let (status, _) = app.send(request("GET", "/artworks/mine", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, _) = app.send(request("GET", "/artworks/mine", None)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // 其他路由有独立的限流器
    let (status, _) = app.send(request("GET", "/artworks/public", None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn signup_login_and_duplicates() {
    let app = spawn_app(generous_limits());
    app.signup("Ada Lovelace", "ada@example.com").await;

    let (status, body) = app
        .send(json_request(
            "POST",
            "/auth/signup",
            json!({"fullName": "Ada Lovelace", "email": "ada@example.com", "password": "secret123"}),
            "198.51.100.1",
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Email or username already exists");

    let (status, body) = app
        .send(json_request(
            "POST",
            "/auth/login",
            json!({"email": "ada@example.com", "password": "secret123"}),
            "198.51.100.1",
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["slug"], "ada-lovelace");
    assert_eq!(body["user"]["role"], "user");
    assert!(body["token"].as_str().is_some());

    let (status, body) = app
        .send(json_request(
            "POST",
            "/auth/login",
            json!({"email": "ada@example.com", "password": "wrong-password"}),
            "198.51.100.1",
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");
}

#[tokio::test]
async fn signup_rejects_invalid_input() {
    let app = spawn_app(generous_limits());
    let (status, body) = app
        .send(json_request(
            "POST",
            "/auth/signup",
            json!({"fullName": "Ada", "email": "not-an-email", "password": "secret123"}),
            "198.51.100.1",
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid input"));

    let (status, _) = app
        .send(json_request(
            "POST",
            "/auth/signup",
            json!({"email": "ada@example.com"}),
            "198.51.100.1",
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_list_fetch_and_delete() {
    let app = spawn_app(generous_limits());
    let token = app.signup("Frida Kahlo", "frida@example.com").await;

    let (status, body) = app.upload(&token, "Self Portrait", "192.0.2.10").await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["message"], "upload successful");
    assert_eq!(body["artwork"]["slug"], "self-portrait");
    assert_eq!(body["artwork"]["isPublic"], true);
    let id = body["artwork"]["id"].as_str().unwrap().to_string();
    assert_eq!(app.media.uploads.lock().unwrap().len(), 1);

    let (status, body) = app.send(request("GET", "/artworks/public", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = app
        .send(request("GET", &format!("/artworks/{id}"), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Self Portrait");

    // 浏览数是异步累加的
    let artwork_id = Uuid::parse_str(&id).unwrap();
    let mut views = 0;
    for _ in 0..50 {
        views = app
            .store
            .find_public_artwork(artwork_id)
            .await
            .unwrap()
            .map(|a| a.views)
            .unwrap_or_default();
        if views == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(views, 1);

    let (status, body) = app
        .send(request("GET", "/artworks/mine", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (status, body) = app.send(request("GET", "/portfolio/frida-kahlo", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["profile"]["name"], "Frida Kahlo");
    assert_eq!(body["count"], 1);

    let other = app.signup("Someone Else", "else@example.com").await;
    let (status, _) = app
        .send(request("DELETE", &format!("/artworks/{id}"), Some(&other)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .send(request("DELETE", &format!("/artworks/{id}"), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "artwork deleted successfully");
    assert_eq!(app.media.destroyed.lock().unwrap().len(), 1);

    let (status, _) = app
        .send(request("GET", &format!("/artworks/{id}"), None))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_validation_and_rate_limit() {
    let mut limits = generous_limits();
    limits.upload = RouteLimit::new(0.2, 1);
    let app = spawn_app(limits);
    let token = app.signup("Claude Monet", "monet@example.com").await;

    let req = Request::builder()
        .method("POST")
        .uri("/artworks/upload")
        .header("x-forwarded-for", "192.0.2.20")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(
            Some("Notes"),
            Some(("application/pdf", b"%PDF-1.4")),
        )))
        .unwrap();
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid file type");
    assert_eq!(body["fileType"], "application/pdf");

    // 每个客户端 5 秒一次
    let (status, _) = app.upload(&token, "Water Lilies", "192.0.2.21").await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app.upload(&token, "Haystacks", "192.0.2.21").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(app.media.uploads.lock().unwrap().len(), 1);

    let (status, body) = app.upload("not-a-token", "Sneaky", "192.0.2.22").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn log_view_and_analytics() {
    let app = spawn_app(generous_limits());
    let token = app.signup("Hokusai", "hokusai@example.com").await;
    let viewer = app.signup("Curious Viewer", "viewer@example.com").await;

    let (_, body) = app.upload(&token, "The Great Wave", "192.0.2.30").await;
    let wave = body["artwork"]["id"].as_str().unwrap().to_string();
    let (_, body) = app.upload(&token, "Red Fuji", "192.0.2.30").await;
    let fuji = body["artwork"]["id"].as_str().unwrap().to_string();

    for _ in 0..2 {
        let (status, _) = app
            .send(request("POST", &format!("/analytics/log-view/{wave}"), None))
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = app
        .send(request(
            "POST",
            &format!("/analytics/log-view/{fuji}"),
            Some(&viewer),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "view logged and counter incremented");
    assert_eq!(app.store.inner.view_count().await, 3);

    let (status, body) = app
        .send(request("POST", "/analytics/log-view/undefined", None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "artworkId required");

    let (status, body) = app
        .send(request("GET", "/analytics/overview", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalArtworks"], 2);
    assert_eq!(body["totalViews"], 3);
    assert_eq!(
        body["viewerSplit"],
        json!([{"_id": "authenticated", "count": 1}, {"_id": "public", "count": 2}])
    );

    let (_, body) = app
        .send(request("GET", "/analytics/engagement-split", Some(&token)))
        .await;
    assert_eq!(body[0]["title"], "The Great Wave");
    assert_eq!(body[0]["views"], 2);

    let (_, body) = app
        .send(request("GET", "/analytics/most-viewed", Some(&token)))
        .await;
    assert_eq!(body[0]["title"], "The Great Wave");

    let (_, body) = app
        .send(request("GET", "/analytics/views-over-time", Some(&token)))
        .await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["views"], 3);

    let (status, _) = app
        .send(request("GET", "/analytics/overview", None))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn portfolios_roundtrip() {
    let app = spawn_app(generous_limits());
    let token = app.signup("Georgia O'Keeffe", "georgia@example.com").await;

    let req = Request::builder()
        .method("POST")
        .uri("/api/portfolios")
        .header("x-forwarded-for", "192.0.2.40")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"title": "Flowers", "tags": ["botanical"]}).to_string(),
        ))
        .unwrap();
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .send(request("GET", "/api/portfolios/me", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = app
        .send(request("GET", &format!("/api/portfolios/{id}"), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tags"], json!(["botanical"]));

    let (status, body) = app
        .send(request("GET", "/api/portfolios/not-a-uuid", None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid ID");
}

#[tokio::test]
async fn malformed_ids_are_rejected() {
    let app = spawn_app(generous_limits());

    let (status, body) = app.send(request("GET", "/artworks/not-a-uuid", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid artwork id");

    let (status, body) = app
        .send(request("POST", "/analytics/log-view/not-a-uuid", None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid artworkId");
    assert_eq!(app.store.inner.view_count().await, 0);
}

#[tokio::test]
async fn failed_media_destroy_keeps_artwork() {
    let app = spawn_app(generous_limits());
    let token = app.signup("Paul Klee", "klee@example.com").await;
    let (_, body) = app.upload(&token, "Senecio", "192.0.2.50").await;
    let id = body["artwork"]["id"].as_str().unwrap().to_string();

    app.media.fail_destroy.store(true, Ordering::SeqCst);
    let (status, body) = app
        .send(request("DELETE", &format!("/artworks/{id}"), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");

    let kept = app
        .store
        .find_public_artwork(Uuid::parse_str(&id).unwrap())
        .await
        .unwrap();
    assert!(kept.is_some());
    assert!(app.media.destroyed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_insert_destroys_uploaded_media() {
    let app = spawn_app(generous_limits());
    let token = app.signup("Egon Schiele", "schiele@example.com").await;

    app.store.fail_artwork_insert.store(true, Ordering::SeqCst);
    let (status, _) = app.upload(&token, "Self Seer", "192.0.2.60").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    assert_eq!(app.media.uploads.lock().unwrap().len(), 1);
    let destroyed = app.media.destroyed.lock().unwrap().clone();
    assert_eq!(destroyed.len(), 1);
    assert!(destroyed[0].starts_with("artfolio/"));
    assert!(app.store.list_public_artworks().await.unwrap().is_empty());
}
