use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use artfolio::{
    AppState,
    config::Config,
    database::PgStore,
    media::CloudinaryClient,
    router::{RouteLimiters, create_router},
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    // 限流参数非法时直接退出
    let limiters = RouteLimiters::from_config(&config.rate_limits)
        .expect("Invalid rate limit configuration");

    let store = PgStore::connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");
    let media = CloudinaryClient::new(config.cloudinary.clone());

    let state = AppState {
        store: Arc::new(store),
        media: Arc::new(media),
        config: config.clone(),
    };

    let shutdown = CancellationToken::new();
    let sweepers = limiters.spawn_sweepers(&shutdown);

    let app = create_router(state, &limiters);

    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);

    let signal = shutdown.clone();
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
        tracing::info!("Shutdown signal received");
        signal.cancel();
    })
    .await
    .expect("Failed to start server");

    // 服务退出后停止所有清理任务
    shutdown.cancel();
    for sweeper in sweepers {
        let _ = sweeper.await;
    }
}
