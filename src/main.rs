use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use companion_backend::{
    AppState,
    clock::SystemClock,
    config::Config,
    realtime::RedisBus,
    routes,
    store::PgStore,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
#[cfg(debug_assertions)]
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env()?;

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'companion_backend';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    // 设置 Redis 客户端，用于实时推送
    let redis_client = Arc::new(redis::Client::open(config.redis_url.clone())?);

    let store = Arc::new(PgStore::new(Arc::new(pool)));
    let state = AppState::assemble(
        config.clone(),
        store,
        Arc::new(RedisBus::new(redis_client)),
        Arc::new(SystemClock),
    );

    // 定时把已过期的活动落为 completed
    let coordinator = state.coordinator.clone();
    let sweep_every = config.completion_sweep_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_every);
        loop {
            ticker.tick().await;
            match coordinator.complete_elapsed().await {
                Ok(0) => {}
                Ok(n) => tracing::info!(completed = n, "completion sweep finished"),
                Err(e) => tracing::error!("completion sweep failed: {}", e),
            }
        }
    });

    let router = routes::router(state);

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(CorsLayer::permissive())
    };

    // 启动服务器
    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr).await?,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
