//! 主应用程序入口
//!
//! 读取配置、连接存储，组装应用层服务后启动 Axum Web API 服务。

use std::{env, sync::Arc};

use application::{
    CategoryService, CategoryServiceDependencies, Clock, ConnectionRegistry, DashboardService,
    DashboardServiceDependencies, ListingService, ListingServiceDependencies,
    LocalConnectionRegistry, MessageBroadcaster, MessagingService, MessagingServiceDependencies,
    ReviewService, ReviewServiceDependencies, SystemClock, UserService, UserServiceDependencies,
};
use config::AppConfig;
use infrastructure::Infrastructure;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

fn load_config() -> anyhow::Result<AppConfig> {
    let production = env::var("REMARKET_ENV").is_ok_and(|value| value == "production");
    let config = if production {
        let config = AppConfig::from_env()?;
        config.validate_for_production()?;
        config
    } else {
        let config = AppConfig::from_env_with_defaults()?;
        config.validate()?;
        config
    };
    Ok(config)
}

fn build_state(config: &AppConfig, infrastructure: Infrastructure) -> AppState {
    let storage = infrastructure.storage;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = Arc::new(LocalConnectionRegistry::new(
        config.realtime.channel_capacity,
    ));

    let user_service = UserService::new(UserServiceDependencies {
        user_repository: storage.users.clone(),
        listing_repository: storage.listings.clone(),
        password_hasher: infrastructure.password_hasher,
        clock: clock.clone(),
    });
    let listing_service = ListingService::new(ListingServiceDependencies {
        listing_repository: storage.listings.clone(),
        category_repository: storage.categories.clone(),
        user_repository: storage.users.clone(),
        clock: clock.clone(),
    });
    let category_service = CategoryService::new(CategoryServiceDependencies {
        category_repository: storage.categories.clone(),
        clock: clock.clone(),
    });
    let review_service = ReviewService::new(ReviewServiceDependencies {
        review_repository: storage.reviews.clone(),
        listing_repository: storage.listings.clone(),
        clock: clock.clone(),
    });
    let messaging_service = MessagingService::new(MessagingServiceDependencies {
        user_repository: storage.users.clone(),
        conversation_repository: storage.conversations.clone(),
        message_repository: storage.messages.clone(),
        broadcaster: registry.clone() as Arc<dyn MessageBroadcaster>,
        clock: clock.clone(),
        echo_to_sender: config.realtime.echo_to_sender,
    });
    let dashboard_service = DashboardService::new(DashboardServiceDependencies {
        dashboard_repository: storage.dashboard,
        clock,
    });

    AppState {
        user_service: Arc::new(user_service),
        listing_service: Arc::new(listing_service),
        category_service: Arc::new(category_service),
        review_service: Arc::new(review_service),
        messaging_service: Arc::new(messaging_service),
        dashboard_service: Arc::new(dashboard_service),
        connections: registry as Arc<dyn ConnectionRegistry>,
        jwt_service: Arc::new(JwtService::new(&config.jwt)),
        cookie_secure: config.server.cookie_secure,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    tracing::info!(backend = ?config.storage.backend, "配置加载完成");

    let infrastructure = Infrastructure::connect(&config).await?;
    let state = build_state(&config, infrastructure);

    let app = router(state).layer(CorsLayer::very_permissive());
    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!("二手交易平台服务启动在 http://{address}");
    axum::serve(listener, app).await?;

    Ok(())
}
