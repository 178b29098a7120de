use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use matchmaking_server::{
    auth::AuthConfig,
    clients::{HttpEngineClient, HttpPlayersClient},
    coordinator::Coordinator,
    env::Settings,
    routes,
    token_store::RedisTokenStore,
    AppState, LoggerManager,
};
use tracing::info;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();

    let settings = Settings::new().expect("Failed to load settings");
    let _logger_manager = LoggerManager::setup(&settings);
    info!("Logger initialized");

    let jwt_secret = std::env::var("JWT_SECRET").expect("JWT_SECRET must be set in .env file");

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| settings.redis.url.clone());
    let redis_client = redis::Client::open(redis_url.clone()).expect("Failed to create Redis client");
    let redis_conn_manager = redis::aio::ConnectionManager::new(redis_client)
        .await
        .expect("Failed to create Redis connection manager");
    info!("Redis connection established: {}", redis_url);

    let engine_client = HttpEngineClient::new(
        &settings.game_engine.url,
        Duration::from_secs(settings.game_engine.request_timeout_seconds),
    );
    let players_client = HttpPlayersClient::new(
        &settings.players.url,
        Duration::from_secs(settings.players.request_timeout_seconds),
    );

    let coordinator = Arc::new(Coordinator::new(
        Arc::new(RedisTokenStore::new(
            redis_conn_manager,
            settings.retry.backoff(),
        )),
        Arc::new(engine_client),
        Arc::new(players_client),
        settings.matchmaking.max_queue_size,
    ));

    let app_state = AppState {
        settings: settings.clone(),
        coordinator,
        auth: AuthConfig::new(&jwt_secret),
    };

    let bind_address = format!("{}:{}", settings.server.bind_address, settings.server.port);
    info!("Starting matchmaking server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .configure(routes::configure)
    })
    .bind(&bind_address)?
    .run()
    .await
}
