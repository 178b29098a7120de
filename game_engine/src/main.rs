use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use game_engine::{
    auth::AuthConfig,
    clients::{HttpCatalogueClient, HttpFriendshipClient},
    env::Settings,
    routes,
    service::{MatchRules, MatchService},
    store::PgMatchStore,
    AppState, LoggerManager,
};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::new().expect("Failed to load settings");
    let _logger_manager = LoggerManager::setup(&settings);
    info!("Logger initialized");

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| settings.database.url.clone());
    let jwt_secret = std::env::var("JWT_SECRET").expect("JWT_SECRET must be set in .env file");

    let db_pool = PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&database_url)
        .await
        .expect("Failed to create database connection pool");
    info!("Database connection pool created");

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("Failed to run database migrations");
    info!("Database migrations applied");

    let catalogue = HttpCatalogueClient::new(
        &settings.catalogue.url,
        Duration::from_secs(settings.catalogue.request_timeout_seconds),
    );
    let friendship = HttpFriendshipClient::new(
        &settings.players.url,
        Duration::from_secs(settings.players.request_timeout_seconds),
    );

    let rules = MatchRules {
        deck_size: settings.game.deck_size,
        max_rounds: settings.game.max_rounds,
        categories: settings
            .game
            .category_pool()
            .expect("Invalid category configuration"),
    };

    let service = Arc::new(MatchService::new(
        Arc::new(PgMatchStore::new(db_pool)),
        Arc::new(catalogue),
        Arc::new(friendship),
        rules,
    ));

    let app_state = AppState {
        settings: settings.clone(),
        service,
        auth: AuthConfig::new(&jwt_secret),
    };

    let bind_address = format!("{}:{}", settings.server.bind_address, settings.server.port);
    info!("Starting game engine on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .configure(routes::configure)
    })
    .bind(&bind_address)?
    .run()
    .await
}
