use std::sync::Arc;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::auth::AuthConfig;
use crate::env::Settings;
use crate::service::MatchService;

pub mod auth;
pub mod clients;
pub mod engine;
pub mod env;
pub mod errors;
pub mod models;
pub mod routes;
pub mod service;
pub mod store;

/// Holds the non-blocking writer guard; dropping it would lose buffered log
/// lines on shutdown.
pub struct LoggerManager {
    _guard: WorkerGuard,
}

impl LoggerManager {
    pub fn setup(settings: &Settings) -> Self {
        if let Err(e) = std::fs::create_dir_all(&settings.logging.directory) {
            eprintln!(
                "Failed to create log directory '{}': {}",
                settings.logging.directory, e
            );
        }

        let file_appender = tracing_appender::rolling::daily(
            &settings.logging.directory,
            &settings.logging.filename,
        );
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&settings.server.log_level));

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .with(fmt::layer().with_writer(file_writer).with_ansi(false))
            .init();

        tracing::info!(
            "Logging to console and {}/{}",
            settings.logging.directory,
            settings.logging.filename
        );

        Self { _guard: guard }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub service: Arc<MatchService>,
    pub auth: AuthConfig,
}
