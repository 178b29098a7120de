use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use crate::models::Category;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub server: ServerSettings,
    pub game: GameSettings,
    pub database: DatabaseSettings,
    pub catalogue: RpcSettings,
    pub players: RpcSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        println!("Loading configuration for RUN_MODE: {}", &run_mode);

        let s = Config::builder()
            // Load environment-specific file (e.g., development.toml, production.toml)
            .add_source(
                File::with_name(&format!("config/{}", run_mode))
                    .format(FileFormat::Toml)
                    .required(true),
            )
            // Add environment variables (e.g., APP_SERVER__PORT=8000)
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub bind_address: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub directory: String,
    pub filename: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RpcSettings {
    pub url: String,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GameSettings {
    pub deck_size: usize,
    pub max_rounds: usize,
    /// Names of the categories rounds may be drawn on. Must parse into the
    /// fixed category enum.
    pub categories: Vec<String>,
}

impl GameSettings {
    pub fn category_pool(&self) -> Result<Vec<Category>, ConfigError> {
        self.categories
            .iter()
            .map(|name| {
                name.parse::<Category>().map_err(|_| {
                    ConfigError::Message(format!("unknown card category {:?}", name))
                })
            })
            .collect()
    }
}
