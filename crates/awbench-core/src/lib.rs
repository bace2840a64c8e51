use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for env var {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

pub mod config;
pub mod models;
pub mod util;

pub use config::{
    load_app_config, load_app_config_from_env, AppConfig, MongoConfig, PostgresConfig,
};
pub use models::{MetricsRecord, PricePointRecord, ProductRecord, RankPointRecord};
pub use util::{chunked, deduplicate_by, deduplicate_by_asin, validate_asin};
