//! Configuration loading and dependency wiring.

mod app_config;
mod dependencies;

pub use app_config::{parse_pg_options, AppConfig, ElasticDsn, LogFormat, PostgresDsn};
pub use dependencies::Dependencies;
