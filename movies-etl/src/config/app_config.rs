//! Application settings read from the environment.

use sqlx::postgres::PgConnectOptions;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::EtlError;

/// Default index name, also used as the resume cursor key.
const DEFAULT_INDEX_NAME: &str = "movies";

/// Default location of the state file.
const DEFAULT_STATE_FILE_PATH: &str = "storage/storage.json";

/// Default directory holding `<index>.json` definitions.
const DEFAULT_INDEX_DEFINITIONS_DIR: &str = "index_definitions";

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Connection settings for the source database.
#[derive(Clone, PartialEq)]
pub struct PostgresDsn {
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    /// libpq style options, e.g. `-c search_path=content`.
    pub options: Option<String>,
}

impl PostgresDsn {
    /// Connection options for sqlx, with `options` applied as runtime parameters.
    pub fn connect_options(&self) -> Result<PgConnectOptions, EtlError> {
        let params = match &self.options {
            Some(options) => parse_pg_options(options)?,
            None => Vec::new(),
        };

        Ok(PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.dbname)
            .options(params))
    }
}

impl fmt::Debug for PostgresDsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresDsn")
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"***")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("options", &self.options)
            .finish()
    }
}

/// Address of the search engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ElasticDsn {
    pub host: String,
    pub port: u16,
}

impl ElasticDsn {
    /// Base URL of the engine's HTTP API.
    pub fn url(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

/// Complete application configuration.
///
/// # Environment Variables
///
/// - `DEBUG`: Verbose logging (`true`/`false`, `1`/`0`, `yes`/`no`, `on`/`off`)
/// - `CHUNK_SIZE`: Records per batch, at least 1
/// - `ETL_RUNS_INTERVAL`: Seconds between passes
/// - `BACKOFF_MAX_RETRY_INTERVAL`: Maximum retry delay in seconds, may be fractional
/// - `POSTGRES_DB_NAME`, `POSTGRES_USER`, `POSTGRES_PASSWORD`, `POSTGRES_HOST`,
///   `POSTGRES_PORT`: Source database
/// - `POSTGRES_OPTIONS`: Optional libpq options string
/// - `ELASTICSEARCH_HOST`, `ELASTICSEARCH_PORT`: Search engine
/// - `ES_INDEX_NAME`: Target index (default: movies)
/// - `STATE_FILE_PATH`: State file (default: storage/storage.json)
/// - `INDEX_DEFINITIONS_DIR`: Index definitions (default: index_definitions)
/// - `LOG_FORMAT`: `json` or `pretty` (default: pretty)
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub debug: bool,
    pub chunk_size: usize,
    pub etl_interval: Duration,
    pub backoff_max_retry_interval: Duration,
    pub index_name: String,
    pub state_file_path: PathBuf,
    pub index_definitions_dir: PathBuf,
    pub log_format: LogFormat,
    pub postgres: PostgresDsn,
    pub elastic: ElasticDsn,
}

impl AppConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, EtlError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EtlError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required =
            |name: &str| lookup(name).ok_or_else(|| EtlError::config(format!("{} is not set", name)));
        let optional =
            |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let chunk_size: usize = parse_number("CHUNK_SIZE", &required("CHUNK_SIZE")?)?;
        if chunk_size == 0 {
            return Err(EtlError::config("CHUNK_SIZE must be at least 1"));
        }

        let etl_interval_secs: u64 =
            parse_number("ETL_RUNS_INTERVAL", &required("ETL_RUNS_INTERVAL")?)?;

        let max_retry_secs: f64 = parse_number(
            "BACKOFF_MAX_RETRY_INTERVAL",
            &required("BACKOFF_MAX_RETRY_INTERVAL")?,
        )?;
        if !max_retry_secs.is_finite() || max_retry_secs <= 0.0 {
            return Err(EtlError::config(
                "BACKOFF_MAX_RETRY_INTERVAL must be a positive number of seconds",
            ));
        }

        let log_format = match optional("LOG_FORMAT", "pretty").to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            other => {
                return Err(EtlError::config(format!(
                    "LOG_FORMAT must be 'json' or 'pretty', got '{}'",
                    other
                )))
            }
        };

        let postgres = PostgresDsn {
            dbname: required("POSTGRES_DB_NAME")?,
            user: required("POSTGRES_USER")?,
            password: required("POSTGRES_PASSWORD")?,
            host: required("POSTGRES_HOST")?,
            port: parse_number("POSTGRES_PORT", &required("POSTGRES_PORT")?)?,
            options: lookup("POSTGRES_OPTIONS").filter(|o| !o.trim().is_empty()),
        };

        let elastic = ElasticDsn {
            host: required("ELASTICSEARCH_HOST")?,
            port: parse_number("ELASTICSEARCH_PORT", &required("ELASTICSEARCH_PORT")?)?,
        };

        let index_name = optional("ES_INDEX_NAME", DEFAULT_INDEX_NAME);
        if index_name.trim().is_empty() {
            return Err(EtlError::config("ES_INDEX_NAME must not be empty"));
        }

        Ok(Self {
            debug: parse_bool("DEBUG", &required("DEBUG")?)?,
            chunk_size,
            etl_interval: Duration::from_secs(etl_interval_secs),
            backoff_max_retry_interval: Duration::from_secs_f64(max_retry_secs),
            index_name,
            state_file_path: PathBuf::from(optional("STATE_FILE_PATH", DEFAULT_STATE_FILE_PATH)),
            index_definitions_dir: PathBuf::from(optional(
                "INDEX_DEFINITIONS_DIR",
                DEFAULT_INDEX_DEFINITIONS_DIR,
            )),
            log_format,
            postgres,
            elastic,
        })
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T, EtlError>
where
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| EtlError::config(format!("{} has invalid value '{}': {}", name, value, e)))
}

fn parse_bool(name: &str, value: &str) -> Result<bool, EtlError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(EtlError::config(format!(
            "{} must be a boolean, got '{}'",
            name, value
        ))),
    }
}

/// Parse a libpq options string into runtime parameters.
///
/// Accepts `-c name=value`, `-cname=value` and `--name=value` forms.
///
/// # Example
///
/// ```
/// use movies_etl::config::parse_pg_options;
///
/// let params = parse_pg_options("-c search_path=content,public").unwrap();
/// assert_eq!(params, vec![("search_path".to_string(), "content,public".to_string())]);
/// ```
pub fn parse_pg_options(options: &str) -> Result<Vec<(String, String)>, EtlError> {
    let mut params = Vec::new();
    let mut tokens = options.split_whitespace();

    while let Some(token) = tokens.next() {
        let setting = if token == "-c" {
            tokens
                .next()
                .ok_or_else(|| EtlError::config("POSTGRES_OPTIONS ends with a bare '-c'"))?
        } else if let Some(rest) = token.strip_prefix("--") {
            rest
        } else if let Some(rest) = token.strip_prefix("-c") {
            rest
        } else {
            return Err(EtlError::config(format!(
                "POSTGRES_OPTIONS has unsupported token '{}'",
                token
            )));
        };

        let (name, value) = setting
            .split_once('=')
            .filter(|(name, _)| !name.is_empty())
            .ok_or_else(|| {
                EtlError::config(format!(
                    "POSTGRES_OPTIONS setting '{}' is not name=value",
                    setting
                ))
            })?;
        params.push((name.to_string(), value.to_string()));
    }

    Ok(params)
}
