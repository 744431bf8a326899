//! Configuration loaded from environment variables.

use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, bail};

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Dev,
    Test,
    Prod,
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "dev" => Ok(Self::Dev),
            "test" => Ok(Self::Test),
            "prod" => Ok(Self::Prod),
            other => bail!("unknown environment {other:?}, expected dev, test or prod"),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dev => "dev",
            Self::Test => "test",
            Self::Prod => "prod",
        })
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Deployment environment (default: dev).
    pub environment: Environment,

    /// PostgreSQL connection URL for writes.
    pub database_url: String,

    /// PostgreSQL connection URL for reads (default: the writer URL).
    pub database_reader_url: String,

    /// Maximum database connections per pool (default: 10).
    pub database_max_connections: u32,

    /// Attributes callers may never set through the controller layer
    /// (default: id, created_at, updated_at).
    pub exclude_fields: BTreeSet<String>,
}

impl Config {
    /// Load configuration from the process environment, reading `.env`
    /// first when present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a
    /// variable or `None` when unset.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let environment = lookup("ENVIRONMENT")
            .map(|v| v.parse())
            .transpose()
            .context("ENVIRONMENT must be dev, test or prod")?
            .unwrap_or_default();

        let database_url = match lookup("DATABASE_URL") {
            Some(url) => url,
            None => postgres_url(&lookup)?,
        };

        let database_reader_url =
            lookup("DATABASE_READER_URL").unwrap_or_else(|| database_url.clone());

        let database_max_connections = lookup("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let exclude_fields = lookup("EXCLUDE_FIELDS")
            .unwrap_or_else(|| "id,created_at,updated_at".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            environment,
            database_url,
            database_reader_url,
            database_max_connections,
            exclude_fields,
        })
    }
}

/// Compose a connection URL from the `POSTGRES_*` variables.
fn postgres_url(lookup: &impl Fn(&str) -> Option<String>) -> Result<String> {
    let host = lookup("POSTGRES_HOST")
        .context("DATABASE_URL or POSTGRES_HOST environment variable is required")?;
    let port: u16 = lookup("POSTGRES_PORT")
        .unwrap_or_else(|| "5432".to_string())
        .parse()
        .context("POSTGRES_PORT must be a valid u16")?;
    let db = lookup("POSTGRES_DB").context("POSTGRES_DB environment variable is required")?;
    let user = lookup("POSTGRES_USER").context("POSTGRES_USER environment variable is required")?;

    Ok(match lookup("POSTGRES_PASSWORD") {
        Some(password) => format!("postgres://{user}:{password}@{host}:{port}/{db}"),
        None => format!("postgres://{user}@{host}:{port}/{db}"),
    })
}
