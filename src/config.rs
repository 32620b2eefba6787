//! Command-line and environment configuration.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid host `{0}`: expected an IP address")]
    InvalidHost(String),

    #[error("unsupported database scheme `{0}`: only sqlite is available")]
    UnsupportedScheme(String),

    #[error("database url `{0}` names no file")]
    EmptyPath(String),

    #[error("database timeout must be at least 1 ms")]
    ZeroTimeout,
}

/// Runtime settings. Every flag falls back to an environment variable.
#[derive(Clone, Debug, Parser)]
#[command(name = "roster", version, about = "CRUD HTTP backend for users, products and tasks")]
pub struct Config {
    /// Address to listen on.
    #[arg(long, env = "API_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "API_PORT", default_value_t = 8000)]
    pub port: u16,

    /// `sqlite://<path>`, `sqlite::memory:` or a bare file path.
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://roster.db")]
    pub database_url: String,

    /// Upper bound on a single database call, in milliseconds.
    #[arg(long = "db-timeout-ms", env = "DATABASE_TIMEOUT_MS", default_value_t = 5000)]
    pub db_timeout_ms: u64,

    /// Start with an empty product catalog.
    #[arg(long, env = "NO_DEMO_PRODUCTS")]
    pub no_demo_products: bool,
}

impl Config {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.host.parse().map_err(|_| ConfigError::InvalidHost(self.host.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn database(&self) -> Result<DatabaseUrl, ConfigError> {
        self.database_url.parse()
    }

    pub fn store_timeout(&self) -> Result<Duration, ConfigError> {
        match self.db_timeout_ms {
            0 => Err(ConfigError::ZeroTimeout),
            ms => Ok(Duration::from_millis(ms)),
        }
    }
}

/// Where the user database lives.
#[derive(Clone, Debug, PartialEq)]
pub enum DatabaseUrl {
    Memory,
    File(PathBuf),
}

impl FromStr for DatabaseUrl {
    type Err = ConfigError;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        if matches!(url, "sqlite::memory:" | "sqlite://:memory:" | ":memory:") {
            return Ok(Self::Memory);
        }

        let path = match url.split_once("://") {
            Some(("sqlite", rest)) => rest,
            Some((scheme, _)) => return Err(ConfigError::UnsupportedScheme(scheme.to_owned())),
            None => url.strip_prefix("sqlite:").unwrap_or(url),
        };

        if path.is_empty() {
            return Err(ConfigError::EmptyPath(url.to_owned()));
        }
        Ok(Self::File(PathBuf::from(path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = Config::try_parse_from(["roster"]).unwrap();
        assert_eq!(config.socket_addr().unwrap(), "0.0.0.0:8000".parse().unwrap());
        assert_eq!(config.database().unwrap(), DatabaseUrl::File("roster.db".into()));
        assert_eq!(config.store_timeout().unwrap(), Duration::from_secs(5));
        assert!(!config.no_demo_products);
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "roster",
            "--host", "::1",
            "--port", "9000",
            "--database-url", "sqlite::memory:",
            "--db-timeout-ms", "250",
            "--no-demo-products",
        ])
        .unwrap();
        assert_eq!(config.socket_addr().unwrap(), "[::1]:9000".parse().unwrap());
        assert_eq!(config.database().unwrap(), DatabaseUrl::Memory);
        assert_eq!(config.store_timeout().unwrap(), Duration::from_millis(250));
        assert!(config.no_demo_products);
    }

    #[test]
    fn database_urls() {
        assert_eq!("sqlite:///var/lib/roster.db".parse(), Ok(DatabaseUrl::File("/var/lib/roster.db".into())));
        assert_eq!("sqlite:data.db".parse(), Ok(DatabaseUrl::File("data.db".into())));
        assert_eq!("./data.db".parse(), Ok(DatabaseUrl::File("./data.db".into())));
        assert_eq!(
            "postgresql://localhost/app".parse::<DatabaseUrl>(),
            Err(ConfigError::UnsupportedScheme("postgresql".into())),
        );
        assert!(matches!("sqlite://".parse::<DatabaseUrl>(), Err(ConfigError::EmptyPath(_))));
    }

    #[test]
    fn bad_host_and_zero_timeout_are_rejected() {
        let config = Config::try_parse_from(["roster", "--host", "localhost", "--db-timeout-ms", "0"]).unwrap();
        assert_eq!(config.socket_addr(), Err(ConfigError::InvalidHost("localhost".into())));
        assert_eq!(config.store_timeout(), Err(ConfigError::ZeroTimeout));
    }
}
