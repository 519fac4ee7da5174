use crate::services::notifier::DEFAULT_CAPACITY;
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Events buffered per project group before slow sockets lag.
    pub broadcast_capacity: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Multi-user bug tracker API")]
pub struct Args {
    /// Host to bind to (overrides BUGTRACKER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides BUGTRACKER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides BUGTRACKER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Per-project event buffer (overrides BUGTRACKER_BROADCAST_CAPACITY)
    #[arg(long)]
    pub broadcast_capacity: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::resolve(args, |key| env::var(key).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge CLI values over `lookup` (the environment) over defaults.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_host = lookup("BUGTRACKER_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = parse_var(&lookup, "BUGTRACKER_PORT", 3000u16)?;
        let env_db = lookup("BUGTRACKER_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://./data/bugtracker.db".into());
        let env_capacity = parse_var(&lookup, "BUGTRACKER_BROADCAST_CAPACITY", DEFAULT_CAPACITY)?;

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            broadcast_capacity: args.broadcast_capacity.unwrap_or(env_capacity),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Filesystem path of a file-backed SQLite URL, if any.
    pub fn database_path(&self) -> Option<&str> {
        let path = self
            .database_url
            .strip_prefix("sqlite://")
            .or_else(|| self.database_url.strip_prefix("sqlite:"))?;
        let path = path.split('?').next().unwrap_or(path);
        if path.is_empty() || path.starts_with(":memory:") {
            None
        } else {
            Some(path)
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        None => Ok(default),
    }
}
