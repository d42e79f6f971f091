use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

use crate::services::registry_service::RegistryPolicy;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub signature_window_secs: i64,
    pub build_settle_secs: u64,
}

/// One-shot maintenance actions selected on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Serve,
    Migrate,
    CreateUser {
        username: String,
        can_create: bool,
        superuser: bool,
    },
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Container registry with signed pushes and remote builds")]
pub struct Args {
    /// Host to bind to (overrides CONTAINER_REGISTRY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides CONTAINER_REGISTRY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory for recipes and build artifacts (overrides CONTAINER_REGISTRY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides CONTAINER_REGISTRY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Accepted signature age in seconds (overrides CONTAINER_REGISTRY_SIGNATURE_WINDOW_SECS)
    #[arg(long)]
    pub signature_window_secs: Option<i64>,

    /// Delay before finalizing a build (overrides CONTAINER_REGISTRY_BUILD_SETTLE_SECS)
    #[arg(long)]
    pub build_settle_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Create a user, print its API token and exit
    #[arg(long, value_name = "USERNAME")]
    pub create_user: Option<String>,

    /// With --create-user: make the user a superuser
    #[arg(long, requires = "create_user")]
    pub superuser: bool,

    /// With --create-user: withhold the create/push capability
    #[arg(long, requires = "create_user")]
    pub no_create: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the command to run.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        let args = Args::parse();
        Self::from_args(args)
    }

    fn from_args(args: Args) -> Result<(Self, Command)> {
        // --- Environment fallback ---
        let env_host =
            env::var("CONTAINER_REGISTRY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_or("CONTAINER_REGISTRY_PORT", 3000u16)?;
        let env_storage = env::var("CONTAINER_REGISTRY_STORAGE_DIR")
            .unwrap_or_else(|_| "./data/registry".into());
        let env_db = env::var("CONTAINER_REGISTRY_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/registry.db".into());
        let env_window = env_or("CONTAINER_REGISTRY_SIGNATURE_WINDOW_SECS", 300i64)?;
        let env_settle = env_or("CONTAINER_REGISTRY_BUILD_SETTLE_SECS", 10u64)?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            signature_window_secs: args.signature_window_secs.unwrap_or(env_window),
            build_settle_secs: args.build_settle_secs.unwrap_or(env_settle),
        };
        if cfg.signature_window_secs < 0 {
            anyhow::bail!("signature window must not be negative");
        }

        let command = match (args.migrate, args.create_user) {
            (true, _) => Command::Migrate,
            (false, Some(username)) => Command::CreateUser {
                username,
                can_create: !args.no_create,
                superuser: args.superuser,
            },
            (false, None) => Command::Serve,
        };

        Ok((cfg, command))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn policy(&self) -> RegistryPolicy {
        RegistryPolicy {
            signature_window_secs: self.signature_window_secs,
            build_settle_delay: Duration::from_secs(self.build_settle_secs),
        }
    }
}

/// Read and parse `key`, falling back to `default` when unset.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}
