use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use super::ConfigError;

pub const MAX_POOL_SIZE: u32 = 100;

/// PostgreSQL connection and pool configuration.
///
/// One pool is built per distinct configuration; see [`PostgresConfig::pool_key`].
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct PostgresConfig {
    /// Server hostname or IP address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port (1-65535).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database name.
    #[serde(default = "default_database")]
    pub database: String,

    /// Role to connect as.
    #[serde(default = "default_user")]
    pub user: String,

    /// Password for `user`. Use `${VAR}` interpolation rather than a literal.
    #[serde(default)]
    pub password: Option<String>,

    /// SSL mode.
    #[serde(default)]
    pub ssl_mode: PostgresSslMode,

    /// Path to a PEM root certificate for `verify_ca` / `verify_full`.
    #[serde(default)]
    pub ssl_root_cert: Option<String>,

    /// Maximum number of connections in the pool (1-100).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections kept open.
    #[serde(default)]
    pub min_connections: u32,

    /// Idle connection timeout in seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// How long to wait for a connection from the pool, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Default per-statement timeout in milliseconds. 0 disables it.
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_ms: u64,

    /// `application_name` reported to the server.
    #[serde(default)]
    pub application_name: Option<String>,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: default_database(),
            user: default_user(),
            password: None,
            ssl_mode: PostgresSslMode::default(),
            ssl_root_cert: None,
            max_connections: default_max_connections(),
            min_connections: 0,
            idle_timeout_secs: default_idle_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            statement_timeout_ms: default_statement_timeout(),
            application_name: None,
        }
    }
}

impl std::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("ssl_mode", &self.ssl_mode)
            .field("ssl_root_cert", &self.ssl_root_cert)
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("statement_timeout_ms", &self.statement_timeout_ms)
            .field("application_name", &self.application_name)
            .finish()
    }
}

impl PostgresConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "database.host cannot be empty".into(),
            ));
        }
        if self.port == 0 {
            return Err(ConfigError::Validation(
                "database.port must be between 1 and 65535".into(),
            ));
        }
        if self.database.trim().is_empty() {
            return Err(ConfigError::Validation(
                "database.database cannot be empty".into(),
            ));
        }
        if self.user.trim().is_empty() {
            return Err(ConfigError::Validation(
                "database.user cannot be empty".into(),
            ));
        }
        if !(1..=MAX_POOL_SIZE).contains(&self.max_connections) {
            return Err(ConfigError::Validation(format!(
                "database.max_connections must be between 1 and {MAX_POOL_SIZE}, got {}",
                self.max_connections
            )));
        }
        if self.min_connections > self.max_connections {
            return Err(ConfigError::Validation(
                "database.min_connections cannot exceed database.max_connections".into(),
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "database.connect_timeout_secs must be at least 1".into(),
            ));
        }
        if matches!(
            self.ssl_mode,
            PostgresSslMode::VerifyCa | PostgresSslMode::VerifyFull
        ) && self.ssl_root_cert.is_none()
        {
            tracing::warn!(
                ssl_mode = ?self.ssl_mode,
                "Certificate verification requested without database.ssl_root_cert; \
                 the system trust store will be used"
            );
        }
        Ok(())
    }

    /// Apply per-call overrides. Each field set on `overrides` wins; every
    /// other field keeps this configuration's value.
    pub fn merged(&self, overrides: &ConnectionOverrides) -> PostgresConfig {
        PostgresConfig {
            host: overrides.host.clone().unwrap_or_else(|| self.host.clone()),
            port: overrides.port.unwrap_or(self.port),
            database: overrides
                .database
                .clone()
                .unwrap_or_else(|| self.database.clone()),
            user: overrides.user.clone().unwrap_or_else(|| self.user.clone()),
            password: overrides.password.clone().or_else(|| self.password.clone()),
            ssl_mode: overrides.ssl_mode.unwrap_or(self.ssl_mode),
            ssl_root_cert: overrides
                .ssl_root_cert
                .clone()
                .or_else(|| self.ssl_root_cert.clone()),
            max_connections: overrides.max_connections.unwrap_or(self.max_connections),
            min_connections: self.min_connections,
            idle_timeout_secs: self.idle_timeout_secs,
            connect_timeout_secs: overrides
                .connect_timeout_secs
                .unwrap_or(self.connect_timeout_secs),
            statement_timeout_ms: overrides
                .statement_timeout_ms
                .unwrap_or(self.statement_timeout_ms),
            application_name: overrides
                .application_name
                .clone()
                .or_else(|| self.application_name.clone()),
        }
    }

    /// Identity of the backend this configuration connects to.
    pub fn pool_key(&self) -> PoolKey {
        PoolKey {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            ssl_mode: self.ssl_mode,
            max_connections: self.max_connections,
        }
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .ssl_mode(self.ssl_mode.into());
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        if let Some(cert) = &self.ssl_root_cert {
            options = options.ssl_root_cert(cert);
        }
        if let Some(name) = &self.application_name {
            options = options.application_name(name);
        }
        if self.statement_timeout_ms > 0 {
            options = options.options([(
                "statement_timeout",
                self.statement_timeout_ms.to_string(),
            )]);
        }
        options
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Per-call connection overrides layered over a base [`PostgresConfig`].
#[derive(Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct ConnectionOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: Option<PostgresSslMode>,
    pub ssl_root_cert: Option<String>,
    pub max_connections: Option<u32>,
    pub connect_timeout_secs: Option<u64>,
    pub statement_timeout_ms: Option<u64>,
    pub application_name: Option<String>,
}

impl std::fmt::Debug for ConnectionOverrides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionOverrides")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("ssl_mode", &self.ssl_mode)
            .field("ssl_root_cert", &self.ssl_root_cert)
            .field("max_connections", &self.max_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("statement_timeout_ms", &self.statement_timeout_ms)
            .field("application_name", &self.application_name)
            .finish()
    }
}

/// Backend identity used to share pools between callers.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    host: String,
    port: u16,
    database: String,
    user: String,
    password: Option<String>,
    ssl_mode: PostgresSslMode,
    max_connections: u32,
}

impl std::fmt::Debug for PoolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}:{}/{} (max {})",
            self.user, self.host, self.port, self.database, self.max_connections
        )
    }
}

/// PostgreSQL SSL mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum PostgresSslMode {
    /// No SSL.
    Disable,
    /// Try SSL, fall back to non-SSL.
    #[default]
    Prefer,
    /// Require SSL.
    Require,
    /// Require SSL and verify server certificate.
    VerifyCa,
    /// Require SSL and verify server certificate and hostname.
    VerifyFull,
}

impl From<PostgresSslMode> for PgSslMode {
    fn from(mode: PostgresSslMode) -> Self {
        match mode {
            PostgresSslMode::Disable => PgSslMode::Disable,
            PostgresSslMode::Prefer => PgSslMode::Prefer,
            PostgresSslMode::Require => PgSslMode::Require,
            PostgresSslMode::VerifyCa => PgSslMode::VerifyCa,
            PostgresSslMode::VerifyFull => PgSslMode::VerifyFull,
        }
    }
}

fn default_host() -> String {
    "localhost".into()
}

fn default_port() -> u16 {
    5432
}

fn default_database() -> String {
    "postgres".into()
}

fn default_user() -> String {
    "postgres".into()
}

fn default_max_connections() -> u32 {
    10
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_statement_timeout() -> u64 {
    60_000
}
