//! Service kind and connection descriptor models.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::AppError;

/// Backend service kind.
///
/// Declaration order is the canonical order: discovery walks the kinds in
/// this order and the UI shows tabs in this order.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// RabbitMQ message broker.
    RabbitMq,
    /// Valkey (Redis-compatible) key-value cache.
    Valkey,
    /// MySQL relational database.
    MySql,
    /// PostgreSQL relational database.
    Postgres,
}

impl ServiceKind {
    /// All kinds in declaration order.
    pub const ALL: [ServiceKind; 4] = [
        ServiceKind::RabbitMq,
        ServiceKind::Valkey,
        ServiceKind::MySql,
        ServiceKind::Postgres,
    ];

    /// Stable identifier used in URLs, CLI arguments and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::RabbitMq => "rabbitmq",
            ServiceKind::Valkey => "valkey",
            ServiceKind::MySql => "mysql",
            ServiceKind::Postgres => "postgres",
        }
    }

    /// Human-readable name used when the configuration gives none.
    pub fn display_name(&self) -> &'static str {
        match self {
            ServiceKind::RabbitMq => "RabbitMQ",
            ServiceKind::Valkey => "Valkey",
            ServiceKind::MySql => "MySQL",
            ServiceKind::Postgres => "PostgreSQL",
        }
    }

    /// Returns the default port for this service kind.
    pub fn default_port(&self, secure: bool) -> u16 {
        match self {
            ServiceKind::RabbitMq if secure => 5671,
            ServiceKind::RabbitMq => 5672,
            ServiceKind::Valkey => 6379,
            ServiceKind::MySql => 3306,
            ServiceKind::Postgres => 5432,
        }
    }

    /// Prefix of the fallback environment variables (`MYSQL_HOST`, ...).
    pub fn env_prefix(&self) -> &'static str {
        match self {
            ServiceKind::RabbitMq => "RABBITMQ",
            ServiceKind::Valkey => "VALKEY",
            ServiceKind::MySql => "MYSQL",
            ServiceKind::Postgres => "POSTGRES",
        }
    }

    /// Whether this kind is one of the relational databases.
    pub fn is_relational(&self) -> bool {
        matches!(self, ServiceKind::MySql | ServiceKind::Postgres)
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rabbitmq" | "rabbit" => Ok(ServiceKind::RabbitMq),
            "valkey" | "redis" => Ok(ServiceKind::Valkey),
            "mysql" => Ok(ServiceKind::MySql),
            "postgres" | "postgresql" => Ok(ServiceKind::Postgres),
            other => Err(AppError::ServiceNotFound(other.to_string())),
        }
    }
}

/// Canonical, driver-agnostic connection parameters for one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConnectionDescriptor {
    /// Service kind.
    pub kind: ServiceKind,
    /// Backend host.
    pub host: String,
    /// Backend port.
    pub port: u16,
    /// Login user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Login password (not serialized in responses).
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
    /// Database name, or virtual host for the broker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Whether the connection must use TLS.
    pub secure: bool,
    /// RabbitMQ management HTTP API endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub management_uri: Option<String>,
}

impl ConnectionDescriptor {
    /// Creates a descriptor with only host and port set.
    pub fn new(kind: ServiceKind, host: impl Into<String>, port: u16) -> Self {
        Self {
            kind,
            host: host.into(),
            port,
            username: None,
            password: None,
            database: None,
            secure: false,
            management_uri: None,
        }
    }

    /// Username, or the given default.
    pub fn username_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.username.as_deref().filter(|u| !u.is_empty()).unwrap_or(default)
    }

    /// Password, or the given default.
    pub fn password_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.password.as_deref().unwrap_or(default)
    }

    /// Database (or vhost), or the given default.
    pub fn database_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.database.as_deref().filter(|d| !d.is_empty()).unwrap_or(default)
    }

    /// `host:port` for log lines.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Availability of one enabled kind, as shown to front-ends.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceStatus {
    /// Service id.
    pub id: ServiceKind,
    /// Tab label.
    pub display_name: String,
    /// Whether a descriptor was resolved.
    pub available: bool,
    /// Why the kind is unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Where the credentials came from (`binding:<name>` or `environment`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Resolved connection parameters, password omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionDescriptor>,
}
