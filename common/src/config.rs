//! Application configuration.
//!
//! Two pieces of configuration are read once at startup and never re-read:
//! [`AppConfig`] (listen address, configuration paths) from the environment,
//! and [`ServicesConfig`] (which service kinds are exposed) from a YAML
//! enablement document.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::{AppError, AppResult};
use crate::models::ServiceKind;

/// Default location of the enablement document.
pub const DEFAULT_SERVICES_CONFIG: &str = "services-config.yml";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;

/// Process-level settings read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Name of the running binary, used in response metadata.
    pub service_name: String,
    /// Listen host.
    pub host: String,
    /// Listen port (`PORT` on Cloud Foundry, `SERVER_PORT` locally).
    pub port: u16,
    /// Path of the enablement document.
    pub services_config_path: PathBuf,
}

impl AppConfig {
    /// Loads configuration from the process environment.
    pub fn load_with_service(service_name: &str) -> Self {
        Self::from_lookup(service_name, |key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup(service_name: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = lookup("PORT")
            .or_else(|| lookup("SERVER_PORT"))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_PORT);

        Self {
            service_name: service_name.to_string(),
            host: lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            services_config_path: lookup("SERVICES_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SERVICES_CONFIG)),
        }
    }

    /// Socket address string to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Per-kind entry of the enablement document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ServiceSettings {
    /// Whether the front-ends expose this kind.
    #[serde(default)]
    pub enabled: bool,
    /// Tab label.
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServicesFile {
    #[serde(default)]
    services: BTreeMap<String, ServiceSettings>,
}

/// Immutable enablement configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServicesConfig {
    entries: BTreeMap<ServiceKind, ServiceSettings>,
}

impl ServicesConfig {
    /// Reads and parses the enablement document at `path`.
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml_str(&content)?;
        tracing::info!(
            path = %path.display(),
            enabled = ?config.enabled_kinds(),
            "services configuration loaded"
        );
        Ok(config)
    }

    /// Parses an enablement document.
    pub fn from_yaml_str(content: &str) -> AppResult<Self> {
        let file: ServicesFile = serde_yaml::from_str(content)
            .map_err(|e| AppError::Configuration(format!("invalid services configuration: {e}")))?;

        let mut entries = BTreeMap::new();
        for (id, settings) in file.services {
            let kind: ServiceKind = id
                .parse()
                .map_err(|_| AppError::Configuration(format!("unknown service '{id}'")))?;
            if entries.insert(kind, settings).is_some() {
                return Err(AppError::Configuration(format!(
                    "service '{kind}' is configured more than once"
                )));
            }
        }
        Ok(Self { entries })
    }

    /// Enables every kind with its default name.
    pub fn all_enabled() -> Self {
        let entries = ServiceKind::ALL
            .into_iter()
            .map(|kind| {
                (
                    kind,
                    ServiceSettings {
                        enabled: true,
                        display_name: None,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// Whether a kind is enabled.
    pub fn is_enabled(&self, kind: ServiceKind) -> bool {
        self.entries.get(&kind).is_some_and(|s| s.enabled)
    }

    /// Tab label for a kind.
    pub fn display_name(&self, kind: ServiceKind) -> String {
        self.entries
            .get(&kind)
            .and_then(|s| s.display_name.clone())
            .unwrap_or_else(|| kind.display_name().to_string())
    }

    /// Enabled kinds in declaration order.
    pub fn enabled_kinds(&self) -> Vec<ServiceKind> {
        ServiceKind::ALL
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
            .collect()
    }
}

/// Loads a `.env` file from the working directory (best-effort, no error if missing).
///
/// Variables already present in the environment are left untouched.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    let Ok(content) = std::fs::read_to_string(env_path) else {
        return;
    };
    for (key, value) in parse_dotenv(&content) {
        if std::env::var(&key).is_err() {
            std::env::set_var(key, value);
        }
    }
}

fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            (key.trim().to_string(), value.to_string())
        })
        .collect()
}
