//! Environment access and the environment-variable fallback.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::models::ServiceKind;

/// Source of environment variables.
///
/// The process environment in production; a plain map in tests.
pub trait EnvSource {
    /// Returns a variable's value; empty values count as unset.
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.trim().is_empty()).cloned()
    }
}

const DEFAULT_HOST: &str = "localhost";

/// Variable suffix → credential field, per kind.
fn variables(kind: ServiceKind) -> &'static [(&'static str, &'static str)] {
    match kind {
        ServiceKind::RabbitMq => &[
            ("URL", "uri"),
            ("HOST", "host"),
            ("PORT", "port"),
            ("USER", "username"),
            ("PASS", "password"),
            ("VHOST", "vhost"),
            ("SSL", "ssl"),
            ("MANAGEMENT_URL", "http_api_uri"),
        ],
        ServiceKind::Valkey => &[
            ("URL", "uri"),
            ("HOST", "host"),
            ("PORT", "port"),
            ("PASSWORD", "password"),
            ("SSL", "ssl"),
        ],
        ServiceKind::MySql | ServiceKind::Postgres => &[
            ("URL", "uri"),
            ("HOST", "host"),
            ("PORT", "port"),
            ("USER", "username"),
            ("PASSWORD", "password"),
            ("DATABASE", "database"),
            ("SSL", "ssl"),
        ],
    }
}

/// Names of the fallback variables consulted for a kind.
pub fn variable_names(kind: ServiceKind) -> Vec<String> {
    variables(kind)
        .iter()
        .map(|(suffix, _)| format!("{}_{}", kind.env_prefix(), suffix))
        .collect()
}

/// Assembles structured credentials from the kind's fallback variables.
///
/// Returns `None` when none of the variables is set. A missing host becomes
/// `localhost` and a missing port the kind's default port, unless a URL
/// variable supplies both.
pub fn credentials_from_env(kind: ServiceKind, env: &dyn EnvSource) -> Option<Map<String, Value>> {
    let mut credentials = Map::new();
    for (suffix, field) in variables(kind) {
        let key = format!("{}_{}", kind.env_prefix(), suffix);
        if let Some(value) = env.var(&key) {
            credentials.insert((*field).to_string(), Value::String(value));
        }
    }
    if credentials.is_empty() {
        return None;
    }

    if credentials.contains_key("uri") {
        return Some(credentials);
    }
    if !credentials.contains_key("host") {
        credentials.insert("host".to_string(), Value::String(DEFAULT_HOST.to_string()));
    }
    if !credentials.contains_key("port") {
        let secure = credentials
            .get("ssl")
            .and_then(Value::as_str)
            .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"));
        credentials.insert(
            "port".to_string(),
            Value::from(kind.default_port(secure)),
        );
    }
    Some(credentials)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_no_variables_means_none() {
        for kind in ServiceKind::ALL {
            assert!(credentials_from_env(kind, &env(&[])).is_none());
        }
    }

    #[test]
    fn test_empty_values_count_as_unset() {
        assert!(credentials_from_env(ServiceKind::Valkey, &env(&[("VALKEY_HOST", " ")])).is_none());
    }

    #[test]
    fn test_default_port_is_filled_in() {
        let creds = credentials_from_env(
            ServiceKind::MySql,
            &env(&[("MYSQL_HOST", "localhost"), ("MYSQL_USER", "root")]),
        )
        .unwrap();
        assert_eq!(creds["host"], "localhost");
        assert_eq!(creds["username"], "root");
        assert_eq!(creds["port"], 3306);
    }

    #[test]
    fn test_missing_host_defaults_to_localhost() {
        let creds =
            credentials_from_env(ServiceKind::MySql, &env(&[("MYSQL_USER", "app")])).unwrap();
        assert_eq!(creds["host"], "localhost");
        assert_eq!(creds["port"], 3306);
        assert_eq!(creds["username"], "app");
    }

    #[test]
    fn test_url_variable_is_left_alone() {
        let creds = credentials_from_env(
            ServiceKind::Valkey,
            &env(&[("VALKEY_URL", "redis://cache:6379/2")]),
        )
        .unwrap();
        assert!(creds.get("host").is_none());
        assert!(creds.get("port").is_none());
    }

    #[test]
    fn test_secure_rabbitmq_default_port() {
        let creds = credentials_from_env(
            ServiceKind::RabbitMq,
            &env(&[("RABBITMQ_HOST", "mq"), ("RABBITMQ_SSL", "true")]),
        )
        .unwrap();
        assert_eq!(creds["port"], 5671);
    }

    #[test]
    fn test_other_kinds_variables_are_ignored() {
        let creds = credentials_from_env(ServiceKind::Postgres, &env(&[("MYSQL_HOST", "db")]));
        assert!(creds.is_none());
    }

    #[test]
    fn test_variable_names_use_prefix() {
        let names = variable_names(ServiceKind::RabbitMq);
        assert!(names.contains(&"RABBITMQ_PASS".to_string()));
        assert!(names.contains(&"RABBITMQ_VHOST".to_string()));
    }
}
