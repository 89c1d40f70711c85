//! Handler selection.
//!
//! [`HandlerManager`] is built once at startup from the enablement
//! configuration and the discovery registry. It owns one handler per enabled
//! and available kind and answers lookups for the front-ends.

use std::collections::BTreeMap;
use std::sync::Arc;

use common::config::ServicesConfig;
use common::discovery::{CredentialSource, ServiceRegistry};
use common::errors::{AppError, AppResult};
use common::models::{ConnectionDescriptor, Operation, OperationResult, ServiceKind, ServiceStatus};

use crate::handler::ServiceHandler;
use crate::{MySqlHandler, PostgresHandler, RabbitMqHandler, ValkeyHandler};

/// Creates the handler for a descriptor's kind.
pub fn create_handler(descriptor: ConnectionDescriptor) -> Arc<dyn ServiceHandler> {
    match descriptor.kind {
        ServiceKind::RabbitMq => Arc::new(RabbitMqHandler::new(descriptor)),
        ServiceKind::Valkey => Arc::new(ValkeyHandler::new(descriptor)),
        ServiceKind::MySql => Arc::new(MySqlHandler::new(descriptor)),
        ServiceKind::Postgres => Arc::new(PostgresHandler::new(descriptor)),
    }
}

/// Owns the handlers of the enabled, available kinds.
pub struct HandlerManager {
    config: ServicesConfig,
    registry: ServiceRegistry,
    handlers: BTreeMap<ServiceKind, Arc<dyn ServiceHandler>>,
}

impl HandlerManager {
    /// Builds a handler for every kind that is both enabled and discovered.
    pub fn new(config: ServicesConfig, registry: ServiceRegistry) -> Self {
        let mut handlers = BTreeMap::new();
        for kind in config.enabled_kinds() {
            match registry.get(kind) {
                Ok(descriptor) => {
                    handlers.insert(kind, create_handler(descriptor.clone()));
                }
                Err(e) => {
                    tracing::warn!(service = %kind, error = %e, "enabled service has no handler");
                }
            }
        }
        tracing::info!(
            handlers = ?handlers.keys().collect::<Vec<_>>(),
            "service handlers ready"
        );
        Self {
            config,
            registry,
            handlers,
        }
    }

    pub fn config(&self) -> &ServicesConfig {
        &self.config
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Handler for a kind.
    ///
    /// # Errors
    /// `ServiceDisabled` when the kind is switched off, otherwise the
    /// registry's discovery error for the kind.
    pub fn get(&self, kind: ServiceKind) -> AppResult<Arc<dyn ServiceHandler>> {
        if !self.config.is_enabled(kind) {
            return Err(AppError::ServiceDisabled(kind));
        }
        if let Some(handler) = self.handlers.get(&kind) {
            return Ok(Arc::clone(handler));
        }
        self.registry.get(kind)?;
        Err(AppError::Internal(format!("no handler for {kind}")))
    }

    /// Handler for a service id such as `mysql` or `redis`.
    pub fn resolve(&self, id: &str) -> AppResult<Arc<dyn ServiceHandler>> {
        self.get(id.parse()?)
    }

    /// Runs an operation against a kind.
    pub async fn run(&self, kind: ServiceKind, operation: Operation) -> AppResult<OperationResult> {
        self.get(kind)?.run(operation).await
    }

    /// Status of every enabled kind in declaration order.
    pub fn statuses(&self) -> Vec<ServiceStatus> {
        self.config
            .enabled_kinds()
            .into_iter()
            .map(|kind| ServiceStatus {
                id: kind,
                display_name: self.config.display_name(kind),
                available: self.handlers.contains_key(&kind),
                reason: self.registry.unavailable_reason(kind),
                source: self.registry.source(kind).map(|source| match source {
                    CredentialSource::Binding { name, .. } => format!("binding:{name}"),
                    CredentialSource::Environment => "environment".to_string(),
                }),
                connection: self.registry.get(kind).ok().cloned(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::discovery::discover_bindings;
    use common::models::ServiceBinding;
    use serde_json::json;
    use std::collections::HashMap;

    fn registry() -> ServiceRegistry {
        let bindings = vec![
            ServiceBinding::new("cache", "p.redis")
                .with_credentials(json!({"host": "cache.internal", "port": 6379, "password": "pw"})),
            ServiceBinding::new("db", "p.mysql")
                .with_credentials(json!({"hostname": "db1", "port": "3306", "name": "appdb"})),
        ];
        discover_bindings(&bindings, &HashMap::<String, String>::new())
    }

    fn config(yaml: &str) -> ServicesConfig {
        ServicesConfig::from_yaml_str(yaml).unwrap()
    }

    #[test]
    fn test_handlers_only_for_enabled_and_available_kinds() {
        let manager = HandlerManager::new(ServicesConfig::all_enabled(), registry());
        assert_eq!(manager.get(ServiceKind::Valkey).unwrap().kind(), ServiceKind::Valkey);
        assert_eq!(manager.get(ServiceKind::MySql).unwrap().kind(), ServiceKind::MySql);
        assert!(matches!(
            manager.get(ServiceKind::Postgres),
            Err(AppError::Discovery { .. })
        ));
    }

    #[test]
    fn test_disabled_kind_is_rejected_even_when_discovered() {
        let manager = HandlerManager::new(
            config("services:\n  valkey:\n    enabled: false\n  mysql:\n    enabled: true\n"),
            registry(),
        );
        assert!(matches!(
            manager.get(ServiceKind::Valkey),
            Err(AppError::ServiceDisabled(ServiceKind::Valkey))
        ));
        assert!(manager.get(ServiceKind::MySql).is_ok());
    }

    #[test]
    fn test_resolve_accepts_aliases_and_rejects_unknown_ids() {
        let manager = HandlerManager::new(ServicesConfig::all_enabled(), registry());
        assert_eq!(manager.resolve("redis").unwrap().kind(), ServiceKind::Valkey);
        assert!(matches!(
            manager.resolve("mongodb"),
            Err(AppError::ServiceNotFound(_))
        ));
    }

    #[test]
    fn test_statuses_hide_passwords() {
        let manager = HandlerManager::new(ServicesConfig::all_enabled(), registry());
        let statuses = manager.statuses();
        assert_eq!(statuses.len(), 4);

        let valkey = &statuses[1];
        assert!(valkey.available);
        assert_eq!(valkey.source.as_deref(), Some("binding:cache"));
        let json = serde_json::to_value(valkey).unwrap();
        assert!(json["connection"].get("password").is_none());

        let postgres = &statuses[3];
        assert!(!postgres.available);
        assert_eq!(postgres.reason.as_deref(), Some("not configured"));
    }

    #[tokio::test]
    async fn test_run_validates_before_dispatch() {
        let manager = HandlerManager::new(ServicesConfig::all_enabled(), registry());
        let err = manager
            .run(
                ServiceKind::Valkey,
                Operation::ListKeys {
                    pattern: "*".into(),
                    limit: 0,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
