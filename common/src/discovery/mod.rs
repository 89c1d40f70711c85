//! Service discovery.
//!
//! Builds the [`ServiceRegistry`] once at startup: every kind is looked up in
//! the platform's bound-service list first and in its fallback environment
//! variables second. Discovery never touches the network and never fails as a
//! whole; a kind that cannot be resolved is recorded as unavailable.

pub mod env;
pub mod normalizer;
pub mod vcap;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::errors::{AppError, AppResult};
use crate::models::{ConnectionDescriptor, ServiceBinding, ServiceKind};

pub use env::{EnvSource, ProcessEnv};
pub use normalizer::normalize;
pub use vcap::{find_binding, parse_vcap_services, MatchRule};

/// Variable holding the platform's bound-service document.
pub const VCAP_SERVICES: &str = "VCAP_SERVICES";

/// Where a descriptor came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CredentialSource {
    /// A platform binding.
    Binding {
        name: String,
        label: String,
        rule: MatchRule,
    },
    /// The kind's fallback environment variables.
    Environment,
}

/// A resolved kind.
#[derive(Debug, Clone)]
pub struct DiscoveredService {
    pub descriptor: ConnectionDescriptor,
    pub source: CredentialSource,
}

/// Why a kind is unavailable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Absence {
    /// No binding and no fallback variables.
    NotConfigured,
    /// Credentials were found but could not be normalized.
    Malformed(String),
}

/// Read-only map from kind to connection descriptor.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: BTreeMap<ServiceKind, DiscoveredService>,
    unavailable: BTreeMap<ServiceKind, Absence>,
}

impl ServiceRegistry {
    /// Descriptor for a kind.
    ///
    /// # Errors
    /// `Discovery` when nothing was configured for the kind,
    /// `MalformedCredentials` when its credentials were rejected.
    pub fn get(&self, kind: ServiceKind) -> AppResult<&ConnectionDescriptor> {
        if let Some(service) = self.services.get(&kind) {
            return Ok(&service.descriptor);
        }
        match self.unavailable.get(&kind) {
            Some(Absence::Malformed(reason)) => Err(AppError::malformed(kind, reason.clone())),
            _ => Err(AppError::Discovery {
                kind,
                reason: format!(
                    "no bound service and none of {} is set",
                    env::variable_names(kind).join(", ")
                ),
            }),
        }
    }

    /// Where a kind's descriptor came from.
    pub fn source(&self, kind: ServiceKind) -> Option<&CredentialSource> {
        self.services.get(&kind).map(|s| &s.source)
    }

    pub fn is_available(&self, kind: ServiceKind) -> bool {
        self.services.contains_key(&kind)
    }

    /// Resolved kinds in declaration order.
    pub fn available_kinds(&self) -> Vec<ServiceKind> {
        self.services.keys().copied().collect()
    }

    /// Reason a kind is unavailable, `None` when it is available.
    pub fn unavailable_reason(&self, kind: ServiceKind) -> Option<String> {
        if self.is_available(kind) {
            return None;
        }
        Some(match self.unavailable.get(&kind) {
            Some(Absence::Malformed(reason)) => format!("malformed credentials: {reason}"),
            _ => "not configured".to_string(),
        })
    }

    /// Registers a descriptor directly, replacing any earlier entry.
    pub fn insert(&mut self, descriptor: ConnectionDescriptor, source: CredentialSource) {
        let kind = descriptor.kind;
        self.unavailable.remove(&kind);
        self.services.insert(kind, DiscoveredService { descriptor, source });
    }

    fn mark_unavailable(&mut self, kind: ServiceKind, absence: Absence) {
        self.services.remove(&kind);
        self.unavailable.insert(kind, absence);
    }
}

/// Discovers every kind from `VCAP_SERVICES` and the fallback variables.
///
/// An unparseable `VCAP_SERVICES` is logged and treated as an empty binding
/// list, so the environment fallback still applies.
pub fn discover(env: &dyn EnvSource) -> ServiceRegistry {
    let bindings = match env.var(VCAP_SERVICES) {
        Some(raw) => parse_vcap_services(&raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ignoring VCAP_SERVICES");
            Vec::new()
        }),
        None => Vec::new(),
    };
    tracing::debug!(bindings = bindings.len(), "bound services parsed");
    discover_bindings(&bindings, env)
}

/// Discovers every kind from an already-parsed binding list.
pub fn discover_bindings(bindings: &[ServiceBinding], env: &dyn EnvSource) -> ServiceRegistry {
    let mut registry = ServiceRegistry::default();

    for kind in ServiceKind::ALL {
        let (credentials, source) = match find_binding(bindings, kind) {
            Some((binding, rule)) => (
                binding.credentials.clone(),
                CredentialSource::Binding {
                    name: binding.name.clone(),
                    label: binding.label.clone(),
                    rule,
                },
            ),
            None => match env::credentials_from_env(kind, env) {
                Some(credentials) => (credentials, CredentialSource::Environment),
                None => {
                    tracing::info!(service = %kind, "service not configured");
                    registry.mark_unavailable(kind, Absence::NotConfigured);
                    continue;
                }
            },
        };

        match normalize(&credentials, kind) {
            Ok(descriptor) => {
                tracing::info!(
                    service = %kind,
                    address = %descriptor.address(),
                    secure = descriptor.secure,
                    source = ?source,
                    "service discovered"
                );
                registry.insert(descriptor, source);
            }
            Err(e) => {
                tracing::warn!(service = %kind, source = ?source, error = %e, "service unavailable");
                let reason = match e {
                    AppError::MalformedCredentials { reason, .. } => reason,
                    other => other.to_string(),
                };
                registry.mark_unavailable(kind, Absence::Malformed(reason));
            }
        }
    }

    registry
}
