//! Platform service-binding model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One bound service instance as supplied by the platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceBinding {
    /// Instance name chosen when the service was created.
    #[serde(default)]
    pub name: String,
    /// Service offering label (`p.mysql`, `user-provided`, ...).
    #[serde(default)]
    pub label: String,
    /// Tags attached to the instance.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Untyped credential mapping.
    #[serde(default)]
    pub credentials: Map<String, Value>,
}

impl ServiceBinding {
    /// Creates a binding with the given name and label.
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            ..Default::default()
        }
    }

    /// Adds tags to the binding.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the credentials from a JSON object; other values leave them empty.
    pub fn with_credentials(mut self, credentials: Value) -> Self {
        if let Value::Object(map) = credentials {
            self.credentials = map;
        }
        self
    }

    /// Whether any tag equals one of `wanted` (case-insensitive).
    pub fn has_any_tag(&self, wanted: &[&str]) -> bool {
        self.tags
            .iter()
            .any(|tag| wanted.iter().any(|w| tag.eq_ignore_ascii_case(w)))
    }

    /// Whether the name contains one of `needles` (case-insensitive).
    pub fn name_contains_any(&self, needles: &[&str]) -> bool {
        let name = self.name.to_ascii_lowercase();
        needles.iter().any(|n| name.contains(n))
    }
}
