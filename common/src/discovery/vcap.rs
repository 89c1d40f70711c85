//! `VCAP_SERVICES` parsing and binding matching.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::errors::{AppError, AppResult};
use crate::models::{ServiceBinding, ServiceKind};

/// How a binding was matched to a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchRule {
    /// Exact service-offering label.
    Label,
    /// Tag intersection.
    Tag,
    /// Substring of the instance name.
    Name,
}

/// Accepted offering labels (managed-service and platform-tier variants).
pub fn accepted_labels(kind: ServiceKind) -> &'static [&'static str] {
    match kind {
        ServiceKind::RabbitMq => &[
            "p.rabbitmq",
            "p-rabbitmq",
            "p.rabbitmq-for-kubernetes",
            "rabbitmq",
        ],
        ServiceKind::Valkey => &[
            "p.redis",
            "p-redis",
            "p.redis-for-kubernetes",
            "redis",
            "p.valkey",
            "valkey",
        ],
        ServiceKind::MySql => &["p.mysql", "p-mysql", "mysql"],
        ServiceKind::Postgres => &[
            "p.postgresql",
            "p-postgresql",
            "p.postgresql-for-kubernetes",
            "postgresql",
            "postgres",
            "p.postgres",
        ],
    }
}

fn accepted_tags(kind: ServiceKind) -> &'static [&'static str] {
    match kind {
        ServiceKind::RabbitMq => &["rabbitmq", "amqp"],
        ServiceKind::Valkey => &["valkey", "redis"],
        ServiceKind::MySql => &["mysql"],
        ServiceKind::Postgres => &["postgresql", "postgres"],
    }
}

fn name_substrings(kind: ServiceKind) -> &'static [&'static str] {
    match kind {
        ServiceKind::RabbitMq => &["rabbit"],
        ServiceKind::Valkey => &["valkey", "redis"],
        ServiceKind::MySql => &["mysql"],
        ServiceKind::Postgres => &["postgres"],
    }
}

/// Kind whose accepted labels include `label`, if any.
fn label_owner(label: &str) -> Option<ServiceKind> {
    ServiceKind::ALL
        .into_iter()
        .find(|kind| accepted_labels(*kind).iter().any(|l| *l == label))
}

/// Parses a `VCAP_SERVICES` document into a flat binding list.
///
/// Labels are visited in lexical order and bindings in array order, so the
/// result order is deterministic. A binding without its own `label` takes the
/// label it is listed under.
pub fn parse_vcap_services(raw: &str) -> AppResult<Vec<ServiceBinding>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let grouped: BTreeMap<String, Vec<ServiceBinding>> = serde_json::from_str(raw)
        .map_err(|e| AppError::Configuration(format!("invalid VCAP_SERVICES: {e}")))?;

    Ok(grouped
        .into_iter()
        .flat_map(|(label, bindings)| {
            bindings.into_iter().map(move |mut binding| {
                if binding.label.is_empty() {
                    binding.label = label.clone();
                }
                binding
            })
        })
        .collect())
}

/// Finds the binding for a kind.
///
/// Tiers are tried in order: exact label, then tags, then name substring.
/// Within a tier the first binding in list order wins. Bindings whose label
/// belongs to a different kind are never claimed through tags or names.
pub fn find_binding(
    bindings: &[ServiceBinding],
    kind: ServiceKind,
) -> Option<(&ServiceBinding, MatchRule)> {
    let labels = accepted_labels(kind);
    if let Some(binding) = bindings.iter().find(|b| labels.iter().any(|l| *l == b.label)) {
        return Some((binding, MatchRule::Label));
    }

    let candidates = move || {
        bindings
            .iter()
            .filter(move |b| label_owner(&b.label).map_or(true, |owner| owner == kind))
    };

    if let Some(binding) = candidates().find(|b| b.has_any_tag(accepted_tags(kind))) {
        return Some((binding, MatchRule::Tag));
    }
    candidates()
        .find(|b| b.name_contains_any(name_substrings(kind)))
        .map(|binding| (binding, MatchRule::Name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_assigns_group_label() {
        let raw = json!({
            "p.mysql": [{"name": "db", "tags": ["mysql"], "credentials": {"hostname": "h"}}],
            "user-provided": [{"name": "cache", "label": "user-provided", "credentials": {}}]
        })
        .to_string();
        let bindings = parse_vcap_services(&raw).unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].label, "p.mysql");
        assert_eq!(bindings[0].credentials["hostname"], "h");
        assert_eq!(bindings[1].label, "user-provided");
    }

    #[test]
    fn test_parse_empty_and_invalid() {
        assert!(parse_vcap_services("").unwrap().is_empty());
        assert!(parse_vcap_services("{}").unwrap().is_empty());
        assert!(parse_vcap_services("{not json").is_err());
    }

    #[test]
    fn test_label_beats_tag_and_name() {
        let bindings = vec![
            ServiceBinding::new("my-redis-ups", "user-provided").with_tags(["redis"]),
            ServiceBinding::new("cache", "p.redis"),
        ];
        let (binding, rule) = find_binding(&bindings, ServiceKind::Valkey).unwrap();
        assert_eq!(binding.name, "cache");
        assert_eq!(rule, MatchRule::Label);
    }

    #[test]
    fn test_tag_match_is_case_insensitive() {
        let bindings =
            vec![ServiceBinding::new("queue", "user-provided").with_tags(["AMQP", "broker"])];
        let (_, rule) = find_binding(&bindings, ServiceKind::RabbitMq).unwrap();
        assert_eq!(rule, MatchRule::Tag);
    }

    #[test]
    fn test_name_substring_match() {
        let bindings = vec![ServiceBinding::new("Orders-Postgres-Prod", "user-provided")];
        let (_, rule) = find_binding(&bindings, ServiceKind::Postgres).unwrap();
        assert_eq!(rule, MatchRule::Name);
        assert!(find_binding(&bindings, ServiceKind::MySql).is_none());
    }

    #[test]
    fn test_other_kinds_label_is_not_claimed_by_name() {
        let bindings = vec![ServiceBinding::new("mysql-for-postgres-app", "p.mysql")];
        assert!(find_binding(&bindings, ServiceKind::Postgres).is_none());
        assert!(find_binding(&bindings, ServiceKind::MySql).is_some());
    }

    #[test]
    fn test_first_match_in_list_order_wins() {
        let bindings = vec![
            ServiceBinding::new("first", "p.mysql"),
            ServiceBinding::new("second", "p-mysql"),
        ];
        let (binding, _) = find_binding(&bindings, ServiceKind::MySql).unwrap();
        assert_eq!(binding.name, "first");
    }

    #[test]
    fn test_overlapping_tags_match_each_kind() {
        let bindings =
            vec![ServiceBinding::new("shared", "user-provided").with_tags(["mysql", "postgres"])];
        assert!(find_binding(&bindings, ServiceKind::MySql).is_some());
        assert!(find_binding(&bindings, ServiceKind::Postgres).is_some());
    }
}
