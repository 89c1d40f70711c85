//! Valkey (Redis-compatible) handler.

use async_trait::async_trait;
use common::errors::{AppError, AppResult};
use common::models::operation::DEFAULT_TEST_KEY;
use common::models::{
    ConnectionDescriptor, KeyInfo, KeyListing, Operation, OperationResult, ServiceKind,
};
use redis::aio::MultiplexedConnection;
use redis::RedisResult;
use serde_json::json;

use crate::handler::{encode_component, to_payload, unsupported, uri_host, ServiceHandler};

const KIND: ServiceKind = ServiceKind::Valkey;
const TEST_KEY_TTL_SECS: i64 = 60;
const SCAN_BATCH: u32 = 100;
const PREVIEW_CHARS: usize = 100;

/// The commands the handler issues.
#[async_trait]
pub(crate) trait KeyValueStore: Send {
    /// `SET`, with `EX` when a positive TTL is given.
    async fn set(&mut self, key: &str, value: &str, ttl: Option<u64>) -> RedisResult<()>;
    async fn get(&mut self, key: &str) -> RedisResult<Option<String>>;
    async fn expire(&mut self, key: &str, seconds: i64) -> RedisResult<()>;
    /// Remaining TTL; `-1` without expiry, `-2` for a missing key.
    async fn ttl(&mut self, key: &str) -> RedisResult<i64>;
    async fn exists(&mut self, key: &str) -> RedisResult<bool>;
    /// Returns whether the key existed.
    async fn delete(&mut self, key: &str) -> RedisResult<bool>;
    async fn scan(&mut self, cursor: u64, pattern: &str, count: u32) -> RedisResult<(u64, Vec<String>)>;
    async fn key_type(&mut self, key: &str) -> RedisResult<String>;
    /// Element count of a hash, list, set or sorted set.
    async fn cardinality(&mut self, key: &str, key_type: &str) -> RedisResult<Option<i64>>;
}

#[async_trait]
impl KeyValueStore for MultiplexedConnection {
    async fn set(&mut self, key: &str, value: &str, ttl: Option<u64>) -> RedisResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(seconds) = ttl.filter(|s| *s > 0) {
            cmd.arg("EX").arg(seconds);
        }
        cmd.query_async(self).await
    }

    async fn get(&mut self, key: &str) -> RedisResult<Option<String>> {
        redis::cmd("GET").arg(key).query_async(self).await
    }

    async fn expire(&mut self, key: &str, seconds: i64) -> RedisResult<()> {
        let _: i64 = redis::cmd("EXPIRE").arg(key).arg(seconds).query_async(self).await?;
        Ok(())
    }

    async fn ttl(&mut self, key: &str) -> RedisResult<i64> {
        redis::cmd("TTL").arg(key).query_async(self).await
    }

    async fn exists(&mut self, key: &str) -> RedisResult<bool> {
        redis::cmd("EXISTS").arg(key).query_async(self).await
    }

    async fn delete(&mut self, key: &str) -> RedisResult<bool> {
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(self).await?;
        Ok(removed > 0)
    }

    async fn scan(&mut self, cursor: u64, pattern: &str, count: u32) -> RedisResult<(u64, Vec<String>)> {
        redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(self)
            .await
    }

    async fn key_type(&mut self, key: &str) -> RedisResult<String> {
        redis::cmd("TYPE").arg(key).query_async(self).await
    }

    async fn cardinality(&mut self, key: &str, key_type: &str) -> RedisResult<Option<i64>> {
        let command = match key_type {
            "hash" => "HLEN",
            "list" => "LLEN",
            "set" => "SCARD",
            "zset" => "ZCARD",
            _ => return Ok(None),
        };
        let count: i64 = redis::cmd(command).arg(key).query_async(self).await?;
        Ok(Some(count))
    }
}

/// Handler for a Valkey or Redis instance.
pub struct ValkeyHandler {
    descriptor: ConnectionDescriptor,
}

impl ValkeyHandler {
    pub fn new(descriptor: ConnectionDescriptor) -> Self {
        Self { descriptor }
    }

    /// Connection URL: `redis[s]://[user][:password]@host:port[/db]`.
    fn url(&self) -> String {
        let d = &self.descriptor;
        let scheme = if d.secure { "rediss" } else { "redis" };
        let auth = match (d.username.as_deref(), d.password.as_deref()) {
            (_, None) | (_, Some("")) => String::new(),
            (Some(user), Some(password)) if !user.is_empty() => {
                format!("{}:{}@", encode_component(user), encode_component(password))
            }
            (_, Some(password)) => format!(":{}@", encode_component(password)),
        };
        let mut url = format!("{scheme}://{auth}{}:{}", uri_host(&d.host), d.port);
        if let Some(db) = d.database.as_deref().and_then(|db| db.parse::<u32>().ok()) {
            url.push_str(&format!("/{db}"));
        }
        url
    }

    async fn connect(&self) -> AppResult<MultiplexedConnection> {
        let client =
            redis::Client::open(self.url()).map_err(|e| AppError::connection(KIND, e))?;
        client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::connection(KIND, e))
    }
}

fn supports(operation: &Operation) -> bool {
    matches!(
        operation,
        Operation::Test { .. }
            | Operation::SetKey { .. }
            | Operation::GetKey { .. }
            | Operation::KeyExists { .. }
            | Operation::DeleteKey { .. }
            | Operation::ListKeys { .. }
    )
}

/// Runs one operation against an open store.
async fn perform<S: KeyValueStore>(store: &mut S, operation: Operation) -> AppResult<OperationResult> {
    let action = operation.action();
    let op = |e: redis::RedisError| AppError::operation(KIND, action, e);

    match operation {
        test @ Operation::Test { .. } => {
            let params = test.test_params().unwrap_or_default();
            let key = params.key.clone().unwrap_or_else(|| DEFAULT_TEST_KEY.to_string());
            let value = params.value_or_default();

            store.set(&key, &value, None).await.map_err(op)?;
            let retrieved = store.get(&key).await.map_err(op)?;
            store.expire(&key, TEST_KEY_TTL_SECS).await.map_err(op)?;
            let ttl = store.ttl(&key).await.map_err(op)?;

            Ok(OperationResult::ok(
                KIND,
                action,
                format!("set and read back key '{key}'"),
                json!({
                    "action": "set_and_get",
                    "key": key,
                    "set_value": value,
                    "retrieved_value": retrieved,
                    "ttl": ttl,
                    "status": "success",
                }),
            ))
        }
        Operation::SetKey { key, value, ttl } => {
            store.set(&key, &value, ttl).await.map_err(op)?;
            Ok(OperationResult::ok(
                KIND,
                action,
                format!("key '{key}' set"),
                json!({"key": key, "value": value, "ttl": ttl}),
            ))
        }
        Operation::GetKey { key } => {
            let value = store.get(&key).await.map_err(op)?;
            let message = match value {
                Some(_) => format!("key '{key}' read"),
                None => format!("key '{key}' does not exist"),
            };
            Ok(OperationResult::ok(
                KIND,
                action,
                message,
                json!({"key": key, "exists": value.is_some(), "value": value}),
            ))
        }
        Operation::KeyExists { key } => {
            let exists = store.exists(&key).await.map_err(op)?;
            Ok(OperationResult::ok(
                KIND,
                action,
                format!("key '{key}' {}", if exists { "exists" } else { "does not exist" }),
                json!({"key": key, "exists": exists}),
            ))
        }
        Operation::DeleteKey { key } => {
            let deleted = store.delete(&key).await.map_err(op)?;
            Ok(OperationResult::ok(
                KIND,
                action,
                if deleted {
                    format!("key '{key}' deleted")
                } else {
                    format!("key '{key}' did not exist")
                },
                json!({"key": key, "deleted": deleted}),
            ))
        }
        Operation::ListKeys { pattern, limit } => {
            let listing = list_keys(store, pattern, limit as usize).await.map_err(op)?;
            Ok(OperationResult::ok(
                KIND,
                action,
                format!("{} key(s) found", listing.count),
                to_payload(&listing)?,
            ))
        }
        other => Err(unsupported(KIND, &other)),
    }
}

async fn list_keys<S: KeyValueStore>(
    store: &mut S,
    pattern: String,
    limit: usize,
) -> RedisResult<KeyListing> {
    let mut names: Vec<String> = Vec::new();
    let mut cursor: u64 = 0;
    loop {
        let (next, batch) = store.scan(cursor, &pattern, SCAN_BATCH).await?;
        names.extend(batch);
        cursor = next;
        // One key past the limit is enough to know the listing is truncated.
        if cursor == 0 || names.len() > limit {
            break;
        }
    }
    names.sort();
    names.dedup();
    let truncated = names.len() > limit;
    names.truncate(limit);

    let mut keys = Vec::with_capacity(names.len());
    for name in names {
        keys.push(describe_key(store, name).await?);
    }
    Ok(KeyListing {
        pattern,
        count: keys.len(),
        keys,
        truncated,
    })
}

/// Reads a key's type, TTL and a short value preview.
async fn describe_key<S: KeyValueStore>(store: &mut S, key: String) -> RedisResult<KeyInfo> {
    let key_type = store.key_type(&key).await?;
    let ttl = store.ttl(&key).await?;

    let value_preview = match key_type.as_str() {
        "string" => store.get(&key).await?.map(|v| preview(&v)),
        "hash" => store
            .cardinality(&key, &key_type)
            .await?
            .map(|n| format!("{n} field(s)")),
        "list" => store
            .cardinality(&key, &key_type)
            .await?
            .map(|n| format!("{n} item(s)")),
        "set" | "zset" => store
            .cardinality(&key, &key_type)
            .await?
            .map(|n| format!("{n} member(s)")),
        _ => None,
    };

    Ok(KeyInfo {
        key,
        key_type,
        ttl: (ttl >= 0).then_some(ttl),
        value_preview,
    })
}

fn preview(value: &str) -> String {
    if value.chars().count() <= PREVIEW_CHARS {
        value.to_string()
    } else {
        let head: String = value.chars().take(PREVIEW_CHARS).collect();
        format!("{head}...")
    }
}

#[async_trait]
impl ServiceHandler for ValkeyHandler {
    fn kind(&self) -> ServiceKind {
        KIND
    }

    fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    async fn execute(&self, operation: Operation) -> AppResult<OperationResult> {
        if !supports(&operation) {
            return Err(unsupported(KIND, &operation));
        }
        let mut conn = self.connect().await?;
        perform(&mut conn, operation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::discovery::discover;
    use std::collections::{BTreeMap, HashMap};

    /// In-memory store with second-granularity TTLs that never tick.
    #[derive(Default)]
    struct MemoryStore {
        entries: BTreeMap<String, (String, Option<i64>)>,
    }

    #[async_trait]
    impl KeyValueStore for MemoryStore {
        async fn set(&mut self, key: &str, value: &str, ttl: Option<u64>) -> RedisResult<()> {
            let ttl = ttl.filter(|s| *s > 0).map(|s| s as i64);
            self.entries.insert(key.to_string(), (value.to_string(), ttl));
            Ok(())
        }

        async fn get(&mut self, key: &str) -> RedisResult<Option<String>> {
            Ok(self.entries.get(key).map(|(v, _)| v.clone()))
        }

        async fn expire(&mut self, key: &str, seconds: i64) -> RedisResult<()> {
            if let Some(entry) = self.entries.get_mut(key) {
                entry.1 = Some(seconds);
            }
            Ok(())
        }

        async fn ttl(&mut self, key: &str) -> RedisResult<i64> {
            Ok(match self.entries.get(key) {
                Some((_, Some(ttl))) => *ttl,
                Some((_, None)) => -1,
                None => -2,
            })
        }

        async fn exists(&mut self, key: &str) -> RedisResult<bool> {
            Ok(self.entries.contains_key(key))
        }

        async fn delete(&mut self, key: &str) -> RedisResult<bool> {
            Ok(self.entries.remove(key).is_some())
        }

        async fn scan(&mut self, _cursor: u64, pattern: &str, _count: u32) -> RedisResult<(u64, Vec<String>)> {
            let prefix = pattern.trim_end_matches('*');
            let keys = self
                .entries
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect();
            Ok((0, keys))
        }

        async fn key_type(&mut self, key: &str) -> RedisResult<String> {
            Ok(if self.entries.contains_key(key) { "string" } else { "none" }.to_string())
        }

        async fn cardinality(&mut self, _key: &str, _key_type: &str) -> RedisResult<Option<i64>> {
            Ok(None)
        }
    }

    fn handler(password: Option<&str>, secure: bool) -> ValkeyHandler {
        let mut descriptor = ConnectionDescriptor::new(KIND, "cache.internal", 6380);
        descriptor.password = password.map(str::to_string);
        descriptor.secure = secure;
        ValkeyHandler::new(descriptor)
    }

    fn set(key: &str, value: &str) -> Operation {
        Operation::SetKey {
            key: key.into(),
            value: value.into(),
            ttl: None,
        }
    }

    #[test]
    fn test_url_without_password() {
        assert_eq!(handler(None, false).url(), "redis://cache.internal:6380");
    }

    #[test]
    fn test_url_with_password_and_tls() {
        assert_eq!(
            handler(Some("s3cr@t"), true).url(),
            "rediss://:s3cr%40t@cache.internal:6380"
        );
    }

    #[test]
    fn test_url_with_acl_user() {
        let mut h = handler(Some("pw"), false);
        h.descriptor.username = Some("app".into());
        assert_eq!(h.url(), "redis://app:pw@cache.internal:6380");
    }

    #[test]
    fn test_url_keeps_database_index() {
        let mut h = handler(None, false);
        h.descriptor.database = Some("2".into());
        assert_eq!(h.url(), "redis://cache.internal:6380/2");

        h.descriptor.database = Some("cache".into());
        assert_eq!(h.url(), "redis://cache.internal:6380");
    }

    #[test]
    fn test_url_from_discovered_uri_with_database() {
        let env = HashMap::from([(
            "VALKEY_URL".to_string(),
            "redis://cache:6379/2".to_string(),
        )]);
        let descriptor = discover(&env).get(KIND).unwrap().clone();
        assert_eq!(ValkeyHandler::new(descriptor).url(), "redis://cache:6379/2");
    }

    #[test]
    fn test_url_brackets_ipv6_host() {
        let h = ValkeyHandler::new(ConnectionDescriptor::new(KIND, "::1", 6379));
        assert_eq!(h.url(), "redis://[::1]:6379");
    }

    #[test]
    fn test_preview_truncates_long_values() {
        assert_eq!(preview("short"), "short");
        let long = "x".repeat(150);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
    }

    #[tokio::test]
    async fn test_set_is_idempotent() {
        let mut store = MemoryStore::default();
        perform(&mut store, set("greeting", "stable")).await.unwrap();
        perform(&mut store, set("greeting", "stable")).await.unwrap();

        let first = perform(&mut store, Operation::GetKey { key: "greeting".into() })
            .await
            .unwrap();
        let second = perform(&mut store, Operation::GetKey { key: "greeting".into() })
            .await
            .unwrap();
        assert_eq!(first.payload, second.payload);
        assert_eq!(first.payload.unwrap()["value"], "stable");
        assert_eq!(store.entries.len(), 1);
    }

    #[tokio::test]
    async fn test_transaction_sets_ttl() {
        let mut store = MemoryStore::default();
        let result = perform(
            &mut store,
            Operation::Test {
                table_name: None,
                queue_name: None,
                key: None,
                value: Some("v".into()),
                message: None,
            },
        )
        .await
        .unwrap();
        let payload = result.payload.unwrap();
        assert_eq!(payload["key"], DEFAULT_TEST_KEY);
        assert_eq!(payload["retrieved_value"], "v");
        assert_eq!(payload["ttl"], TEST_KEY_TTL_SECS);
    }

    #[tokio::test]
    async fn test_delete_then_exists() {
        let mut store = MemoryStore::default();
        perform(&mut store, set("k", "v")).await.unwrap();
        let deleted = perform(&mut store, Operation::DeleteKey { key: "k".into() })
            .await
            .unwrap();
        assert_eq!(deleted.payload.unwrap()["deleted"], true);

        let exists = perform(&mut store, Operation::KeyExists { key: "k".into() })
            .await
            .unwrap();
        assert_eq!(exists.message, "key 'k' does not exist");
        let missing = perform(&mut store, Operation::DeleteKey { key: "k".into() })
            .await
            .unwrap();
        assert_eq!(missing.payload.unwrap()["deleted"], false);
    }

    #[tokio::test]
    async fn test_list_keys_truncates_at_limit() {
        let mut store = MemoryStore::default();
        for key in ["user:1", "user:2", "user:3", "session:1"] {
            perform(&mut store, set(key, "x")).await.unwrap();
        }
        let result = perform(
            &mut store,
            Operation::ListKeys {
                pattern: "user:*".into(),
                limit: 2,
            },
        )
        .await
        .unwrap();

        let payload = result.payload.unwrap();
        assert_eq!(payload["count"], 2);
        assert_eq!(payload["truncated"], true);
        assert_eq!(payload["keys"][0]["key"], "user:1");
        assert_eq!(payload["keys"][0]["value_preview"], "x");
    }

    #[tokio::test]
    async fn test_relational_actions_are_unsupported() {
        let err = handler(None, false)
            .execute(Operation::ListTables)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnsupportedOperation { .. }));
    }
}
