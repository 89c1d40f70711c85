//! Human-readable rendering of operation results.

use common::models::OperationResult;
use serde_json::Value;

/// Renders a successful result for the terminal.
pub fn render(result: &OperationResult) -> String {
    let mut out = format!("✓ {}\n", result.message);
    let Some(payload) = &result.payload else {
        return out;
    };

    match result.action.as_str() {
        "list-tables" => bullets(&mut out, payload, "tables", "No tables found", |t| {
            let mut line = format!("{} ({} rows", str_of(t, "name"), t["row_count"]);
            if let Some(size) = t["size"].as_str() {
                line.push_str(", ");
                line.push_str(size);
            }
            line.push(')');
            line
        }),
        "list-queues" => {
            if let Some(note) = payload["note"].as_str() {
                out.push_str(&format!("  {note}\n"));
            }
            bullets(&mut out, payload, "queues", "No queues found", |q| {
                format!(
                    "{} ({} messages, {} consumers)",
                    str_of(q, "name"),
                    q["messages"],
                    q["consumers"]
                )
            })
        }
        "list-keys" => bullets(&mut out, payload, "keys", "No keys found", |k| {
            let mut line = format!("{} [{}]", str_of(k, "key"), str_of(k, "type"));
            if let Some(ttl) = k["ttl"].as_i64() {
                line.push_str(&format!(" ttl={ttl}s"));
            }
            if let Some(preview) = k["value_preview"].as_str() {
                line.push_str(&format!(" {preview}"));
            }
            line
        }),
        "show-table" => {
            if let Some(rows) = payload["rows"].as_array() {
                for row in rows {
                    out.push_str(&format!("  {row}\n"));
                }
            }
        }
        _ => {
            let pretty = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
            for line in pretty.lines() {
                out.push_str("  ");
                out.push_str(line);
                out.push('\n');
            }
        }
    }
    out
}

fn bullets(out: &mut String, payload: &Value, field: &str, empty: &str, line: impl Fn(&Value) -> String) {
    match payload[field].as_array() {
        Some(items) if !items.is_empty() => {
            for item in items {
                out.push_str(&format!("  • {}\n", line(item)));
            }
        }
        _ => {
            out.push_str(&format!("  {empty}\n"));
        }
    }
}

fn str_of<'a>(value: &'a Value, field: &str) -> &'a str {
    value[field].as_str().unwrap_or("?")
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::models::ServiceKind;
    use serde_json::json;

    #[test]
    fn test_table_listing_as_bullets() {
        let result = OperationResult::ok(
            ServiceKind::MySql,
            "list-tables",
            "2 table(s) in 'appdb'",
            json!({"database": "appdb", "count": 2, "tables": [
                {"name": "users", "row_count": 3, "size": "16.00 KB"},
                {"name": "orders", "row_count": 0}
            ]}),
        );
        let text = render(&result);
        assert!(text.starts_with("✓ 2 table(s) in 'appdb'\n"));
        assert!(text.contains("  • users (3 rows, 16.00 KB)\n"));
        assert!(text.contains("  • orders (0 rows)\n"));
    }

    #[test]
    fn test_empty_queue_listing_shows_note() {
        let result = OperationResult::ok(
            ServiceKind::RabbitMq,
            "list-queues",
            "management API not configured",
            json!({"vhost": "/", "queues": [], "count": 0, "note": "set RABBITMQ_MANAGEMENT_URL"}),
        );
        let text = render(&result);
        assert!(text.contains("set RABBITMQ_MANAGEMENT_URL"));
        assert!(text.contains("No queues found"));
    }

    #[test]
    fn test_other_payloads_are_pretty_printed() {
        let result = OperationResult::ok(
            ServiceKind::Valkey,
            "get",
            "key 'k' found",
            json!({"key": "k", "value": "v"}),
        );
        let text = render(&result);
        assert!(text.contains("  \"value\": \"v\""));
    }
}
