//! Command-line grammar.
//!
//! `cf-service-tester <service> <action> [options]`, one subcommand tree per
//! service kind. Every action maps onto exactly one [`Operation`].

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use common::models::operation::{DEFAULT_TEST_KEY, DEFAULT_TEST_QUEUE, DEFAULT_TEST_TABLE};
use common::models::{Operation, ServiceKind};
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(name = "cf-service-tester")]
#[command(about = "Test connectivity to RabbitMQ, Valkey, MySQL and PostgreSQL services bound on Cloud Foundry")]
#[command(version)]
#[command(after_help = "Credentials come from VCAP_SERVICES, or from <KIND>_HOST / <KIND>_PORT / ... when unbound.")]
pub struct Cli {
    /// Services enablement document (defaults to $SERVICES_CONFIG or services-config.yml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the raw result as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub service: ServiceCommand,
}

#[derive(Debug, Subcommand)]
pub enum ServiceCommand {
    /// RabbitMQ message broker
    Rabbitmq {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Valkey / Redis cache
    #[command(alias = "redis")]
    Valkey {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// MySQL database
    Mysql {
        #[command(subcommand)]
        action: SqlAction,
    },

    /// PostgreSQL database
    #[command(alias = "postgresql")]
    Postgres {
        #[command(subcommand)]
        action: SqlAction,
    },
}

impl ServiceCommand {
    /// Target kind and the operation to run against it.
    pub fn into_operation(self) -> (ServiceKind, Operation) {
        match self {
            ServiceCommand::Rabbitmq { action } => (ServiceKind::RabbitMq, action.into()),
            ServiceCommand::Valkey { action } => (ServiceKind::Valkey, action.into()),
            ServiceCommand::Mysql { action } => (ServiceKind::MySql, action.into()),
            ServiceCommand::Postgres { action } => (ServiceKind::Postgres, action.into()),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum SqlAction {
    /// List tables with row counts
    ListTables,

    /// Show a page of a table's rows
    ShowTable {
        #[arg(long)]
        table: String,

        #[arg(long, default_value = "50")]
        limit: u32,

        #[arg(long, default_value = "0")]
        offset: u32,
    },

    /// Create a table if needed, insert a row and read it back
    Test {
        #[arg(long, default_value = DEFAULT_TEST_TABLE)]
        table_name: String,

        /// Value to insert (defaults to a timestamped message)
        #[arg(long)]
        value: Option<String>,
    },

    /// Insert one row
    Create {
        #[arg(long)]
        table: String,

        /// Column values as a JSON object
        #[arg(long, value_parser = parse_json_object)]
        data: Value,
    },

    /// Update rows matching a WHERE clause
    Update {
        #[arg(long)]
        table: String,

        /// WHERE clause with %s or ? placeholders
        #[arg(long = "where")]
        where_clause: String,

        /// Placeholder values as a JSON array
        #[arg(long, default_value = "[]", value_parser = parse_json_array)]
        where_values: ::std::vec::Vec<Value>,

        /// New column values as a JSON object
        #[arg(long, value_parser = parse_json_object)]
        data: Value,
    },

    /// Delete rows matching a WHERE clause
    Delete {
        #[arg(long)]
        table: String,

        /// WHERE clause with %s or ? placeholders
        #[arg(long = "where")]
        where_clause: String,

        /// Placeholder values as a JSON array
        #[arg(long, default_value = "[]", value_parser = parse_json_array)]
        where_values: ::std::vec::Vec<Value>,
    },
}

impl From<SqlAction> for Operation {
    fn from(action: SqlAction) -> Self {
        match action {
            SqlAction::ListTables => Operation::ListTables,
            SqlAction::ShowTable {
                table,
                limit,
                offset,
            } => Operation::ShowTable {
                table,
                limit,
                offset,
            },
            SqlAction::Test { table_name, value } => Operation::Test {
                table_name: Some(table_name),
                queue_name: None,
                key: None,
                value,
                message: None,
            },
            SqlAction::Create { table, data } => Operation::CreateRow { table, data },
            SqlAction::Update {
                table,
                where_clause,
                where_values,
                data,
            } => Operation::UpdateRows {
                table,
                where_clause,
                where_values,
                data,
            },
            SqlAction::Delete {
                table,
                where_clause,
                where_values,
            } => Operation::DeleteRows {
                table,
                where_clause,
                where_values,
            },
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum QueueAction {
    /// List queues through the management API
    ListQueues,

    /// Publish a message and consume it back
    Test {
        #[arg(long, default_value = DEFAULT_TEST_QUEUE)]
        queue_name: String,

        /// Message to publish (defaults to a timestamped message)
        #[arg(long)]
        message: Option<String>,
    },

    /// Publish a message
    Publish {
        #[arg(long)]
        queue: String,

        #[arg(long)]
        message: String,

        /// Declare the queue durable
        #[arg(long)]
        durable: bool,
    },

    /// Fetch one message
    Consume {
        #[arg(long)]
        queue: String,

        /// Leave the message on the queue
        #[arg(long)]
        no_ack: bool,
    },

    /// Drop every message of a queue
    Purge {
        #[arg(long)]
        queue: String,
    },

    /// Delete a queue
    DeleteQueue {
        #[arg(long)]
        queue: String,

        #[arg(long)]
        if_unused: bool,

        #[arg(long)]
        if_empty: bool,
    },
}

impl From<QueueAction> for Operation {
    fn from(action: QueueAction) -> Self {
        match action {
            QueueAction::ListQueues => Operation::ListQueues,
            QueueAction::Test {
                queue_name,
                message,
            } => Operation::Test {
                table_name: None,
                queue_name: Some(queue_name),
                key: None,
                value: None,
                message,
            },
            QueueAction::Publish {
                queue,
                message,
                durable,
            } => Operation::Publish {
                queue,
                message,
                durable,
            },
            QueueAction::Consume { queue, no_ack } => Operation::Consume { queue, ack: !no_ack },
            QueueAction::Purge { queue } => Operation::Purge { queue },
            QueueAction::DeleteQueue {
                queue,
                if_unused,
                if_empty,
            } => Operation::DeleteQueue {
                queue,
                if_unused,
                if_empty,
            },
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum KeyAction {
    /// List keys matching a pattern
    ListKeys {
        #[arg(long, default_value = "*")]
        pattern: String,

        #[arg(long, default_value = "100")]
        limit: u32,
    },

    /// Set a key with a TTL and read it back
    Test {
        #[arg(long, default_value = DEFAULT_TEST_KEY)]
        key: String,

        /// Value to set (defaults to a timestamped message)
        #[arg(long)]
        value: Option<String>,
    },

    /// Set a key
    Set {
        #[arg(long)]
        key: String,

        #[arg(long)]
        value: String,

        /// Expiry in seconds
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Read a key
    Get {
        #[arg(long)]
        key: String,
    },

    /// Check whether a key exists
    Exists {
        #[arg(long)]
        key: String,
    },

    /// Delete a key
    Delete {
        #[arg(long)]
        key: String,
    },
}

impl From<KeyAction> for Operation {
    fn from(action: KeyAction) -> Self {
        match action {
            KeyAction::ListKeys { pattern, limit } => Operation::ListKeys { pattern, limit },
            KeyAction::Test { key, value } => Operation::Test {
                table_name: None,
                queue_name: None,
                key: Some(key),
                value,
                message: None,
            },
            KeyAction::Set { key, value, ttl } => Operation::SetKey { key, value, ttl },
            KeyAction::Get { key } => Operation::GetKey { key },
            KeyAction::Exists { key } => Operation::KeyExists { key },
            KeyAction::Delete { key } => Operation::DeleteKey { key },
        }
    }
}

fn parse_json_object(raw: &str) -> Result<Value, String> {
    match serde_json::from_str(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}

fn parse_json_array(raw: &str) -> Result<Vec<Value>, String> {
    match serde_json::from_str(raw) {
        Ok(Value::Array(values)) => Ok(values),
        Ok(_) => Err("expected a JSON array".to_string()),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}
