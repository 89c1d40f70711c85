//! RabbitMQ / Valkey / MySQL / PostgreSQL 服务处理器
//!
//! One [`ServiceHandler`] per backend kind. Handlers are stateless apart from
//! their connection descriptor; every operation opens and closes its own
//! connection.

pub mod handler;
pub mod manager;
pub mod mysql;
pub mod postgres;
pub mod rabbitmq;
mod sql;
pub mod valkey;

pub use handler::ServiceHandler;
pub use manager::{create_handler, HandlerManager};
pub use mysql::MySqlHandler;
pub use postgres::PostgresHandler;
pub use rabbitmq::RabbitMqHandler;
pub use valkey::ValkeyHandler;
