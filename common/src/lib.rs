//! Cloud Foundry 服务连通性测试公共模块
//!
//! Shared by the web front-end, the CLI and the service handlers:
//! - service discovery and credential normalization
//! - data models and the API response envelope
//! - configuration, errors and middleware

pub mod config;
pub mod discovery;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;
pub mod utils;

pub use errors::{AppError, AppResult};
