//! Cloud Foundry 服务连通性测试命令行工具
//!
//! Runs one operation against one bound service and exits non-zero when it
//! fails.

mod commands;
mod output;

use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use common::config::{load_dotenv, AppConfig, ServicesConfig};
use common::discovery::{discover, ProcessEnv};
use common::models::OperationResult;
use handlers::HandlerManager;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::Cli;

const SERVICE_NAME: &str = "cf-service-tester";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    load_dotenv();

    // 日志输出到 stderr，避免混入结果
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("✗ {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let services = load_services(cli.config.as_deref())?;
    let manager = HandlerManager::new(services, discover(&ProcessEnv));

    let (kind, operation) = cli.service.into_operation();
    let action = operation.action();

    match manager.run(kind, operation).await {
        Ok(result) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print!("{}", output::render(&result));
            }
            Ok(())
        }
        Err(e) => {
            if cli.json {
                let failed = OperationResult::failed(kind, action, &e);
                println!("{}", serde_json::to_string_pretty(&failed)?);
            }
            Err(e.into())
        }
    }
}

/// Loads the enablement document.
///
/// An explicit `--config` must exist. Without one, the default location is
/// used when present and every service is enabled otherwise.
fn load_services(explicit: Option<&Path>) -> anyhow::Result<ServicesConfig> {
    if let Some(path) = explicit {
        return ServicesConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()));
    }

    let path = AppConfig::load_with_service(SERVICE_NAME).services_config_path;
    if path.exists() {
        Ok(ServicesConfig::load(&path)?)
    } else {
        tracing::debug!(path = %path.display(), "no services configuration, enabling every service");
        Ok(ServicesConfig::all_enabled())
    }
}
