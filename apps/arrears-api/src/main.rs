use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrears_kernel::ModuleContainer;
use arrears_modules::{default_modules, demo};
use arrears_protocol::{ApiToken, AppConfig, AuthSettings, BusSettings, Environment};
use arrears_store::MemoryDatabase;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "arrears-api")]
#[command(about = "arrears HTTP API")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1:8787")]
    listen: SocketAddr,
    #[arg(long, default_value = "development")]
    environment: Environment,
    #[arg(long, default_value_t = 16)]
    max_call_depth: usize,
    /// Calls slower than this many milliseconds are logged as warnings.
    #[arg(long, default_value_t = 250)]
    slow_call_ms: u64,
    /// Static bearer token, `token=subject:role1,role2`. Repeatable.
    #[arg(long = "api-token", value_name = "TOKEN=SUBJECT:ROLES")]
    api_tokens: Vec<ApiToken>,
    /// Reject requests without a bearer token.
    #[arg(long)]
    no_anonymous: bool,
    #[arg(long)]
    seed_demo: bool,
}

impl Cli {
    fn config(&self) -> AppConfig {
        AppConfig {
            environment: self.environment,
            bus: BusSettings {
                max_call_depth: self.max_call_depth,
                slow_call_threshold_ms: self.slow_call_ms,
            },
            auth: AuthSettings {
                allow_anonymous: !self.no_anonymous,
                tokens: self.api_tokens.clone(),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = cli.config();

    let database = MemoryDatabase::new();
    if cli.seed_demo {
        demo::seed(&database).await.context("seeding demo data")?;
    }

    let kernel = ModuleContainer::new(config, Arc::new(database))
        .modules(default_modules()?)
        .start()
        .await
        .context("startup aborted")?;

    let app = kernel.router().layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!(
        listen = %cli.listen,
        environment = %cli.environment,
        procedures = kernel.bus().len(),
        tokens = cli.api_tokens.len(),
        "arrears-api listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(error) => {
                    tracing::error!(%error, "failed to install SIGTERM handler");
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}

#[cfg(test)]
mod tests {
    use arrears_protocol::Role;

    use super::*;

    #[test]
    fn flags_populate_the_app_config() {
        let cli = Cli::try_parse_from([
            "arrears-api",
            "--environment",
            "prod",
            "--slow-call-ms",
            "50",
            "--api-token",
            "t1=alice:staff",
            "--api-token",
            "t2=bob",
            "--no-anonymous",
        ])
        .unwrap();
        let config = cli.config();

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.bus.max_call_depth, 16);
        assert_eq!(config.bus.slow_call_threshold_ms, 50);
        assert!(!config.auth.allow_anonymous);
        assert_eq!(config.auth.tokens.len(), 2);
        assert!(config.auth.tokens[0].identity.has_role(Role::Staff));
        assert!(config.auth.tokens[1].identity.roles.is_empty());
    }

    #[test]
    fn malformed_token_is_a_usage_error() {
        let result = Cli::try_parse_from(["arrears-api", "--api-token", "no-equals-sign"]);
        assert!(result.is_err());
    }
}
