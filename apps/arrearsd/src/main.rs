use std::sync::Arc;

use anyhow::{Context, Result};
use arrears_bus::BusError;
use arrears_kernel::{Kernel, ModuleContainer};
use arrears_modules::{default_modules, demo};
use arrears_protocol::{AppConfig, Identity, Role};
use arrears_store::MemoryDatabase;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "arrearsd")]
#[command(about = "Boot the arrears kernel offline and call procedures")]
struct Cli {
    /// Start from empty tables instead of the demo data.
    #[arg(long)]
    empty: bool,
    #[arg(long, default_value = "operator")]
    subject: String,
    #[arg(long = "role", default_value = "staff")]
    roles: Vec<Role>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List registered procedures with their schemas.
    Procedures {
        #[arg(long)]
        schemas: bool,
    },
    /// Show module lifecycle states.
    Modules,
    /// Call a procedure by qualified name with a JSON payload.
    Exec {
        name: String,
        #[arg(default_value = "{}")]
        payload: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let kernel = boot(!cli.empty).await?;

    match cli.command {
        Command::Procedures { schemas } => {
            for info in kernel.bus().procedures() {
                println!(
                    "{:<32} {:<10} {}",
                    info.qualified_name,
                    info.module,
                    info.description.as_deref().unwrap_or("")
                );
                if schemas {
                    println!("  payload:  {}", info.payload_schema);
                    println!("  response: {}", info.response_schema);
                }
            }
        }
        Command::Modules => {
            for report in kernel.modules() {
                println!("{:<12} {:?}", report.name, report.state);
            }
        }
        Command::Exec { name, payload } => {
            let identity = Identity::new(cli.subject, cli.roles);
            let response = exec(&kernel, identity, &name, &payload).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}

async fn boot(seed: bool) -> Result<Kernel> {
    let database = MemoryDatabase::new();
    if seed {
        demo::seed(&database).await.context("seeding demo data")?;
    }
    let kernel = ModuleContainer::new(AppConfig::default(), Arc::new(database))
        .modules(default_modules()?)
        .start()
        .await
        .context("startup aborted")?;
    info!(procedures = kernel.bus().len(), "kernel ready");
    Ok(kernel)
}

async fn exec(kernel: &Kernel, identity: Identity, name: &str, payload: &str) -> Result<Value> {
    let payload: Value = serde_json::from_str(payload).context("payload is not valid JSON")?;
    let context = kernel.context(Some(identity));
    kernel
        .bus()
        .exec_by_name(&context, name, payload)
        .await
        .map_err(|error| {
            if let BusError::InvalidPayload { violations, .. } = &error {
                for violation in violations {
                    error!(path = %violation.path, message = %violation.message, "payload violation");
                }
            }
            anyhow::Error::new(error)
        })
        .with_context(|| format!("{name} failed"))
}
