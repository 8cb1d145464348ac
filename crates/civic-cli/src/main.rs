//! Civic CLI
//!
//! Operator tool over the service and workflow catalogs.
//!
//! # Usage
//!
//! ```bash
//! civic services --department AGRICULTURA
//! civic validate --service "Alerta de Segurança" --payload alerta.json
//! civic workflows
//! civic remediate
//! civic sla --service svc-cadastro-produtor --elapsed-hours 200 --paused-hours 48
//! ```

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "civic")]
#[command(version)]
#[command(about = "Service catalog and protocol SLA tooling", long_about = None)]
struct Cli {
    /// Engine configuration file
    #[arg(long, env = "CIVIC_CONFIG", default_value = "config/engine.yaml")]
    config: String,

    /// Service catalog
    #[arg(long, env = "CIVIC_SERVICES", default_value = "catalog/services.yaml")]
    services: String,

    /// Workflow catalog
    #[arg(long, env = "CIVIC_WORKFLOWS", default_value = "catalog/workflows.yaml")]
    workflows: String,

    /// Validation message overrides
    #[arg(long, env = "CIVIC_MESSAGES")]
    messages: Option<String>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a JSON payload against a service form
    Validate {
        /// Service id or name
        #[arg(long)]
        service: String,
        /// JSON file with the submitted payload
        #[arg(long)]
        payload: String,
    },
    /// List services
    Services {
        /// Only active services of this department, by priority
        #[arg(long)]
        department: Option<String>,
    },
    /// List active workflows
    Workflows,
    /// Show the module type renames and identity field moves a load would apply
    Remediate,
    /// Simulate the SLA of a new protocol of a service
    Sla {
        /// Service id or name
        #[arg(long)]
        service: String,
        /// Hours of the elapsed time spent paused
        #[arg(long, default_value_t = 0)]
        paused_hours: i64,
        /// Hours since the protocol was opened
        #[arg(long)]
        elapsed_hours: i64,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let env = commands::Env::load(&cli.config, &cli.services, &cli.workflows, cli.messages.as_deref())?;

    match cli.command {
        Commands::Validate { service, payload } => commands::validate(&env, &service, &payload, cli.json),
        Commands::Services { department } => commands::services(&env, department.as_deref(), cli.json),
        Commands::Workflows => commands::workflows(&env, cli.json),
        Commands::Remediate => commands::remediate(&env, cli.json),
        Commands::Sla {
            service,
            paused_hours,
            elapsed_hours,
        } => commands::sla(&env, &service, paused_hours, elapsed_hours, cli.json),
    }
}
