//! Site Provision Agent
//!
//! Usage:
//! - HTTP front end: `site-provision-agent serve --port 9877`
//! - One-off provisioning: `site-provision-agent provision --domain example.com --username example_user`
//! - List recorded sites: `site-provision-agent sites`

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use site_provision_agent::{
    bootstrap, init_tracing, run_server, EnvConfig, OperatorIdentity, ProvisioningOutcome,
    Provisioner, RuntimeConfig,
};

#[derive(Parser, Debug)]
#[command(version, about = "Hosting site provisioning agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Override the listening port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Provision one site and print the activation command
    Provision {
        #[arg(long)]
        domain: String,
        #[arg(long)]
        username: String,
        /// Operator recorded in logs and in the outcome
        #[arg(long, env = "USER", default_value = "cli")]
        operator: String,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recorded sites
    Sites,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let config = EnvConfig::from_env();
    match run(cli.command, config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: EnvConfig) -> anyhow::Result<ExitCode> {
    match command {
        Command::Serve { port } => {
            run_server(config, RuntimeConfig { port_override: port }).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Provision {
            domain,
            username,
            operator,
            json,
        } => {
            let registry = bootstrap(&config).await?;
            let provisioner = Provisioner::new(config.paths.clone(), registry)
                .with_uniqueness_precheck(config.precheck_uniqueness);

            let outcome = provisioner
                .provision(&domain, &username, &OperatorIdentity::new(operator))
                .await;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_outcome(&outcome);
            }

            Ok(if outcome.is_done() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Sites => {
            let registry = bootstrap(&config).await?;
            for site in registry.list_sites().await? {
                println!(
                    "{}\t{}\t{}",
                    site.domain,
                    site.username,
                    site.created_at.to_rfc3339()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_outcome(outcome: &ProvisioningOutcome) {
    match outcome {
        ProvisioningOutcome::Done(success) => {
            println!("Site for {} has been prepared.", success.domain);
            println!("To complete the setup, a privileged user must run:");
            println!();
            println!("    {}", success.activation_command);
        }
        ProvisioningOutcome::Failed(failure) => {
            eprintln!("Provisioning failed at stage '{}': {}", failure.stage, failure.message);
        }
    }
}
