use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config::Config;
use crate::sandbox::{self, WhichProbe};

#[derive(Args)]
pub struct SandboxArgs {
    #[command(subcommand)]
    pub command: SandboxCommands,
}

#[derive(Subcommand)]
pub enum SandboxCommands {
    /// Show sandbox availability and configuration
    Status,
}

pub async fn run(args: SandboxArgs, config: Config) -> Result<()> {
    match args.command {
        SandboxCommands::Status => run_status(&config),
    }
}

fn run_status(config: &Config) -> Result<()> {
    // Uncached: this is a one-shot question.
    let probe = WhichProbe::new(config.sandbox.executable.clone());
    let status = sandbox::status(&config.sandbox, &probe);

    println!("Sandbox Status:");
    for line in status.status_lines() {
        println!("{}", line);
    }
    println!();

    println!("Configuration:");
    println!("  Enabled:     {}", config.sandbox.enabled);
    println!("  Executable:  {}", config.sandbox.executable);
    println!("  Policy:      {}", config.sandbox.config_path.display());
    if !config.sandbox.extra_args.is_empty() {
        println!("  Extra args:  {:?}", config.sandbox.extra_args);
    }
    println!("  Probe cache: {}s", config.sandbox.probe_cache_secs);
    println!("  Python:      {}", config.executor.python_path.display());
    println!("  Workspace:   {}", config.executor.workspace_dir.display());
    println!("  Timeout:     {}s", config.executor.timeout_secs);
    println!("  Max output:  {} bytes", config.executor.max_output_bytes);

    Ok(())
}
