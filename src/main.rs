use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pyexec::cli::{self, Cli, Commands};
use pyexec::config::{Config, LogFormat};

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let explicit = cli.config.as_deref();

    // `config` subcommands manage the file itself and load it on their own.
    let command = match cli.command {
        Commands::Config(args) => {
            init_logging(cli.verbose, "warn", LogFormat::Text);
            return cli::config::run(args, explicit).await;
        }
        other => other,
    };

    let config = Config::load(explicit)?;
    init_logging(cli.verbose, &config.logging.level, config.logging.format);

    match command {
        Commands::Serve(args) => cli::serve::run(args, config).await,
        Commands::Run(args) => cli::run::run(args, config).await,
        Commands::Sandbox(args) => cli::sandbox::run(args, config).await,
        Commands::Config(_) => unreachable!("handled above"),
    }
}

/// Logs go to stderr so `run` can print its JSON result on stdout.
fn init_logging(verbose: bool, level: &str, format: LogFormat) {
    let level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}
