use anyhow::Result;
use clap::Args;

use crate::config::Config;
use crate::diagnostics;
use crate::sandbox;
use crate::server::Server;

#[derive(Args)]
pub struct ServeArgs {
    /// Address to bind (overrides server.bind)
    #[arg(long)]
    pub bind: Option<String>,

    /// Port to listen on (overrides server.port)
    #[arg(short, long)]
    pub port: Option<u16>,
}

pub async fn run(args: ServeArgs, mut config: Config) -> Result<()> {
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let probe = sandbox::default_probe(&config.sandbox);
    diagnostics::run_startup(&config, probe.as_ref()).await?;

    let server = Server::new(&config)?;
    server.run().await
}
