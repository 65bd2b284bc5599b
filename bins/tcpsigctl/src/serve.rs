//! In-process SA table served on the admin socket.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use tcpsig::admin::AdminServer;
use tcpsig::{Config, NetStack};
use tracing::info;

#[derive(Args)]
pub struct ServeArgs {
    /// JSON configuration file for the SA table.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Include key bytes in dump replies.
    #[arg(long)]
    pub dump_keys: bool,
}

fn load_config(args: &ServeArgs) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("invalid configuration in {}", path.display()))?
        }
        None => Config::default(),
    };
    if args.dump_keys {
        config.dump_keys = true;
    }
    Ok(config)
}

pub async fn run(socket: &Path, args: ServeArgs) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    let stack = NetStack::with_config(config);
    info!(stack = stack.id(), "starting SA table");

    let server = AdminServer::bind(socket, stack.admin())
        .with_context(|| format!("cannot bind {}", socket.display()))?;
    server.run_until(tokio::signal::ctrl_c()).await?;
    Ok(())
}
