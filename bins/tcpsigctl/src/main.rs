//! tcpsigctl - TCP-MD5 security association management.
//!
//! Talks the key-management protocol to a `tcpsigctl serve` instance (or
//! any other server of the protocol) over its Unix socket.

mod output;
mod sa;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

/// Default admin socket path.
pub const DEFAULT_SOCKET: &str = "/run/tcpsig.sock";

#[derive(Parser)]
#[command(name = "tcpsigctl", version, about = "TCP-MD5 security association tool")]
struct Cli {
    /// Admin socket path.
    #[arg(short = 'S', long, global = true, default_value = DEFAULT_SOCKET)]
    socket: PathBuf,

    /// Output JSON.
    #[arg(short = 'j', long, global = true)]
    json: bool,

    /// Pretty print JSON.
    #[arg(short = 'p', long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add a security association.
    #[command(visible_alias = "a")]
    Add(sa::AddArgs),

    /// Check whether a security association applies to an address pair.
    #[command(visible_alias = "g")]
    Get(sa::PairArgs),

    /// Remove all security associations.
    #[command(visible_alias = "f")]
    Flush,

    /// List security associations.
    #[command(visible_alias = "ls", visible_alias = "list")]
    Dump,

    /// Run an in-process SA table and serve it on the admin socket.
    Serve(serve::ServeArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json { pretty: cli.pretty }
    } else {
        OutputFormat::Text
    };

    let result = match cli.command {
        Command::Add(args) => sa::add(&cli.socket, args).await,
        Command::Get(args) => sa::get(&cli.socket, args, format).await,
        Command::Flush => sa::flush(&cli.socket).await,
        Command::Dump => sa::dump(&cli.socket, format).await,
        Command::Serve(args) => serve::run(&cli.socket, args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
