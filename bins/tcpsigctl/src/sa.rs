//! SA table commands: add, get, flush, dump.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use anyhow::{Context, bail};
use clap::Args;
use serde::Serialize;
use tcpsig::admin::AdminClient;
use zeroize::Zeroizing;

use crate::output::{OutputFormat, print_entries, write_json};

#[derive(Args)]
pub struct PairArgs {
    /// Source address, `ip` or `ip:port` (port 0 matches any).
    #[arg(value_parser = parse_endpoint)]
    pub src: SocketAddr,

    /// Destination address, `ip` or `ip:port` (port 0 matches any).
    #[arg(value_parser = parse_endpoint)]
    pub dst: SocketAddr,
}

#[derive(Args)]
pub struct AddArgs {
    #[command(flatten)]
    pub pair: PairArgs,

    /// Shared key as a literal string.
    #[arg(short, long, conflicts_with = "key_hex", required_unless_present = "key_hex")]
    pub key: Option<String>,

    /// Shared key as hex digits.
    #[arg(long = "key-hex")]
    pub key_hex: Option<String>,
}

impl AddArgs {
    fn key_bytes(&self) -> anyhow::Result<Zeroizing<Vec<u8>>> {
        let bytes = match (&self.key, &self.key_hex) {
            (Some(key), _) => key.as_bytes().to_vec(),
            (None, Some(digits)) => hex::decode(digits.trim()).context("invalid --key-hex")?,
            (None, None) => bail!("a key is required"),
        };
        Ok(Zeroizing::new(bytes))
    }
}

/// Accept `ip`, `ip:port`, or `[ipv6]:port`.
pub fn parse_endpoint(s: &str) -> Result<SocketAddr, String> {
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Ok(addr);
    }
    s.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, 0))
        .map_err(|_| format!("invalid address '{}'", s))
}

async fn connect(socket: &Path) -> anyhow::Result<AdminClient> {
    AdminClient::connect(socket)
        .await
        .with_context(|| format!("cannot connect to {}", socket.display()))
}

pub async fn add(socket: &Path, args: AddArgs) -> anyhow::Result<()> {
    let key = args.key_bytes()?;
    let client = connect(socket).await?;
    client.add(args.pair.src, args.pair.dst, &key).await?;
    Ok(())
}

#[derive(Serialize)]
struct GetView {
    src: String,
    dst: String,
    present: bool,
}

pub async fn get(socket: &Path, args: PairArgs, format: OutputFormat) -> anyhow::Result<()> {
    let client = connect(socket).await?;
    client.get(args.src, args.dst).await?;

    match format {
        OutputFormat::Text => println!("src {} dst {} present", args.src, args.dst),
        OutputFormat::Json { pretty } => {
            let view = GetView {
                src: args.src.to_string(),
                dst: args.dst.to_string(),
                present: true,
            };
            write_json(&mut io::stdout().lock(), &view, pretty)?;
        }
    }
    Ok(())
}

pub async fn flush(socket: &Path) -> anyhow::Result<()> {
    connect(socket).await?.flush().await?;
    Ok(())
}

pub async fn dump(socket: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let entries = connect(socket).await?.dump().await?;
    print_entries(&mut io::stdout().lock(), &entries, format)
}
