//! coegw CLI entry point.
//!
//! Small operational tooling around the library: inspect the unit table,
//! decode captured datagrams, and watch live CoE traffic.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use coegw::core::data::{clamp_node, ProtocolVersion};
use coegw::core::error::{CoeError, Result};
use coegw::transport::CoeEndpoint;
use coegw::units::{self, Language};

/// CoE Gateway - CAN-over-Ethernet protocol tooling
#[derive(Parser, Debug)]
#[command(name = "coegw", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the known measurement units
    ListUnits {
        /// Language for names ("de" or "en")
        #[arg(long, default_value = "en")]
        lang: String,
    },

    /// Decode a hex-encoded datagram
    Decode {
        /// Protocol version (1 or 2)
        #[arg(long, short)]
        version: u8,

        /// Datagram bytes as hex, spaces and colons allowed
        hex: String,
    },

    /// Listen for CoE traffic and print merged updates as JSON lines
    Monitor {
        /// Protocol version (1 or 2)
        #[arg(long, short)]
        version: u8,

        /// Bind address; defaults to 0.0.0.0 on the version's port
        #[arg(long)]
        bind: Option<std::net::SocketAddr>,

        /// Only show this CAN node (0 = all nodes)
        #[arg(long, default_value_t = 0)]
        node: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ListUnits { lang } => {
            list_units(&lang);
            Ok(())
        }
        Commands::Decode { version, hex } => decode(parse_version(version)?, &hex),
        Commands::Monitor {
            version,
            bind,
            node,
        } => monitor(parse_version(version)?, bind, node).await,
    }
}

fn parse_version(version: u8) -> Result<ProtocolVersion> {
    match version {
        1 => Ok(ProtocolVersion::V1),
        2 => Ok(ProtocolVersion::V2),
        other => Err(CoeError::InvalidInput(format!(
            "unsupported protocol version {other} (expected 1 or 2)"
        ))),
    }
}

fn list_units(lang: &str) {
    let lang = Language::from_tag(lang);
    let units = units::list_units(lang);
    match serde_json::to_string_pretty(&units) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("serialization failed: {err}"),
    }
}

fn decode(version: ProtocolVersion, hex: &str) -> Result<()> {
    let bytes = parse_hex(hex)?;
    let updates = coegw::codec::decode(version, &bytes)?;
    for update in updates {
        match serde_json::to_string_pretty(&update) {
            Ok(json) => println!("{json}"),
            Err(err) => eprintln!("serialization failed: {err}"),
        }
    }
    Ok(())
}

async fn monitor(
    version: ProtocolVersion,
    bind: Option<std::net::SocketAddr>,
    node: i64,
) -> Result<()> {
    let node = clamp_node(node, true);
    let mut endpoint = match bind {
        Some(addr) => CoeEndpoint::bind(version, addr).await?,
        None => CoeEndpoint::bind_default(version).await?,
    };
    endpoint.start();

    let mut updates = endpoint.subscribe();
    loop {
        match updates.recv().await {
            Ok(update) => {
                // Node 0 is the "any node" wildcard.
                if node != 0 && update.node != node {
                    continue;
                }
                if let Ok(json) = serde_json::to_string(&update) {
                    println!("{json}");
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                eprintln!("lagging, {skipped} updates dropped");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}

fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    if cleaned.len() % 2 != 0 {
        return Err(CoeError::InvalidInput("odd number of hex digits".into()));
    }
    (0..cleaned.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&cleaned[i..i + 2], 16)
                .map_err(|_| CoeError::InvalidInput(format!("invalid hex at offset {i}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_accepts_separators() {
        assert_eq!(parse_hex("02 00:04 00").unwrap(), vec![0x02, 0x00, 0x04, 0x00]);
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version(1).unwrap(), ProtocolVersion::V1);
        assert_eq!(parse_version(2).unwrap(), ProtocolVersion::V2);
        assert!(parse_version(3).is_err());
    }
}
