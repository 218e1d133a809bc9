//! `rtcbridge`: connect to a peer and exchange JSON control messages.
//!
//!   rtcbridge --port 8080 query --json '{"type":"query"}'
//!   rtcbridge --config bridge.toml listen --count 10

use anyhow::Context;
use clap::{Parser, Subcommand};
use rtcbridge_client::WsTransport;
use rtcbridge_core::{QueryClient, Transport, TransportConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// How often `listen` checks whether the transport is still up.
const LISTEN_CHECK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "rtcbridge", version, about = "Query a peer over a media transport")]
struct Cli {
    /// Config file (TOML, or JSON with a .json extension).
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Signalling host; overrides the config file.
    #[arg(long, env = "RTCBRIDGE_HOST")]
    host: Option<String>,

    /// Signalling port; overrides the config file.
    #[arg(long, env = "RTCBRIDGE_PORT")]
    port: Option<u16>,

    /// Wrap outgoing JSON in data-channel frames.
    #[arg(long)]
    framed: bool,

    /// Seconds to wait for the connection; waits forever when omitted.
    #[arg(long)]
    connect_timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send one query and print the answer.
    Query {
        /// JSON document to send.
        #[arg(long, default_value = r#"{"type":"query"}"#)]
        json: String,

        /// Seconds to wait for the answer; waits forever when omitted.
        #[arg(long)]
        reply_timeout: Option<u64>,
    },
    /// Print inbound messages as they arrive.
    Listen {
        /// Stop after this many messages.
        #[arg(long)]
        count: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rtcbridge=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    tracing::info!("Using signalling server {}", config.signalling_url());

    let transport = Arc::new(WsTransport::new());
    let mut client = QueryClient::new(transport);
    client.configure(config)?;

    match cli.connect_timeout {
        Some(secs) => client
            .start_for(POLL_INTERVAL, Duration::from_secs(secs))
            .context("waiting for connection")?,
        None => client.start(POLL_INTERVAL)?,
    }

    match cli.command {
        Command::Query {
            json,
            reply_timeout,
        } => {
            let query: serde_json::Value =
                serde_json::from_str(&json).context("--json is not valid JSON")?;
            let answer = match reply_timeout {
                Some(secs) => client.query_timeout(&query, Duration::from_secs(secs))?,
                None => client.query(&query)?,
            };
            println!("{answer}");
        }
        Command::Listen { count } => {
            let mut received = 0usize;
            while count.is_none_or(|count| received < count) {
                match client.queue().pop_timeout(LISTEN_CHECK_INTERVAL) {
                    Some(message) => {
                        println!("{message}");
                        received += 1;
                    }
                    None => {
                        let state = client.transport().state();
                        if state.is_terminal() {
                            anyhow::bail!("transport went {state} after {received} messages");
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

fn resolve_config(cli: &Cli) -> anyhow::Result<TransportConfig> {
    let mut config = match &cli.config {
        Some(path) => TransportConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => TransportConfig::default(),
    };
    if let Some(host) = &cli.host {
        config.signalling_host = host.clone();
    }
    if let Some(port) = cli.port {
        config.signalling_port = port;
    }
    if cli.framed {
        config.framed = true;
    }
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "rtcbridge", "--host", "10.0.0.5", "--port", "8888", "--framed", "query",
        ]);
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.signalling_url(), "ws://10.0.0.5:8888");
        assert!(config.framed);
    }

    #[test]
    fn query_has_default_document() {
        let cli = Cli::parse_from(["rtcbridge", "query"]);
        match cli.command {
            Command::Query { json, reply_timeout } => {
                assert_eq!(json, r#"{"type":"query"}"#);
                assert_eq!(reply_timeout, None);
            }
            Command::Listen { .. } => panic!("expected query"),
        }
    }

    #[test]
    fn zero_port_is_rejected() {
        let cli = Cli::parse_from(["rtcbridge", "--port", "0", "listen"]);
        assert!(resolve_config(&cli).is_err());
    }
}
