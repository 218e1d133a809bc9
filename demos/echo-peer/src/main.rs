//! Query-answering peer.
//!
//! Stands in for the remote application on the other end of the bridge:
//! answers `{"type":"query"}` with the list of known objects, and
//! `{"type":"query","object":"..."}` with details on one of them.
//!
//! Run:
//!   cargo run -p rtcbridge-demo-echo-peer -- --port 8080 --objects Maize,Soy,Wheat
//!   cargo run -p rtcbridge-cli -- --port 8080 query
//!   cargo run -p rtcbridge-cli -- --port 8080 query --json '{"type":"query","object":"Soy"}'

mod protocol;
mod server;

use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "echo-peer", about = "Answer rtcbridge queries over a WebSocket")]
struct Args {
    /// Port to listen on (localhost only).
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Comma-separated objects to report.
    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = ["Maize".to_string(), "Soy".to_string()]
    )]
    objects: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("echo_peer=info".parse()?);
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let addr: SocketAddr = ([127, 0, 0, 1], args.port).into();
    tracing::info!("Serving {} objects on {}", args.objects.len(), addr);

    server::run(addr, args.objects).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objects_split_on_commas() {
        let args = Args::parse_from(["echo-peer", "--objects", "Maize,Soy,Wheat"]);
        assert_eq!(args.objects, ["Maize", "Soy", "Wheat"]);
        assert_eq!(args.port, 8080);
    }

    #[test]
    fn defaults() {
        let args = Args::parse_from(["echo-peer"]);
        assert_eq!(args.objects, ["Maize", "Soy"]);
    }
}
