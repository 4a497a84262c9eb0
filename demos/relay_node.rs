//! Relay Node Example
//!
//! Runs a surface relay node. Each line on stdin stands in for a
//! companion-app request of the form `<address> <payload>`; the node
//! forwards it to the addressed modem as a unicast message.
//!
//! Usage:
//!   cargo run --example relay_node --features relay -- nm3.toml
//!
//! Then type e.g. `160 RELEASE` and press enter. Close stdin to stop.

use log::{debug, info, warn};
use nm3_modem::relay::{run_relay_node, spawn_modem_worker, Indicator};
use nm3_modem::{ModemAddress, ModemConfig, Nm3, RelayRequest};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};

struct LogIndicator;

impl Indicator for LogIndicator {
    fn set(&mut self, on: bool) {
        debug!("LED {}", if on { "on" } else { "off" });
    }
}

fn parse_request(line: &str) -> Option<RelayRequest> {
    let (address, payload) = line.trim().split_once(' ')?;
    let target = ModemAddress::new(address.parse().ok()?).ok()?;
    Some(RelayRequest {
        target,
        payload: payload.as_bytes().to_vec(),
    })
}

#[tokio::main]
async fn main() -> nm3_modem::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => ModemConfig::load(path)?,
        None => ModemConfig::default(),
    };
    info!("Opening modem on {}...", config.port);
    let (modem, worker) = spawn_modem_worker(Nm3::open(&config)?);

    let (request_tx, request_rx) = mpsc::channel(8);
    let (link_tx, link_rx) = watch::channel(false);

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            link_tx.send_replace(true);
            match parse_request(&line) {
                Some(request) => {
                    if request_tx.send(request).await.is_err() {
                        break;
                    }
                }
                None => warn!("Expected `<address> <payload>`, got {:?}", line),
            }
        }
    });

    let summary = run_relay_node(modem, request_rx, link_rx, LogIndicator).await;
    info!(
        "Relay stopped: {} forwarded, {} failed",
        summary.forwarded, summary.failed
    );

    if worker.join().is_err() {
        warn!("Modem worker panicked");
    }
    Ok(())
}
