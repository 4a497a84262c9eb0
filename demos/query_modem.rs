//! Query Modem Example
//!
//! Talks to a locally attached NM3 modem:
//! - Loads settings from a TOML file, or picks a serial port interactively
//! - Reads the local modem's address and supply voltage
//! - Pings a peer and reads its supply voltage
//! - Optionally sends a unicast message to the peer
//! - Dumps the results as JSON
//!
//! Usage:
//!   cargo run --example query_modem                          # Interactive port selection
//!   cargo run --example query_modem -- nm3.toml              # Settings from file
//!   cargo run --example query_modem -- nm3.toml 160 RELEASE  # Ping 160, then send RELEASE
//!
//! Set RUST_LOG environment variable to control logging:
//!   RUST_LOG=debug cargo run --example query_modem

use inquire::Select;
use log::{info, warn};
use nm3_modem::{ModemAddress, ModemConfig, ModemError, Nm3, Result};
use serde::Serialize;

#[derive(Serialize)]
struct Report {
    address: ModemAddress,
    supply_volts: f64,
    peer: Option<ModemAddress>,
    distance_m: Option<f64>,
    peer_volts: Option<f64>,
}

fn select_port() -> Result<String> {
    let ports = Nm3::list_ports()?;

    if ports.is_empty() {
        eprintln!("No serial ports found!");
        std::process::exit(1);
    }

    let port_names: Vec<String> = ports.iter().map(|p| p.port_name.clone()).collect();

    Select::new("Select the modem's serial port:", port_names)
        .prompt()
        .map_err(|e| ModemError::Config(format!("Selection cancelled: {}", e)))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => ModemConfig::load(path)?,
        None => ModemConfig {
            port: select_port()?,
            ..ModemConfig::default()
        },
    };
    let peer = args
        .next()
        .map(|a| {
            a.parse::<u16>()
                .map_err(|_| ModemError::InvalidArgument(format!("bad address: {}", a)))
                .and_then(ModemAddress::new)
        })
        .transpose()?;
    let message = args.next();

    info!("Opening modem on {}...", config.port);
    let mut nm3 = Nm3::open(&config)?;

    let identity = nm3.query_identity()?;
    info!(
        "Local modem {} at {:.2}V",
        identity.address,
        identity.volts()
    );

    let mut distance_m = None;
    let mut peer_volts = None;
    if let Some(peer) = peer {
        let outcome = nm3.ping(peer)?;
        distance_m = outcome.distance();
        match distance_m {
            Some(d) => info!("Peer {} is {:.1}m away", peer, d),
            None => warn!("No range to peer {}: {:?}", peer, outcome),
        }

        match nm3.query_voltage(peer) {
            Ok(reading) => peer_volts = Some(reading.volts()),
            Err(e) => warn!("Voltage query to {} failed: {}", peer, e),
        }

        if let Some(message) = message {
            match nm3.send_unicast(peer, message.as_bytes()) {
                Ok(echo) => info!("Sent: {}", echo.escape_ascii()),
                Err(e) => warn!("Unicast to {} failed: {}", peer, e),
            }
        }
    }

    let report = Report {
        address: identity.address,
        supply_volts: identity.volts(),
        peer,
        distance_m,
        peer_volts,
    };
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!("Could not serialize report: {}", e),
    }

    Ok(())
}
