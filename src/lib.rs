//! # NM3 Modem Library
//!
//! A Rust library for operating NanoModem V3 (NM3) underwater acoustic modems
//! over their serial command/response protocol.
//!
//! ## Features
//!
//! - Query the local modem's address and supply voltage
//! - Query the supply voltage of a remote modem
//! - Measure range to a peer via round-trip acoustic ping
//! - Send short unicast messages, including release/lock commands
//! - Optional AES-256 encryption of frame payloads (counter or chaining mode)
//! - Release node mission loop driving a servo actuator
//! - Surface relay node forwarding companion-app requests (feature `relay`)
//!
//! ## Example
//!
//! ```no_run
//! use nm3_modem::{ModemAddress, ModemConfig, Nm3};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ModemConfig::load("nm3.toml")?;
//!     let mut nm3 = Nm3::open(&config)?;
//!     let identity = nm3.query_identity()?;
//!     println!("Modem {} at {:.2}V", identity.address, identity.volts());
//!     if let Some(distance) = nm3.ping(ModemAddress::new(160)?)?.distance() {
//!         println!("Distance: {:.1}m", distance);
//!     }
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod codec;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod events;
pub mod frame;
pub mod mission;
pub mod protocol;
pub mod sim;
pub mod transport;
pub mod types;

#[cfg(feature = "relay")]
pub mod relay;

pub use clock::{Clock, SystemClock};
pub use config::{CipherMode, EncryptionConfig, MissionConfig, ModemConfig};
pub use error::{ModemError, Result};
pub use events::{EventSink, LogSink, MemorySink, ModemEvent};
pub use mission::{Actuator, MissionCoordinator, MissionEvent, RelayRequest};
pub use protocol::{EngineSettings, ExchangeState, Nm3};
pub use transport::{SerialTransport, Transport};
pub use types::*;
