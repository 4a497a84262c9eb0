use crate::constants::*;
use crate::error::{ModemError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of a modem on the acoustic network, 0..=999
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct ModemAddress(u16);

impl ModemAddress {
    /// Create an address, rejecting values that do not fit three digits
    pub fn new(value: u16) -> Result<Self> {
        if value > MAX_ADDRESS {
            return Err(ModemError::InvalidArgument(format!(
                "modem address {} out of range 0..={}",
                value, MAX_ADDRESS
            )));
        }
        Ok(ModemAddress(value))
    }

    pub fn value(self) -> u16 {
        self.0
    }

    /// Zero-padded three digit wire field
    pub fn to_digits(self) -> [u8; 3] {
        let v = self.0;
        [
            b'0' + (v / 100) as u8,
            b'0' + (v / 10 % 10) as u8,
            b'0' + (v % 10) as u8,
        ]
    }
}

impl TryFrom<u16> for ModemAddress {
    type Error = ModemError;

    fn try_from(value: u16) -> Result<Self> {
        ModemAddress::new(value)
    }
}

impl From<ModemAddress> for u16 {
    fn from(address: ModemAddress) -> Self {
        address.0
    }
}

impl fmt::Display for ModemAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

/// Commands understood by the modem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Own address and supply voltage
    Query,
    /// Acoustic round-trip range measurement
    Ping { target: ModemAddress },
    /// Supply voltage of a remote modem
    VoltageQuery { target: ModemAddress },
    /// Short message to a single modem
    Unicast { target: ModemAddress, payload: Vec<u8> },
    /// Unicast carrying the release token
    Release { target: ModemAddress },
    /// Unicast carrying the lock token
    Lock { target: ModemAddress },
}

impl Command {
    /// Two-byte prefix the modem echoes back when it accepts the command
    pub fn prefix(&self) -> &'static [u8; 2] {
        match self {
            Command::Query => QUERY_CMD,
            Command::Ping { .. } => PING_CMD,
            Command::VoltageQuery { .. } => VOLTAGE_CMD,
            Command::Unicast { .. } | Command::Release { .. } | Command::Lock { .. } => UNICAST_CMD,
        }
    }

    pub fn target(&self) -> Option<ModemAddress> {
        match self {
            Command::Query => None,
            Command::Ping { target }
            | Command::VoltageQuery { target }
            | Command::Unicast { target, .. }
            | Command::Release { target }
            | Command::Lock { target } => Some(*target),
        }
    }
}

/// A decoded frame received from the modem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    AddressReport { address: ModemAddress, voltage_raw: u16 },
    VoltageReport { address: ModemAddress, voltage_raw: u16 },
    RangeReport { travel_time_raw: u32 },
    /// Either the modem reported `#TO` or nothing arrived in time
    Timeout,
    /// Echo of a unicast command
    UnicastAck { raw: Vec<u8> },
    /// Message delivered by a remote modem
    UnicastMessage { payload: Vec<u8> },
    Malformed { raw: Vec<u8> },
}

/// Address and supply voltage as reported by a modem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoltageReading {
    pub address: ModemAddress,
    pub voltage_raw: u16,
}

impl VoltageReading {
    /// Supply voltage in volts, recomputed from the raw field
    pub fn volts(&self) -> f64 {
        voltage_from_raw(self.voltage_raw)
    }
}

/// Outcome of a ping exchange
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PingOutcome {
    /// Peer answered; distance in metres
    Range { travel_time_raw: u32, distance_m: f64 },
    /// Modem reported `#TO`: the peer did not answer
    NoRange,
    /// Modem did not echo the ping; nothing was measured
    NoAcknowledgment,
}

impl PingOutcome {
    pub fn distance(&self) -> Option<f64> {
        match self {
            PingOutcome::Range { distance_m, .. } => Some(*distance_m),
            _ => None,
        }
    }
}

/// Medium the acoustic signal travels through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropagationMedium {
    #[default]
    Water,
    Air,
}

impl PropagationMedium {
    /// Nominal speed of sound in m/s
    pub fn sound_speed(self) -> f64 {
        match self {
            PropagationMedium::Water => SOUND_SPEED_WATER,
            PropagationMedium::Air => SOUND_SPEED_AIR,
        }
    }
}

/// Convert the raw 16-bit voltage field to volts
pub fn voltage_from_raw(raw: u16) -> f64 {
    raw as f64 * VOLTAGE_FULL_SCALE / 65536.0
}

/// Convert a raw travel-time counter to metres
pub fn distance_from_travel_time(travel_time_raw: u32, sound_speed_mps: f64) -> f64 {
    travel_time_raw as f64 * sound_speed_mps * TRAVEL_TIME_FACTOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_rejects_out_of_range() {
        assert!(ModemAddress::new(999).is_ok());
        assert!(matches!(
            ModemAddress::new(1000),
            Err(ModemError::InvalidArgument(_))
        ));
    }

    #[test]
    fn address_renders_three_digits() {
        let addr = ModemAddress::new(7).unwrap();
        assert_eq!(&addr.to_digits(), b"007");
        assert_eq!(addr.to_string(), "007");
        assert_eq!(&ModemAddress::new(160).unwrap().to_digits(), b"160");
    }

    #[test]
    fn voltage_conversion() {
        assert!((voltage_from_raw(1500) - 0.343_322_753_906_25).abs() < 1e-12);
        assert_eq!(voltage_from_raw(0), 0.0);
        assert!(voltage_from_raw(u16::MAX) < VOLTAGE_FULL_SCALE);
    }

    #[test]
    fn distance_is_linear_in_travel_time() {
        for t in [1u32, 17, 48_000, 1_000_000] {
            let d1 = distance_from_travel_time(t, SOUND_SPEED_WATER);
            let d2 = distance_from_travel_time(2 * t, SOUND_SPEED_WATER);
            assert!((d2 - 2.0 * d1).abs() < 1e-9);
        }
        assert!((distance_from_travel_time(48_000, SOUND_SPEED_AIR) - 510.0).abs() < 1e-9);
    }

    #[test]
    fn address_deserializes_with_range_check() {
        let ok: ModemAddress = serde_json::from_str("160").unwrap();
        assert_eq!(ok.value(), 160);
        assert!(serde_json::from_str::<ModemAddress>("1200").is_err());
    }
}
