//! Modem and mission configuration loaded from TOML.
//!
//! ```toml
//! port = "/dev/ttyACM0"
//! medium = "air"
//! query_timeout_ms = 10000
//!
//! [encryption]
//! mode = "chaining"
//! passphrase = "ropeless"
//! iv = "000102030405060708090a0b0c0d0e0f"
//!
//! [mission]
//! release_angle_deg = 180.0
//! lock_angle_deg = 90.0
//! ```

use crate::constants::*;
use crate::error::{ModemError, Result};
use crate::types::PropagationMedium;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    /// Serial port the modem is attached to
    pub port: String,
    pub baud_rate: u32,
    /// Wait for acknowledgments, unicast echoes and polled reports
    pub response_timeout_ms: u64,
    /// Wait for address and voltage reports
    pub query_timeout_ms: u64,
    /// Wait for the range report after a ping is acknowledged
    pub range_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub medium: PropagationMedium,
    /// Overrides the nominal speed of sound for `medium`
    pub sound_speed_mps: Option<f64>,
    pub encryption: Option<EncryptionConfig>,
    pub mission: MissionConfig,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: BAUD_RATE,
            response_timeout_ms: TIMEOUT_MS,
            query_timeout_ms: TIMEOUT_MS,
            range_timeout_ms: TIMEOUT_MS,
            poll_interval_ms: POLL_INTERVAL_MS,
            medium: PropagationMedium::default(),
            sound_speed_mps: None,
            encryption: None,
            mission: MissionConfig::default(),
        }
    }
}

impl ModemConfig {
    /// Load and validate config from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate config from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ModemConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("response_timeout_ms", self.response_timeout_ms),
            ("query_timeout_ms", self.query_timeout_ms),
            ("range_timeout_ms", self.range_timeout_ms),
        ] {
            if value == 0 || value > MAX_TIMEOUT_MS {
                return Err(ModemError::Config(format!(
                    "{} must be within 1..={}, got {}",
                    name, MAX_TIMEOUT_MS, value
                )));
            }
        }
        if self.poll_interval_ms == 0 {
            return Err(ModemError::Config("poll_interval_ms must be positive".to_string()));
        }
        if let Some(speed) = self.sound_speed_mps {
            if !(speed.is_finite() && speed > 0.0) {
                return Err(ModemError::Config(format!(
                    "sound_speed_mps must be positive, got {}",
                    speed
                )));
            }
        }
        if let Some(encryption) = &self.encryption {
            let iv = encryption.iv_bytes()?;
            if encryption.mode == CipherMode::Chaining && iv.is_none() {
                return Err(ModemError::Config(
                    "chaining mode requires a fixed iv".to_string(),
                ));
            }
        }
        self.mission.validate()
    }

    /// Speed of sound used for range conversion
    pub fn sound_speed(&self) -> f64 {
        self.sound_speed_mps
            .unwrap_or_else(|| self.medium.sound_speed())
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn range_timeout(&self) -> Duration {
        Duration::from_millis(self.range_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Block cipher mode for frame payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherMode {
    /// AES-256-CTR
    Counter,
    /// AES-256-CBC
    Chaining,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionConfig {
    pub mode: CipherMode,
    pub passphrase: String,
    /// 16-byte IV (chaining) or initial counter block (counter), hex encoded.
    /// Counter mode draws a random one per session when absent and reports
    /// it as a session nonce event.
    #[serde(default)]
    pub iv: Option<String>,
}

impl EncryptionConfig {
    /// Decode the configured IV
    pub fn iv_bytes(&self) -> Result<Option<[u8; BLOCK_SIZE]>> {
        let Some(iv) = &self.iv else {
            return Ok(None);
        };
        let bytes = hex::decode(iv.trim())
            .map_err(|e| ModemError::Config(format!("invalid iv: {}", e)))?;
        let block: [u8; BLOCK_SIZE] = bytes.try_into().map_err(|b: Vec<u8>| {
            ModemError::Config(format!("iv must be {} bytes, got {}", BLOCK_SIZE, b.len()))
        })?;
        Ok(Some(block))
    }
}

/// Actuator positions for the release node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    pub release_angle_deg: f32,
    pub lock_angle_deg: f32,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            release_angle_deg: DEFAULT_RELEASE_ANGLE,
            lock_angle_deg: DEFAULT_LOCK_ANGLE,
        }
    }
}

impl MissionConfig {
    fn validate(&self) -> Result<()> {
        for (name, angle) in [
            ("release_angle_deg", self.release_angle_deg),
            ("lock_angle_deg", self.lock_angle_deg),
        ] {
            if !(0.0..=MAX_ANGLE).contains(&angle) {
                return Err(ModemError::Config(format!(
                    "{} must be within 0..={}, got {}",
                    name, MAX_ANGLE, angle
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = ModemConfig::from_toml_str("").unwrap();
        assert_eq!(config, ModemConfig::default());
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.response_timeout(), Duration::from_secs(2));
        assert_eq!(config.sound_speed(), SOUND_SPEED_WATER);
    }

    #[test]
    fn parses_full_document() {
        let config = ModemConfig::from_toml_str(
            r#"
            port = "/dev/ttyACM0"
            medium = "air"
            query_timeout_ms = 10000

            [encryption]
            mode = "chaining"
            passphrase = "ropeless"
            iv = "000102030405060708090a0b0c0d0e0f"

            [mission]
            release_angle_deg = 0.0
            "#,
        )
        .unwrap();

        assert_eq!(config.port, "/dev/ttyACM0");
        assert_eq!(config.sound_speed(), SOUND_SPEED_AIR);
        assert_eq!(config.query_timeout(), Duration::from_secs(10));
        assert_eq!(config.mission.release_angle_deg, 0.0);
        assert_eq!(config.mission.lock_angle_deg, DEFAULT_LOCK_ANGLE);

        let encryption = config.encryption.unwrap();
        assert_eq!(encryption.mode, CipherMode::Chaining);
        let iv = encryption.iv_bytes().unwrap().unwrap();
        assert_eq!(iv[15], 0x0f);
    }

    #[test]
    fn speed_override_wins_over_medium() {
        let config = ModemConfig::from_toml_str("medium = \"air\"\nsound_speed_mps = 1480.0").unwrap();
        assert_eq!(config.sound_speed(), 1480.0);
    }

    #[test]
    fn rejects_timeouts_above_ten_seconds() {
        let err = ModemConfig::from_toml_str("query_timeout_ms = 10001").unwrap_err();
        assert!(matches!(err, ModemError::Config(_)));
        assert!(ModemConfig::from_toml_str("response_timeout_ms = 0").is_err());
    }

    #[test]
    fn rejects_bad_iv_and_missing_chaining_iv() {
        let short = "[encryption]\nmode = \"counter\"\npassphrase = \"x\"\niv = \"0011\"";
        assert!(ModemConfig::from_toml_str(short).is_err());

        let missing = "[encryption]\nmode = \"chaining\"\npassphrase = \"x\"";
        assert!(ModemConfig::from_toml_str(missing).is_err());

        let counter = "[encryption]\nmode = \"counter\"\npassphrase = \"x\"";
        assert!(ModemConfig::from_toml_str(counter).is_ok());
    }

    #[test]
    fn rejects_out_of_range_angles() {
        assert!(ModemConfig::from_toml_str("[mission]\nlock_angle_deg = 200.0").is_err());
    }
}
