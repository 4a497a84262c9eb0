//! Protocol constants for NM3 modem communication.
//!
//! This module defines the constants used in the NM3 ASCII protocol,
//! including command and response prefixes, timing parameters, serial port
//! configuration and the fixed conversion factors for telemetry fields.

/// Frame terminator appended to every command and response
pub const TERMINATOR: &[u8; 2] = b"\r\n";

/// Leading delimiter of commands sent to the modem
pub const COMMAND_DELIMITER: u8 = b'$';

/// Leading delimiter of reports sent by the modem
pub const RESPONSE_DELIMITER: u8 = b'#';

/// Query own address and supply voltage
pub const QUERY_CMD: &[u8; 2] = b"$?";

/// Ping a remote modem
pub const PING_CMD: &[u8; 2] = b"$P";

/// Query the supply voltage of a remote modem
pub const VOLTAGE_CMD: &[u8; 2] = b"$V";

/// Send a unicast message
pub const UNICAST_CMD: &[u8; 2] = b"$U";

/// Address report prefix (`#A007V01500`)
pub const ADDRESS_REPORT: &[u8; 2] = b"#A";

/// Remote voltage report prefix (`#B160V01500`)
pub const VOLTAGE_REPORT: &[u8; 2] = b"#B";

/// Range report prefix (`#R160T00048000`)
pub const RANGE_REPORT: &[u8; 2] = b"#R";

/// Modem-side timeout report
pub const TIMEOUT_REPORT: &[u8; 3] = b"#TO";

/// Incoming unicast message prefix (`#U07RELEASE`)
pub const MESSAGE_REPORT: &[u8; 2] = b"#U";

/// Separator between address and voltage digits
pub const VOLTAGE_SEPARATOR: u8 = b'V';

/// Separator before travel-time digits
pub const TRAVEL_TIME_SEPARATOR: u8 = b'T';

/// Highest addressable modem
pub const MAX_ADDRESS: u16 = 999;

/// Largest unicast payload the length field can express
pub const MAX_UNICAST_LEN: usize = 99;

/// Upper bound on an accumulated frame before it is discarded
pub const MAX_FRAME_LEN: usize = 256;

/// Frames held for polling while a command exchange runs
pub const MAX_BACKLOG_FRAMES: usize = 8;

/// Cipher block size for chaining mode
pub const BLOCK_SIZE: usize = 16;

/// Release token carried in a unicast payload
pub const RELEASE_TOKEN: &[u8] = b"RELEASE";

/// Lock token carried in a unicast payload
pub const LOCK_TOKEN: &[u8] = b"LOCK";

/// Baud rate (9600 bps, 8N1)
pub const BAUD_RATE: u32 = 9600;

/// Default response timeout in milliseconds
pub const TIMEOUT_MS: u64 = 2000;

/// Longest timeout accepted for any wait
pub const MAX_TIMEOUT_MS: u64 = 10_000;

/// Interval between transport polls while waiting for a frame
pub const POLL_INTERVAL_MS: u64 = 10;

/// Stop bits configuration
pub const STOP_BITS: serialport::StopBits = serialport::StopBits::One;

/// Full-scale supply voltage represented by the 16-bit raw field
pub const VOLTAGE_FULL_SCALE: f64 = 15.0;

/// Seconds per travel-time counter tick (round trip, halved)
pub const TRAVEL_TIME_FACTOR: f64 = 0.000_031_25;

/// Speed of sound in sea water, m/s
pub const SOUND_SPEED_WATER: f64 = 1500.0;

/// Speed of sound in air, m/s, for bench testing
pub const SOUND_SPEED_AIR: f64 = 340.0;

/// Servo position that opens the release
pub const DEFAULT_RELEASE_ANGLE: f32 = 180.0;

/// Servo position that holds the release closed
pub const DEFAULT_LOCK_ANGLE: f32 = 90.0;

/// Maximum servo travel in degrees
pub const MAX_ANGLE: f32 = 180.0;

/// Interval between "not connected" status reports
pub const STATUS_INTERVAL_MS: u64 = 1000;

/// Indicator half-period while the companion link is up
pub const BLINK_CONNECTED_MS: u64 = 1000;

/// Indicator half-period while waiting for the companion link
pub const BLINK_DISCONNECTED_MS: u64 = 250;

/// Pause after each relayed message
pub const RELAY_PAUSE_MS: u64 = 1000;
