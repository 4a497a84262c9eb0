//! Command encoding and response decoding for the NM3 ASCII protocol.
//!
//! ```text
//! $?                      query own address and voltage
//! $P<addr:3>              ping
//! $V<addr:3>              remote voltage query
//! $U<addr:3><len:2><msg>  unicast message
//!
//! #A<addr>V<raw>          address report
//! #B<addr>V<raw>          remote voltage report
//! #R[<addr>T]<ticks>      range report
//! #TO                     modem timeout
//! #U<len:2><msg>          message from a remote modem
//! ```
//!
//! Decoding never fails: anything unrecognised becomes [`Response::Malformed`].

use crate::constants::*;
use crate::error::{ModemError, Result};
use crate::types::{Command, ModemAddress, Response};
use std::str::FromStr;

/// Encode a command as its wire payload, without terminator
pub fn encode_command(command: &Command) -> Result<Vec<u8>> {
    match command {
        Command::Query => Ok(QUERY_CMD.to_vec()),
        Command::Ping { target } => Ok(addressed(PING_CMD, *target)),
        Command::VoltageQuery { target } => Ok(addressed(VOLTAGE_CMD, *target)),
        Command::Unicast { target, payload } => encode_unicast(*target, payload),
        Command::Release { target } => encode_unicast(*target, RELEASE_TOKEN),
        Command::Lock { target } => encode_unicast(*target, LOCK_TOKEN),
    }
}

fn addressed(prefix: &[u8; 2], target: ModemAddress) -> Vec<u8> {
    let mut out = Vec::with_capacity(5);
    out.extend_from_slice(prefix);
    out.extend_from_slice(&target.to_digits());
    out
}

fn encode_unicast(target: ModemAddress, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_UNICAST_LEN {
        return Err(ModemError::InvalidArgument(format!(
            "unicast payload of {} bytes exceeds {}",
            payload.len(),
            MAX_UNICAST_LEN
        )));
    }
    let mut out = addressed(UNICAST_CMD, target);
    out.extend_from_slice(format!("{:02}", payload.len()).as_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Decode a received frame with its terminator already stripped
pub fn decode_response(frame: &[u8]) -> Response {
    let decoded = if frame.starts_with(TIMEOUT_REPORT) {
        Some(Response::Timeout)
    } else if let Some(rest) = frame.strip_prefix(ADDRESS_REPORT.as_slice()) {
        parse_voltage_fields(rest)
            .map(|(address, voltage_raw)| Response::AddressReport { address, voltage_raw })
    } else if let Some(rest) = frame.strip_prefix(VOLTAGE_REPORT.as_slice()) {
        parse_voltage_fields(rest)
            .map(|(address, voltage_raw)| Response::VoltageReport { address, voltage_raw })
    } else if let Some(rest) = frame.strip_prefix(RANGE_REPORT.as_slice()) {
        parse_range(rest).map(|travel_time_raw| Response::RangeReport { travel_time_raw })
    } else if let Some(rest) = frame.strip_prefix(MESSAGE_REPORT.as_slice()) {
        parse_message(rest).map(|payload| Response::UnicastMessage { payload })
    } else if frame.starts_with(UNICAST_CMD) {
        Some(Response::UnicastAck { raw: frame.to_vec() })
    } else {
        None
    };

    decoded.unwrap_or_else(|| Response::Malformed { raw: frame.to_vec() })
}

/// `<addr>V<raw>`
fn parse_voltage_fields(rest: &[u8]) -> Option<(ModemAddress, u16)> {
    let split = rest.iter().position(|&b| b == VOLTAGE_SEPARATOR)?;
    let address = parse_address(&rest[..split])?;
    let voltage_raw = parse_digits::<u16>(&rest[split + 1..])?;
    Some((address, voltage_raw))
}

/// `<addr>T<ticks>` or bare `<ticks>`
fn parse_range(rest: &[u8]) -> Option<u32> {
    match rest.iter().position(|&b| b == TRAVEL_TIME_SEPARATOR) {
        Some(split) => {
            let address = &rest[..split];
            if !address.is_empty() {
                parse_address(address)?;
            }
            parse_digits(&rest[split + 1..])
        }
        None => parse_digits(rest),
    }
}

/// `<len:2><payload>`; bytes beyond `len` are modem trailer fields
fn parse_message(rest: &[u8]) -> Option<Vec<u8>> {
    let len = parse_digits::<usize>(rest.get(..2)?)?;
    rest.get(2..2 + len).map(<[u8]>::to_vec)
}

/// Parse an address field, which may be rendered with or without padding
pub(crate) fn parse_address(field: &[u8]) -> Option<ModemAddress> {
    parse_digits::<u16>(field).and_then(|v| ModemAddress::new(v).ok())
}

/// Parse a non-empty run of ASCII digits
fn parse_digits<T: FromStr>(field: &[u8]) -> Option<T> {
    if field.is_empty() || !field.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(field).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(v: u16) -> ModemAddress {
        ModemAddress::new(v).unwrap()
    }

    #[test]
    fn encodes_fixed_format_commands() {
        assert_eq!(encode_command(&Command::Query).unwrap(), b"$?");
        assert_eq!(encode_command(&Command::Ping { target: addr(160) }).unwrap(), b"$P160");
        assert_eq!(
            encode_command(&Command::VoltageQuery { target: addr(7) }).unwrap(),
            b"$V007"
        );
    }

    #[test]
    fn encodes_unicast_with_length_field() {
        let cmd = Command::Unicast {
            target: addr(5),
            payload: b"RELEASE".to_vec(),
        };
        assert_eq!(encode_command(&cmd).unwrap(), b"$U00507RELEASE");
        assert_eq!(
            encode_command(&Command::Release { target: addr(5) }).unwrap(),
            b"$U00507RELEASE"
        );
        assert_eq!(
            encode_command(&Command::Lock { target: addr(169) }).unwrap(),
            b"$U16904LOCK"
        );
        let empty = Command::Unicast { target: addr(0), payload: Vec::new() };
        assert_eq!(encode_command(&empty).unwrap(), b"$U00000");
    }

    #[test]
    fn unicast_length_limit() {
        let max = Command::Unicast { target: addr(1), payload: vec![b'x'; 99] };
        let encoded = encode_command(&max).unwrap();
        assert_eq!(&encoded[5..7], b"99");
        assert_eq!(encoded.len(), 7 + 99);

        let over = Command::Unicast { target: addr(1), payload: vec![b'x'; 100] };
        assert!(matches!(encode_command(&over), Err(ModemError::InvalidArgument(_))));
    }

    #[test]
    fn every_address_survives_an_address_report() {
        for value in 0..=MAX_ADDRESS {
            let address = addr(value);
            let mut frame = b"#A".to_vec();
            frame.extend_from_slice(&address.to_digits());
            frame.extend_from_slice(b"V01500");
            assert_eq!(
                decode_response(&frame),
                Response::AddressReport { address, voltage_raw: 1500 }
            );
        }
    }

    #[test]
    fn every_raw_voltage_decodes() {
        for raw in 0..=u16::MAX {
            let frame = format!("#B160V{:05}", raw);
            match decode_response(frame.as_bytes()) {
                Response::VoltageReport { address, voltage_raw } => {
                    assert_eq!(address, addr(160));
                    let expected = raw as f64 * 15.0 / 65536.0;
                    assert!((crate::types::voltage_from_raw(voltage_raw) - expected).abs() < 1e-9);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn malformed_voltage_fields() {
        for frame in [
            &b"#A00701500"[..],
            b"#AV01500",
            b"#A007V",
            b"#A007V0x500",
            b"#A1000V01500",
            b"#A007V70000",
        ] {
            assert_eq!(
                decode_response(frame),
                Response::Malformed { raw: frame.to_vec() },
                "{}",
                String::from_utf8_lossy(frame)
            );
        }
    }

    #[test]
    fn decodes_range_forms() {
        assert_eq!(
            decode_response(b"#R00048000"),
            Response::RangeReport { travel_time_raw: 48000 }
        );
        assert_eq!(
            decode_response(b"#R160T00048000"),
            Response::RangeReport { travel_time_raw: 48000 }
        );
        assert_eq!(
            decode_response(b"#RT12"),
            Response::RangeReport { travel_time_raw: 12 }
        );
        assert!(matches!(decode_response(b"#R160T"), Response::Malformed { .. }));
        assert!(matches!(decode_response(b"#R"), Response::Malformed { .. }));
        assert!(matches!(decode_response(b"#R99999999999"), Response::Malformed { .. }));
    }

    #[test]
    fn decodes_modem_timeout() {
        assert_eq!(decode_response(b"#TO"), Response::Timeout);
    }

    #[test]
    fn decodes_messages_and_echoes() {
        assert_eq!(
            decode_response(b"#U07RELEASE"),
            Response::UnicastMessage { payload: b"RELEASE".to_vec() }
        );
        assert_eq!(
            decode_response(b"#U04LOCKT0123"),
            Response::UnicastMessage { payload: b"LOCK".to_vec() }
        );
        assert!(matches!(decode_response(b"#U09LOCK"), Response::Malformed { .. }));
        assert_eq!(
            decode_response(b"$U00507RELEASE"),
            Response::UnicastAck { raw: b"$U00507RELEASE".to_vec() }
        );
    }

    #[test]
    fn unknown_input_is_malformed() {
        for frame in [&b""[..], b"#", b"#Z123", b"hello", &[0xff, 0x00, 0x13]] {
            assert_eq!(decode_response(frame), Response::Malformed { raw: frame.to_vec() });
        }
    }
}
