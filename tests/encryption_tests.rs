//! Encrypted exchanges: the delimiter and terminator stay in clear, the
//! body between them is ciphertext.

use nm3_modem::crypto::{ChainCipher, CipherKey, CounterCipher, FrameCipher};
use nm3_modem::sim::{ScriptedTransport, SimClock};
use nm3_modem::{
    MemorySink, ModemAddress, ModemConfig, ModemEvent, Nm3, PingOutcome, Response,
};
use std::sync::Arc;
use std::time::Duration;

const IV: [u8; 16] = [7; 16];

fn addr(v: u16) -> ModemAddress {
    ModemAddress::new(v).unwrap()
}

/// What a peer using the same cipher would put on the line
fn seal(cipher: &dyn FrameCipher, plain: &[u8]) -> Vec<u8> {
    let mut wire = vec![plain[0]];
    wire.extend_from_slice(&cipher.encrypt(&plain[1..]));
    wire.extend_from_slice(b"\r\n");
    wire
}

#[test]
fn chaining_mode_identity_round_trip() {
    let key = CipherKey::from_passphrase("ropeless");
    let peer = ChainCipher::new(key.clone(), IV);
    let clock = SimClock::new();
    let mut transport = ScriptedTransport::new(clock.clone());
    transport.reply_to_next_write(vec![(Duration::from_millis(40), seal(&peer, b"#A007V01500"))]);

    let mut nm3 = Nm3::new(transport.clone(), clock, Default::default())
        .with_cipher(Box::new(ChainCipher::new(key, IV)));
    let reading = nm3.query_identity().unwrap();
    assert_eq!(reading.address, addr(7));

    let written = transport.written();
    assert_eq!(written.len(), 1);
    let wire = &written[0];
    assert_eq!(wire[0], b'$');
    assert!(wire.ends_with(b"\r\n"));
    assert_eq!(wire.len(), 1 + 16 + 2);
    assert_eq!(peer.decrypt(&wire[1..wire.len() - 2]), nm3_modem::crypto::Decrypted::Plain(b"?".to_vec()));
}

#[test]
fn counter_mode_ping_round_trip() {
    let key = CipherKey::from_passphrase("ropeless");
    let peer = CounterCipher::new(key.clone(), IV);
    let clock = SimClock::new();
    let mut transport = ScriptedTransport::new(clock.clone());
    let ack = seal(&peer, b"$P160");
    let range = seal(&peer, b"#R00048000");
    // Ciphertext bytes that happen to form a terminator would split the frame.
    assert!(!ack[..ack.len() - 2].windows(2).any(|w| w == b"\r\n"));
    assert!(!range[..range.len() - 2].windows(2).any(|w| w == b"\r\n"));
    transport.reply_to_next_write(vec![
        (Duration::from_millis(10), ack),
        (Duration::from_millis(600), range),
    ]);

    let mut nm3 = Nm3::new(transport.clone(), clock, Default::default())
        .with_cipher(Box::new(CounterCipher::new(key, IV)));
    match nm3.ping(addr(160)).unwrap() {
        PingOutcome::Range { travel_time_raw, .. } => assert_eq!(travel_time_raw, 48000),
        other => panic!("expected a range, got {:?}", other),
    }

    let wire = &transport.written()[0];
    assert_eq!(wire.len(), b"$P160\r\n".len());
    assert_ne!(&wire[1..5], b"P160");
}

#[test]
fn unaligned_ciphertext_degrades_to_malformed() {
    let key = CipherKey::from_passphrase("ropeless");
    let clock = SimClock::new();
    let mut transport = ScriptedTransport::new(clock.clone());
    transport.push_inbound(b"#0123456789\r\n".to_vec());
    let sink = Arc::new(MemorySink::new());

    let mut nm3 = Nm3::new(transport, clock, Default::default())
        .with_cipher(Box::new(ChainCipher::new(key, IV)))
        .with_sink(sink.clone());

    assert_eq!(
        nm3.read_next_response(),
        Response::Malformed { raw: b"#0123456789".to_vec() }
    );
    assert!(sink.contains(|e| *e == ModemEvent::DecryptDegraded { len: 10 }));
}

#[test]
fn engine_built_from_config_uses_configured_cipher() {
    let config = ModemConfig::from_toml_str(
        r#"
        [encryption]
        mode = "chaining"
        passphrase = "ropeless"
        iv = "07070707070707070707070707070707"
        "#,
    )
    .unwrap();
    let peer = ChainCipher::new(CipherKey::from_passphrase("ropeless"), IV);

    let clock = SimClock::new();
    let mut transport = ScriptedTransport::new(clock.clone());
    transport.push_inbound(seal(&peer, b"#U04LOCK"));

    let mut nm3 = Nm3::with_config(transport, clock, &config).unwrap();
    assert_eq!(
        nm3.read_next_response(),
        Response::UnicastMessage { payload: b"LOCK".to_vec() }
    );
}

#[test]
fn counter_mode_session_nonce_is_shared_with_peer() {
    let config = ModemConfig::from_toml_str(
        r#"
        [encryption]
        mode = "counter"
        passphrase = "ropeless"
        "#,
    )
    .unwrap();

    let clock = SimClock::new();
    let line = ScriptedTransport::new(clock.clone());
    let mut surface = Nm3::with_config(line.clone(), clock.clone(), &config).unwrap();
    let nonce = surface.cipher_iv().unwrap();
    let other = Nm3::with_config(ScriptedTransport::new(clock.clone()), clock.clone(), &config).unwrap();
    assert_ne!(other.cipher_iv(), Some(nonce));

    let mut peer_config = config.clone();
    if let Some(encryption) = peer_config.encryption.as_mut() {
        encryption.iv = Some(hex::encode(nonce));
    }
    let node = Nm3::with_config(ScriptedTransport::new(clock.clone()), clock, &peer_config).unwrap();
    assert_eq!(node.cipher_iv(), Some(nonce));

    assert!(surface.release(addr(5)).is_err());
    let wire = &line.written()[0];
    let peer = CounterCipher::new(CipherKey::from_passphrase("ropeless"), nonce);
    assert_eq!(
        peer.decrypt(&wire[1..wire.len() - 2]),
        nm3_modem::crypto::Decrypted::Plain(b"U00507RELEASE".to_vec())
    );
}
