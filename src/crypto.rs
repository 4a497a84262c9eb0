//! Frame payload encryption.
//!
//! Two AES-256 modes are supported behind the [`FrameCipher`] trait:
//!
//! - [`CounterCipher`]: CTR mode with a 128-bit big-endian counter starting
//!   at a per-session nonce. No padding.
//! - [`ChainCipher`]: CBC mode with a fixed IV. Plaintext is zero padded to
//!   the 16-byte block size and padding is stripped after decryption.
//!
//! The key is the SHA-256 digest of an operator passphrase, with no salt
//! and no stretching. That keeps peers interoperable but offers no real
//! protection against an offline guess of the passphrase.

use crate::config::{CipherMode, EncryptionConfig};
use crate::constants::*;
use crate::error::{ModemError, Result};
use aes::Aes256;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, StreamCipher};
use rand::RngCore;
use sha2::{Digest, Sha256};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// 256-bit symmetric key
#[derive(Clone, PartialEq, Eq)]
pub struct CipherKey([u8; 32]);

impl CipherKey {
    /// Hash a passphrase into a key
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        CipherKey(key)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CipherKey(..)")
    }
}

/// Result of decrypting a received payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decrypted {
    Plain(Vec<u8>),
    /// Ciphertext could not be decrypted; the input is returned untouched
    Malformed(Vec<u8>),
}

/// Symmetric transform applied to frame payloads
pub trait FrameCipher: Send {
    fn encrypt(&self, plaintext: &[u8]) -> Vec<u8>;
    fn decrypt(&self, ciphertext: &[u8]) -> Decrypted;
    /// Initial counter block or IV; peers must use the same one
    fn iv(&self) -> &[u8; BLOCK_SIZE];
}

/// AES-256-CTR
#[derive(Debug, Clone)]
pub struct CounterCipher {
    key: CipherKey,
    nonce: [u8; BLOCK_SIZE],
}

impl CounterCipher {
    pub fn new(key: CipherKey, nonce: [u8; BLOCK_SIZE]) -> Self {
        CounterCipher { key, nonce }
    }

    /// Draw a fresh random nonce for this session
    pub fn with_random_nonce(key: CipherKey) -> Self {
        let mut nonce = [0u8; BLOCK_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);
        CounterCipher { key, nonce }
    }

    fn apply(&self, data: &[u8]) -> Vec<u8> {
        let mut buf = data.to_vec();
        let mut cipher = Aes256Ctr::new(self.key.as_bytes().into(), (&self.nonce).into());
        cipher.apply_keystream(&mut buf);
        buf
    }
}

impl FrameCipher for CounterCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        self.apply(plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Decrypted {
        Decrypted::Plain(self.apply(ciphertext))
    }

    fn iv(&self) -> &[u8; BLOCK_SIZE] {
        &self.nonce
    }
}

/// AES-256-CBC with zero padding
#[derive(Debug, Clone)]
pub struct ChainCipher {
    key: CipherKey,
    iv: [u8; BLOCK_SIZE],
}

impl ChainCipher {
    pub fn new(key: CipherKey, iv: [u8; BLOCK_SIZE]) -> Self {
        ChainCipher { key, iv }
    }
}

impl FrameCipher for ChainCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let padded_len = plaintext.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
        let mut buf = vec![0u8; padded_len];
        buf[..plaintext.len()].copy_from_slice(plaintext);

        let cipher = Aes256CbcEnc::new(self.key.as_bytes().into(), (&self.iv).into());
        match cipher.encrypt_padded_mut::<NoPadding>(&mut buf, padded_len) {
            Ok(ciphertext) => ciphertext.to_vec(),
            // padded_len is a whole number of blocks, so NoPadding cannot fail
            Err(_) => Vec::new(),
        }
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Decrypted {
        if ciphertext.len() % BLOCK_SIZE != 0 {
            return Decrypted::Malformed(ciphertext.to_vec());
        }

        let mut buf = ciphertext.to_vec();
        let cipher = Aes256CbcDec::new(self.key.as_bytes().into(), (&self.iv).into());
        match cipher.decrypt_padded_mut::<NoPadding>(&mut buf) {
            Ok(plaintext) => Decrypted::Plain(strip_padding(plaintext).to_vec()),
            Err(_) => Decrypted::Malformed(ciphertext.to_vec()),
        }
    }

    fn iv(&self) -> &[u8; BLOCK_SIZE] {
        &self.iv
    }
}

/// Trim trailing zero and line-terminator bytes left by block padding
fn strip_padding(data: &[u8]) -> &[u8] {
    let end = data
        .iter()
        .rposition(|&b| b != 0 && b != b'\r' && b != b'\n')
        .map_or(0, |i| i + 1);
    &data[..end]
}

/// Build the cipher selected by configuration.
///
/// Counter mode without a configured `iv` draws a random session nonce;
/// read it back with [`FrameCipher::iv`] and configure it on every peer.
pub fn cipher_from_config(config: &EncryptionConfig) -> Result<Box<dyn FrameCipher>> {
    let key = CipherKey::from_passphrase(&config.passphrase);
    let iv = config.iv_bytes()?;

    match (config.mode, iv) {
        (CipherMode::Counter, Some(nonce)) => Ok(Box::new(CounterCipher::new(key, nonce))),
        (CipherMode::Counter, None) => Ok(Box::new(CounterCipher::with_random_nonce(key))),
        (CipherMode::Chaining, Some(iv)) => Ok(Box::new(ChainCipher::new(key, iv))),
        (CipherMode::Chaining, None) => Err(ModemError::Config(
            "chaining mode requires a fixed iv".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IV: [u8; 16] = *b"0123456789abcdef";

    fn payloads() -> impl Iterator<Item = Vec<u8>> {
        (0..200usize).map(|len| (0..len).map(|i| (i * 37 + len) as u8).collect())
    }

    #[test]
    fn key_derivation_is_sha256_of_passphrase() {
        let key = CipherKey::from_passphrase("abc");
        assert_eq!(
            hex::encode(key.as_bytes()),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(key, CipherKey::from_passphrase("abc"));
    }

    #[test]
    fn counter_mode_round_trips_any_length() {
        let cipher = CounterCipher::new(CipherKey::from_passphrase("lobster pot"), IV);
        for plaintext in payloads() {
            let ciphertext = cipher.encrypt(&plaintext);
            assert_eq!(ciphertext.len(), plaintext.len());
            assert_eq!(cipher.decrypt(&ciphertext), Decrypted::Plain(plaintext));
        }
    }

    #[test]
    fn counter_mode_is_deterministic_per_nonce() {
        let key = CipherKey::from_passphrase("lobster pot");
        let a = CounterCipher::new(key.clone(), IV);
        let b = CounterCipher::new(key, [0u8; 16]);
        assert_eq!(a.encrypt(b"RELEASE"), a.encrypt(b"RELEASE"));
        assert_ne!(a.encrypt(b"RELEASE"), b.encrypt(b"RELEASE"));
    }

    #[test]
    fn chaining_mode_round_trips_modulo_padding() {
        let cipher = ChainCipher::new(CipherKey::from_passphrase("lobster pot"), IV);
        for plaintext in payloads() {
            let ciphertext = cipher.encrypt(&plaintext);
            assert_eq!(ciphertext.len() % BLOCK_SIZE, 0);
            let Decrypted::Plain(recovered) = cipher.decrypt(&ciphertext) else {
                panic!("decrypt failed for length {}", plaintext.len());
            };
            assert_eq!(recovered, strip_padding(&plaintext));
        }
    }

    #[test]
    fn chaining_mode_recovers_ascii_commands_exactly() {
        let cipher = ChainCipher::new(CipherKey::from_passphrase("lobster pot"), IV);
        let ciphertext = cipher.encrypt(b"U00507RELEASE");
        assert_eq!(ciphertext.len(), 16);
        assert_eq!(
            cipher.decrypt(&ciphertext),
            Decrypted::Plain(b"U00507RELEASE".to_vec())
        );
    }

    #[test]
    fn chaining_mode_rejects_partial_blocks() {
        let cipher = ChainCipher::new(CipherKey::from_passphrase("lobster pot"), IV);
        let input = vec![0xAB; 17];
        assert_eq!(cipher.decrypt(&input), Decrypted::Malformed(input.clone()));
    }

    #[test]
    fn strip_padding_removes_zeros_and_terminators() {
        assert_eq!(strip_padding(b"LOCK\r\n\0\0"), b"LOCK");
        assert_eq!(strip_padding(b"\0\0"), b"");
        assert_eq!(strip_padding(b"A\0B\0"), b"A\0B");
    }

    #[test]
    fn session_nonce_lets_a_peer_join() {
        let config = EncryptionConfig {
            mode: CipherMode::Counter,
            passphrase: "ropeless".to_string(),
            iv: None,
        };
        let first = cipher_from_config(&config).unwrap();
        let second = cipher_from_config(&config).unwrap();
        assert_ne!(first.iv(), second.iv());

        let joined = EncryptionConfig {
            iv: Some(hex::encode(first.iv())),
            ..config
        };
        let peer = cipher_from_config(&joined).unwrap();
        assert_eq!(peer.iv(), first.iv());
        assert_eq!(
            peer.decrypt(&first.encrypt(b"U00507RELEASE")),
            Decrypted::Plain(b"U00507RELEASE".to_vec())
        );
    }

    #[test]
    fn chaining_config_without_iv_is_rejected() {
        let config = EncryptionConfig {
            mode: CipherMode::Chaining,
            passphrase: "lobster pot".to_string(),
            iv: None,
        };
        assert!(matches!(cipher_from_config(&config), Err(ModemError::Config(_))));
    }
}
