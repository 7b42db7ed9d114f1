//! Frame encryption stage.
//!
//! After the handshake every batch body is encrypted with AES-256-CTR. The IV is the
//! first 12 bytes of the session key followed by the big-endian counter `2`. Before
//! encryption an 8-byte trailer is appended: the first 8 bytes of
//! `SHA-256(send_counter_le ‖ body ‖ key)`. Each direction owns its own instance, so
//! keystream position and counter advance independently.

use crate::error::{constants, ProtocolError, Result};
use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr32BE;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

type Aes256Ctr = Ctr32BE<Aes256>;

/// Length of the integrity trailer
pub const CHECKSUM_LEN: usize = 8;

pub struct FrameEncryption {
    cipher: Aes256Ctr,
    key: [u8; 32],
    counter: u64,
}

impl std::fmt::Debug for FrameEncryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameEncryption")
            .field("counter", &self.counter)
            .finish_non_exhaustive()
    }
}

impl FrameEncryption {
    pub fn new(key: &[u8; 32]) -> Result<Self> {
        let mut iv = [0u8; 16];
        iv[..12].copy_from_slice(&key[..12]);
        iv[15] = 2;
        let cipher = Aes256Ctr::new_from_slices(key, &iv)
            .map_err(|e| ProtocolError::CryptoError(format!("Invalid key or IV: {e}")))?;
        Ok(Self {
            cipher,
            key: *key,
            counter: 0,
        })
    }

    /// Append the trailer to `body` and encrypt it in place
    pub fn encrypt(&mut self, body: &mut Vec<u8>) {
        let trailer = self.checksum(body);
        self.counter = self.counter.wrapping_add(1);
        body.extend_from_slice(&trailer);
        self.cipher.apply_keystream(body);
    }

    /// Decrypt `data` in place, verify and strip the trailer
    pub fn decrypt(&mut self, data: &mut Vec<u8>) -> Result<()> {
        if data.len() < CHECKSUM_LEN {
            return Err(ProtocolError::DecodeError(
                constants::ERR_FRAME_CHECKSUM.into(),
            ));
        }
        self.cipher.apply_keystream(data);
        let split = data.len() - CHECKSUM_LEN;
        let expected = self.checksum(&data[..split]);
        self.counter = self.counter.wrapping_add(1);
        if expected[..] != data[split..] {
            return Err(ProtocolError::DecodeError(
                constants::ERR_FRAME_CHECKSUM.into(),
            ));
        }
        data.truncate(split);
        Ok(())
    }

    fn checksum(&self, body: &[u8]) -> [u8; CHECKSUM_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(self.counter.to_le_bytes());
        hasher.update(body);
        hasher.update(self.key);
        let digest = hasher.finalize();
        let mut out = [0u8; CHECKSUM_LEN];
        out.copy_from_slice(&digest[..CHECKSUM_LEN]);
        out
    }
}

impl Drop for FrameEncryption {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}
