//! MS-MPPE-Recv-Key / MS-MPPE-Send-Key wrapping (RFC 2548 Section 2.4)
//!
//! The key is prefixed with its 2-byte big-endian length, zero-padded to a
//! multiple of 16 bytes and hidden with an MD5 keystream chained over the
//! ciphertext, the same construction RFC 2865 uses for User-Password.

use crate::keys::MSK_LENGTH;
use rand::Rng;
use thiserror::Error;

/// Salt length
pub const SALT_LENGTH: usize = 2;
/// Length of each MPPE key taken from the MSK
pub const MPPE_KEY_LENGTH: usize = 32;

const BLOCK: usize = 16;
const LENGTH_PREFIX: usize = 2;

/// MS-MPPE key wrapping errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MppeError {
    #[error("Key too long: {0} bytes")]
    KeyTooLong(usize),

    #[error("Invalid wrapped key length: {0}")]
    InvalidLength(usize),

    #[error("Salt high bit not set")]
    InvalidSalt,

    #[error("Embedded key length {0} exceeds the decrypted data")]
    InvalidKeyLength(usize),
}

/// Generate a salt with the most significant bit set
pub fn generate_salt() -> [u8; SALT_LENGTH] {
    let mut rng = rand::rng();
    let mut salt = [0u8; SALT_LENGTH];
    rng.fill(&mut salt);
    salt[0] |= 0x80;
    salt
}

fn keystream(secret: &[u8], first: &[u8], second: &[u8]) -> [u8; BLOCK] {
    let mut data = Vec::with_capacity(secret.len() + first.len() + second.len());
    data.extend_from_slice(secret);
    data.extend_from_slice(first);
    data.extend_from_slice(second);
    md5::compute(&data).0
}

/// Wrap `key` for an MS-MPPE vendor attribute
///
/// Block 0 is XORed with `MD5(secret | request_authenticator | salt)` and
/// block i with `MD5(secret | c[i-1])`. Returns `salt | ciphertext`, the
/// attribute value.
pub fn encode_vendor_key(
    salt: [u8; SALT_LENGTH],
    key: &[u8],
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> Result<Vec<u8>, MppeError> {
    let key_len = u16::try_from(key.len()).map_err(|_| MppeError::KeyTooLong(key.len()))?;

    // Pad length prefix and key to a multiple of 16 bytes
    let mut plain = Vec::with_capacity(LENGTH_PREFIX + key.len() + BLOCK);
    plain.extend_from_slice(&key_len.to_be_bytes());
    plain.extend_from_slice(key);
    let padded = plain.len().div_ceil(BLOCK) * BLOCK;
    plain.resize(padded, 0);

    let mut result = Vec::with_capacity(SALT_LENGTH + padded);
    result.extend_from_slice(&salt);

    let mut hash = keystream(secret, request_authenticator, &salt);
    for chunk in plain.chunks(BLOCK) {
        let mut encrypted_block = [0u8; BLOCK];
        for i in 0..BLOCK {
            encrypted_block[i] = chunk[i] ^ hash[i];
        }
        result.extend_from_slice(&encrypted_block);
        hash = keystream(secret, &encrypted_block, &[]);
    }

    Ok(result)
}

/// Unwrap an MS-MPPE vendor attribute value built by [`encode_vendor_key`]
pub fn decode_vendor_key(
    value: &[u8],
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> Result<Vec<u8>, MppeError> {
    if value.len() < SALT_LENGTH + BLOCK || (value.len() - SALT_LENGTH) % BLOCK != 0 {
        return Err(MppeError::InvalidLength(value.len()));
    }
    let (salt, encrypted) = value.split_at(SALT_LENGTH);
    if salt[0] & 0x80 == 0 {
        return Err(MppeError::InvalidSalt);
    }

    let mut plain = Vec::with_capacity(encrypted.len());
    let mut hash = keystream(secret, request_authenticator, salt);
    for chunk in encrypted.chunks(BLOCK) {
        for i in 0..BLOCK {
            plain.push(chunk[i] ^ hash[i]);
        }
        hash = keystream(secret, chunk, &[]);
    }

    let key_len = u16::from_be_bytes([plain[0], plain[1]]) as usize;
    if LENGTH_PREFIX + key_len > plain.len() {
        return Err(MppeError::InvalidKeyLength(key_len));
    }
    Ok(plain[LENGTH_PREFIX..LENGTH_PREFIX + key_len].to_vec())
}

/// Wrapped MS-MPPE-Recv-Key and MS-MPPE-Send-Key attribute values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MppeKeys {
    pub recv_key: Vec<u8>,
    pub send_key: Vec<u8>,
}

impl MppeKeys {
    /// Wrap both halves of the MSK, each with a fresh salt
    ///
    /// Recv-Key is MSK[0..32], Send-Key is MSK[32..64].
    pub fn from_msk(
        msk: &[u8; MSK_LENGTH],
        request_authenticator: &[u8; 16],
        secret: &[u8],
    ) -> Result<Self, MppeError> {
        let recv_salt = generate_salt();
        let mut send_salt = generate_salt();
        while send_salt == recv_salt {
            send_salt = generate_salt();
        }

        Ok(MppeKeys {
            recv_key: encode_vendor_key(
                recv_salt,
                &msk[..MPPE_KEY_LENGTH],
                request_authenticator,
                secret,
            )?,
            send_key: encode_vendor_key(
                send_salt,
                &msk[MPPE_KEY_LENGTH..],
                request_authenticator,
                secret,
            )?,
        })
    }
}
