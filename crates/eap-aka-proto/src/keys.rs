//! EAP-AKA and EAP-AKA' key hierarchies
//!
//! - EAP-AKA (RFC 4187 Section 7): `MK = SHA1(Identity | IK | CK)`, expanded
//!   with the FIPS 186-2 (change notice 1) pseudo-random function into
//!   K_encr, K_aut, MSK and EMSK. AT_MAC is HMAC-SHA1-128.
//! - EAP-AKA' (RFC 5448 Section 3.3): CK' and IK' are bound to the access
//!   network name with the 3GPP TS 33.402 KDF, then expanded with PRF'
//!   (HMAC-SHA-256) into K_encr, K_aut, K_re, MSK and EMSK. AT_MAC is
//!   HMAC-SHA-256-128.

use crate::aka::AkaMethod;
use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// Master Session Key length
pub const MSK_LENGTH: usize = 64;
/// Extended Master Session Key length
pub const EMSK_LENGTH: usize = 64;
/// Truncated AT_MAC length
pub const MAC_LENGTH: usize = 16;

/// FC value of the CK'/IK' derivation (3GPP TS 33.402 Annex A.2)
const FC_CK_IK_PRIME: u8 = 0x20;
/// PRF' label for the AKA' master key
const AKA_PRIME_LABEL: &[u8] = b"EAP-AKA'";

/// Key derivation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Access network name must not be empty")]
    EmptyNetworkName,

    #[error("Access network name too long: {0} bytes")]
    NetworkNameTooLong(usize),

    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
}

/// Keys derived for an EAP-AKA session (RFC 4187 Section 7)
#[derive(Clone, PartialEq, Eq)]
pub struct AkaKeys {
    pub k_encr: [u8; 16],
    pub k_aut: [u8; 16],
    pub msk: [u8; MSK_LENGTH],
    pub emsk: [u8; EMSK_LENGTH],
}

impl AkaKeys {
    /// Derive the key hierarchy from the identity used in the exchange
    pub fn derive(identity: &[u8], ck: &[u8; 16], ik: &[u8; 16]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(identity);
        hasher.update(ik);
        hasher.update(ck);
        let mut mk = [0u8; 20];
        mk.copy_from_slice(&hasher.finalize());

        let mut output = [0u8; 160];
        fips186_prf(&mk, &mut output);

        let mut keys = AkaKeys {
            k_encr: [0u8; 16],
            k_aut: [0u8; 16],
            msk: [0u8; MSK_LENGTH],
            emsk: [0u8; EMSK_LENGTH],
        };
        keys.k_encr.copy_from_slice(&output[0..16]);
        keys.k_aut.copy_from_slice(&output[16..32]);
        keys.msk.copy_from_slice(&output[32..96]);
        keys.emsk.copy_from_slice(&output[96..160]);
        keys
    }
}

impl std::fmt::Debug for AkaKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AkaKeys").finish_non_exhaustive()
    }
}

/// Keys derived for an EAP-AKA' session (RFC 5448 Section 3.3)
#[derive(Clone, PartialEq, Eq)]
pub struct AkaPrimeKeys {
    pub k_encr: [u8; 16],
    pub k_aut: [u8; 32],
    pub k_re: [u8; 32],
    pub msk: [u8; MSK_LENGTH],
    pub emsk: [u8; EMSK_LENGTH],
}

impl AkaPrimeKeys {
    /// Derive the key hierarchy
    ///
    /// `autn` is the AUTN sent in the challenge; its first 6 octets are
    /// SQN xor AK.
    pub fn derive(
        identity: &[u8],
        ck: &[u8; 16],
        ik: &[u8; 16],
        network_name: &str,
        autn: &[u8; 16],
    ) -> Result<Self, KeyError> {
        let mut sqn_xor_ak = [0u8; 6];
        sqn_xor_ak.copy_from_slice(&autn[..6]);
        let (ck_prime, ik_prime) = derive_ck_ik_prime(ck, ik, network_name, &sqn_xor_ak)?;

        let mut key = [0u8; 32];
        key[..16].copy_from_slice(&ik_prime);
        key[16..].copy_from_slice(&ck_prime);

        let mut seed = Vec::with_capacity(AKA_PRIME_LABEL.len() + identity.len());
        seed.extend_from_slice(AKA_PRIME_LABEL);
        seed.extend_from_slice(identity);

        let mk = prf_prime(&key, &seed, 208);

        let mut keys = AkaPrimeKeys {
            k_encr: [0u8; 16],
            k_aut: [0u8; 32],
            k_re: [0u8; 32],
            msk: [0u8; MSK_LENGTH],
            emsk: [0u8; EMSK_LENGTH],
        };
        keys.k_encr.copy_from_slice(&mk[0..16]);
        keys.k_aut.copy_from_slice(&mk[16..48]);
        keys.k_re.copy_from_slice(&mk[48..80]);
        keys.msk.copy_from_slice(&mk[80..144]);
        keys.emsk.copy_from_slice(&mk[144..208]);
        Ok(keys)
    }
}

impl std::fmt::Debug for AkaPrimeKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AkaPrimeKeys").finish_non_exhaustive()
    }
}

/// The parts of either key hierarchy a server needs after the challenge
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKeys {
    /// AT_MAC key (16 bytes for AKA, 32 bytes for AKA')
    pub k_aut: Vec<u8>,
    pub msk: [u8; MSK_LENGTH],
}

impl SessionKeys {
    /// Derive the session keys for `method`
    ///
    /// `network_name` and `autn` are only used by AKA'.
    pub fn derive(
        method: AkaMethod,
        identity: &[u8],
        ck: &[u8; 16],
        ik: &[u8; 16],
        network_name: &str,
        autn: &[u8; 16],
    ) -> Result<Self, KeyError> {
        match method {
            AkaMethod::Aka => {
                let keys = AkaKeys::derive(identity, ck, ik);
                Ok(SessionKeys {
                    k_aut: keys.k_aut.to_vec(),
                    msk: keys.msk,
                })
            }
            AkaMethod::AkaPrime => {
                let keys = AkaPrimeKeys::derive(identity, ck, ik, network_name, autn)?;
                Ok(SessionKeys {
                    k_aut: keys.k_aut.to_vec(),
                    msk: keys.msk,
                })
            }
        }
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

/// Derive the 64-byte MSK of an EAP-AKA exchange
pub fn derive_msk(ck: &[u8; 16], ik: &[u8; 16], identity: &[u8]) -> [u8; MSK_LENGTH] {
    AkaKeys::derive(identity, ck, ik).msk
}

const SHA1_IV: [u32; 5] = [0x67452301, 0xEFCDAB89, 0x98BADCFE, 0x10325476, 0xC3D2E1F0];

/// FIPS 186-2 change notice 1 PRF, as profiled by RFC 4186 Appendix B
///
/// Fills `output` with 20-byte words generated from XKEY. No optional
/// user input (XSEED) is used.
pub fn fips186_prf(xkey: &[u8; 20], output: &mut [u8]) {
    let mut xkey = *xkey;

    for chunk in output.chunks_mut(20) {
        // G(t, XVAL): one SHA-1 compression over XVAL zero-padded to 64 bytes
        let mut block = [0u8; 64];
        block[..20].copy_from_slice(&xkey);
        let mut state = SHA1_IV;
        sha1::compress(&mut state, &[block.into()]);

        let mut w = [0u8; 20];
        for (i, word) in state.iter().enumerate() {
            w[i * 4..i * 4 + 4].copy_from_slice(&word.to_be_bytes());
        }
        chunk.copy_from_slice(&w[..chunk.len()]);

        // XKEY = (1 + XKEY + w) mod 2^160
        let mut carry = 1u16;
        for i in (0..20).rev() {
            let sum = xkey[i] as u16 + w[i] as u16 + carry;
            xkey[i] = sum as u8;
            carry = sum >> 8;
        }
    }
}

/// Derive CK' and IK' (3GPP TS 33.402 Annex A.2)
///
/// `S = FC | network name | len | SQN xor AK | 0x0006`, keyed with `CK | IK`.
pub fn derive_ck_ik_prime(
    ck: &[u8; 16],
    ik: &[u8; 16],
    network_name: &str,
    sqn_xor_ak: &[u8; 6],
) -> Result<([u8; 16], [u8; 16]), KeyError> {
    if network_name.is_empty() {
        return Err(KeyError::EmptyNetworkName);
    }
    let name_len = u16::try_from(network_name.len())
        .map_err(|_| KeyError::NetworkNameTooLong(network_name.len()))?;

    let mut key = [0u8; 32];
    key[..16].copy_from_slice(ck);
    key[16..].copy_from_slice(ik);

    let mut s = Vec::with_capacity(1 + network_name.len() + 2 + 6 + 2);
    s.push(FC_CK_IK_PRIME);
    s.extend_from_slice(network_name.as_bytes());
    s.extend_from_slice(&name_len.to_be_bytes());
    s.extend_from_slice(sqn_xor_ak);
    s.extend_from_slice(&6u16.to_be_bytes());

    let derived = hmac_sha256(&key, &s);
    let mut ck_prime = [0u8; 16];
    let mut ik_prime = [0u8; 16];
    ck_prime.copy_from_slice(&derived[..16]);
    ik_prime.copy_from_slice(&derived[16..]);
    Ok((ck_prime, ik_prime))
}

/// PRF' from RFC 5448 Section 3.4
///
/// ```text
/// T1 = HMAC-SHA-256(K, S | 0x01)
/// Tn = HMAC-SHA-256(K, Tn-1 | S | n)
/// ```
pub fn prf_prime(key: &[u8], seed: &[u8], length: usize) -> Vec<u8> {
    let mut output = Vec::with_capacity(length + 32);
    let mut previous: Vec<u8> = Vec::new();
    let mut counter: u8 = 1;

    while output.len() < length {
        let mut input = Vec::with_capacity(previous.len() + seed.len() + 1);
        input.extend_from_slice(&previous);
        input.extend_from_slice(seed);
        input.push(counter);

        let block = hmac_sha256(key, &input);
        output.extend_from_slice(&block);
        previous = block.to_vec();
        counter = counter.wrapping_add(1);
    }

    output.truncate(length);
    output
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    // HMAC accepts keys of any length
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).unwrap_or_else(|_| unreachable!());
    mac.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

fn hmac_sha1(key: &[u8], data: &[u8]) -> [u8; 20] {
    let mut mac = <HmacSha1 as Mac>::new_from_slice(key).unwrap_or_else(|_| unreachable!());
    mac.update(data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// Compute the 16-byte AT_MAC value over `data` for `method`
pub fn compute_mac(method: AkaMethod, k_aut: &[u8], data: &[u8]) -> [u8; MAC_LENGTH] {
    let mut mac = [0u8; MAC_LENGTH];
    match method {
        AkaMethod::Aka => mac.copy_from_slice(&hmac_sha1(k_aut, data)[..MAC_LENGTH]),
        AkaMethod::AkaPrime => mac.copy_from_slice(&hmac_sha256(k_aut, data)[..MAC_LENGTH]),
    }
    mac
}

/// Constant-time comparison of a received value against the expected one
pub fn verify_equal(expected: &[u8], received: &[u8]) -> bool {
    expected.len() == received.len() && bool::from(expected.ct_eq(received))
}
