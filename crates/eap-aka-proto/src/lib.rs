//! EAP-AKA / EAP-AKA' Protocol Implementation
//!
//! This crate provides the stateless half of an EAP-AKA server: the EAP
//! packet codec (RFC 3748), the EAP-AKA and EAP-AKA' message and attribute
//! codec (RFC 4187, RFC 5448), both key hierarchies, and the RFC 2548
//! MS-MPPE key wrapping used to export the MSK.
//!
//! # Features
//!
//! - EAP packet encoding and decoding, including Legacy Nak
//! - AKA/AKA' subtypes and AT_* attributes with strict length checking
//! - AT_MAC computation and verification (HMAC-SHA1-128, HMAC-SHA-256-128)
//! - FIPS 186-2 PRF and PRF' key expansion
//! - MS-MPPE-Recv-Key / MS-MPPE-Send-Key wrapping
//!
//! # Example
//!
//! ```rust
//! use eap_aka_proto::{AkaMessage, AkaMethod, AttributeType, EapPacket};
//! use eap_aka_proto::aka::identity_request;
//!
//! // Ask the peer for its permanent identity
//! let request = identity_request(237, AkaMethod::Aka);
//! let bytes = request.to_bytes();
//! assert_eq!(bytes, [0x01, 0xed, 0x00, 0x0c, 0x17, 0x05, 0x00, 0x00, 0x0a, 0x01, 0x00, 0x00]);
//!
//! // Decode it again
//! let packet = EapPacket::from_bytes(&bytes).unwrap();
//! let message = AkaMessage::from_eap(&packet).unwrap();
//! assert!(message.find(AttributeType::PermanentIdReq).is_some());
//! ```

pub mod aka;
pub mod eap;
pub mod keys;
pub mod mppe;

pub use aka::{AkaMessage, AkaMethod, Attribute, AttributeType, Subtype};
pub use eap::{EapCode, EapError, EapPacket, EapType};
pub use keys::{AkaKeys, AkaPrimeKeys, KeyError, SessionKeys, derive_msk};
pub use mppe::{MppeError, MppeKeys, decode_vendor_key, encode_vendor_key, generate_salt};
