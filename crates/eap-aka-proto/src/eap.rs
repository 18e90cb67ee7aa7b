//! EAP (Extensible Authentication Protocol) packet codec
//!
//! This module implements the outer EAP framing defined in RFC 3748. The
//! AKA/AKA' method payload carried inside Request/Response packets is handled
//! by [`crate::aka`].
//!
//! # EAP Packet Format
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Code      |  Identifier   |            Length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Type      |  Type-Data ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use thiserror::Error;

/// EAP packet code (first byte of EAP packet)
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EapCode {
    /// Request packet (Code 1)
    Request = 1,
    /// Response packet (Code 2)
    Response = 2,
    /// Success packet (Code 3)
    Success = 3,
    /// Failure packet (Code 4)
    Failure = 4,
}

impl EapCode {
    /// Convert from u8 to EapCode
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(EapCode::Request),
            2 => Some(EapCode::Response),
            3 => Some(EapCode::Success),
            4 => Some(EapCode::Failure),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether packets with this code carry a Type field
    pub fn has_type(self) -> bool {
        matches!(self, EapCode::Request | EapCode::Response)
    }
}

/// EAP method types (RFC 3748 and IANA registry)
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EapType {
    /// Identity (Type 1) - RFC 3748
    Identity = 1,
    /// Notification (Type 2) - RFC 3748
    Notification = 2,
    /// Legacy Nak (Type 3) - RFC 3748
    /// Response only, sent in response to unacceptable authentication type
    Nak = 3,
    /// MD5-Challenge (Type 4) - RFC 3748
    Md5Challenge = 4,
    /// One-Time Password (Type 5) - RFC 3748
    OneTimePassword = 5,
    /// Generic Token Card (Type 6) - RFC 3748
    GenericTokenCard = 6,
    /// EAP-TLS (Type 13) - RFC 5216
    Tls = 13,
    /// EAP-SIM (Type 18) - RFC 4186
    Sim = 18,
    /// EAP-TTLS (Type 21) - RFC 5281
    Ttls = 21,
    /// EAP-AKA (Type 23) - RFC 4187
    Aka = 23,
    /// PEAP (Type 25)
    Peap = 25,
    /// EAP-MSCHAPv2 (Type 26)
    MsChapV2 = 26,
    /// EAP-AKA' (Type 50) - RFC 5448
    AkaPrime = 50,
    /// EAP-TEAP (Type 55) - RFC 7170
    Teap = 55,
}

impl EapType {
    /// Convert from u8 to EapType
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(EapType::Identity),
            2 => Some(EapType::Notification),
            3 => Some(EapType::Nak),
            4 => Some(EapType::Md5Challenge),
            5 => Some(EapType::OneTimePassword),
            6 => Some(EapType::GenericTokenCard),
            13 => Some(EapType::Tls),
            18 => Some(EapType::Sim),
            21 => Some(EapType::Ttls),
            23 => Some(EapType::Aka),
            25 => Some(EapType::Peap),
            26 => Some(EapType::MsChapV2),
            50 => Some(EapType::AkaPrime),
            55 => Some(EapType::Teap),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// EAP packet structure
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapPacket {
    /// EAP code (Request, Response, Success, Failure)
    pub code: EapCode,
    /// Identifier for matching requests and responses (0-255)
    pub identifier: u8,
    /// EAP type (only present for Request/Response)
    pub eap_type: Option<EapType>,
    /// Type-specific data
    pub data: Vec<u8>,
}

impl EapPacket {
    /// Size of the Code/Identifier/Length header
    pub const HEADER_LENGTH: usize = 4;
    /// Largest packet the 16-bit Length field can describe
    pub const MAX_LENGTH: usize = u16::MAX as usize;

    /// Create a new EAP packet
    pub fn new(code: EapCode, identifier: u8, eap_type: Option<EapType>, data: Vec<u8>) -> Self {
        EapPacket {
            code,
            identifier,
            eap_type,
            data,
        }
    }

    /// Create an EAP Identity Request
    pub fn identity_request(identifier: u8, message: &str) -> Self {
        EapPacket {
            code: EapCode::Request,
            identifier,
            eap_type: Some(EapType::Identity),
            data: message.as_bytes().to_vec(),
        }
    }

    /// Create an EAP Identity Response
    pub fn identity_response(identifier: u8, identity: &str) -> Self {
        EapPacket {
            code: EapCode::Response,
            identifier,
            eap_type: Some(EapType::Identity),
            data: identity.as_bytes().to_vec(),
        }
    }

    /// Create a Legacy Nak response listing the peer's desired methods
    pub fn nak(identifier: u8, desired: &[u8]) -> Self {
        EapPacket {
            code: EapCode::Response,
            identifier,
            eap_type: Some(EapType::Nak),
            data: desired.to_vec(),
        }
    }

    /// Create an EAP Success packet
    pub fn success(identifier: u8) -> Self {
        EapPacket {
            code: EapCode::Success,
            identifier,
            eap_type: None,
            data: Vec::new(),
        }
    }

    /// Create an EAP Failure packet
    pub fn failure(identifier: u8) -> Self {
        EapPacket {
            code: EapCode::Failure,
            identifier,
            eap_type: None,
            data: Vec::new(),
        }
    }

    /// Identity carried by an EAP Response/Identity, if this is one
    ///
    /// Trailing NUL octets sent by some supplicants are stripped.
    pub fn identity(&self) -> Option<String> {
        if self.eap_type != Some(EapType::Identity) {
            return None;
        }
        let end = self
            .data
            .iter()
            .rposition(|b| *b != 0)
            .map(|pos| pos + 1)
            .unwrap_or(0);
        Some(String::from_utf8_lossy(&self.data[..end]).into_owned())
    }

    /// Desired method list carried by a Legacy Nak, if this is one
    pub fn desired_types(&self) -> Option<&[u8]> {
        if self.code == EapCode::Response && self.eap_type == Some(EapType::Nak) {
            Some(&self.data)
        } else {
            None
        }
    }

    /// Parse EAP packet from bytes
    ///
    /// # Packet Format
    /// - Code (1 byte)
    /// - Identifier (1 byte)
    /// - Length (2 bytes, network byte order)
    /// - Type (1 byte, only for Request/Response)
    /// - Type-Data (variable length)
    ///
    /// Octets beyond Length are treated as link-layer padding and ignored
    /// (RFC 3748 Section 4.1).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EapError> {
        if bytes.len() < Self::HEADER_LENGTH {
            return Err(EapError::PacketTooShort {
                expected: Self::HEADER_LENGTH,
                actual: bytes.len(),
            });
        }

        // Parse header
        let code = EapCode::from_u8(bytes[0]).ok_or(EapError::InvalidCode(bytes[0]))?;
        let identifier = bytes[1];
        let length = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;

        // Validate length
        if length < Self::HEADER_LENGTH {
            return Err(EapError::InvalidLength(length));
        }
        if bytes.len() < length {
            return Err(EapError::PacketTooShort {
                expected: length,
                actual: bytes.len(),
            });
        }

        let (eap_type, data) = match code {
            EapCode::Request | EapCode::Response => {
                if length < Self::HEADER_LENGTH + 1 {
                    return Err(EapError::InvalidLength(length));
                }
                let type_byte = bytes[4];
                let eap_type =
                    EapType::from_u8(type_byte).ok_or(EapError::UnknownType(type_byte))?;
                (Some(eap_type), bytes[5..length].to_vec())
            }
            EapCode::Success | EapCode::Failure => {
                // Success and Failure packets have no Type field
                if length != Self::HEADER_LENGTH {
                    return Err(EapError::InvalidLength(length));
                }
                (None, Vec::new())
            }
        };

        Ok(EapPacket {
            code,
            identifier,
            eap_type,
            data,
        })
    }

    /// Encode EAP packet to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let length = self.length();
        let mut bytes = Vec::with_capacity(length);

        bytes.push(self.code.as_u8());
        bytes.push(self.identifier);
        bytes.extend_from_slice(&(length as u16).to_be_bytes());

        if self.code.has_type() {
            if let Some(eap_type) = self.eap_type {
                bytes.push(eap_type.as_u8());
                bytes.extend_from_slice(&self.data);
            }
        }

        bytes
    }

    /// Get the total length of the packet
    pub fn length(&self) -> usize {
        match (self.code.has_type(), self.eap_type) {
            (true, Some(_)) => Self::HEADER_LENGTH + 1 + self.data.len(),
            _ => Self::HEADER_LENGTH,
        }
    }
}

/// EAP and EAP-AKA codec errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EapError {
    #[error("Packet too short: expected at least {expected} bytes, got {actual}")]
    PacketTooShort { expected: usize, actual: usize },

    #[error("Invalid EAP code: {0}")]
    InvalidCode(u8),

    #[error("Invalid packet length: {0}")]
    InvalidLength(usize),

    #[error("Unknown EAP type: {0}")]
    UnknownType(u8),

    #[error("Packet does not carry an AKA or AKA' body (type {0:?})")]
    NotAkaPacket(Option<EapType>),

    #[error("Unknown AKA subtype: {0}")]
    UnknownSubtype(u8),

    #[error("AKA body length {0} is not a multiple of 4")]
    UnalignedBody(usize),

    #[error("Attribute {attr_type} at offset {offset} overruns the packet")]
    AttributeOverrun { attr_type: u8, offset: usize },

    #[error("Attribute {0} has zero length")]
    ZeroLengthAttribute(u8),

    #[error("Unsupported non-skippable attribute: {0}")]
    UnsupportedAttribute(u8),

    #[error("Malformed attribute {attr_type}: {reason}")]
    InvalidAttribute { attr_type: u8, reason: &'static str },

    #[error("Encoding error: {0}")]
    EncodingError(String),
}
