//! EAP-AKA (RFC 4187) and EAP-AKA' (RFC 5448) method payloads
//!
//! Both methods share one body layout, carried as the Type-Data of an EAP
//! Request or Response:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Subtype    |           Reserved            | Attributes...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

mod attribute;

pub use attribute::{Attribute, AttributeType};

use crate::eap::{EapCode, EapError, EapPacket, EapType};
use crate::keys::{compute_mac, verify_equal};

/// AKA method variant
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AkaMethod {
    /// EAP-AKA (Type 23)
    Aka,
    /// EAP-AKA' (Type 50)
    AkaPrime,
}

impl AkaMethod {
    pub fn from_eap_type(eap_type: EapType) -> Option<Self> {
        match eap_type {
            EapType::Aka => Some(AkaMethod::Aka),
            EapType::AkaPrime => Some(AkaMethod::AkaPrime),
            _ => None,
        }
    }

    /// Method from its EAP type number
    pub fn from_u8(value: u8) -> Option<Self> {
        EapType::from_u8(value).and_then(Self::from_eap_type)
    }

    pub fn eap_type(self) -> EapType {
        match self {
            AkaMethod::Aka => EapType::Aka,
            AkaMethod::AkaPrime => EapType::AkaPrime,
        }
    }

    pub fn as_u8(self) -> u8 {
        self.eap_type().as_u8()
    }

    /// Leading digit of a permanent identity for this method (3GPP TS 23.003)
    pub fn permanent_identity_prefix(self) -> char {
        match self {
            AkaMethod::Aka => '0',
            AkaMethod::AkaPrime => '6',
        }
    }

    /// Whether `identity` is a permanent (IMSI-based) identity for this method
    pub fn is_permanent_identity(self, identity: &str) -> bool {
        identity.starts_with(self.permanent_identity_prefix())
    }
}

impl std::fmt::Display for AkaMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AkaMethod::Aka => write!(f, "AKA"),
            AkaMethod::AkaPrime => write!(f, "AKA'"),
        }
    }
}

/// EAP-AKA subtypes (RFC 4187 Section 11)
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Subtype {
    Challenge = 1,
    AuthenticationReject = 2,
    SynchronizationFailure = 4,
    Identity = 5,
    Notification = 12,
    Reauthentication = 13,
    ClientError = 14,
}

impl Subtype {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Subtype::Challenge),
            2 => Some(Subtype::AuthenticationReject),
            4 => Some(Subtype::SynchronizationFailure),
            5 => Some(Subtype::Identity),
            12 => Some(Subtype::Notification),
            13 => Some(Subtype::Reauthentication),
            14 => Some(Subtype::ClientError),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// AT_NOTIFICATION codes (RFC 4187 Section 10.19)
pub mod notification {
    /// S bit: the notification reports success
    pub const SUCCESS_BIT: u16 = 0x8000;
    /// P bit: the notification is sent before the challenge round
    pub const PHASE_BIT: u16 = 0x4000;

    pub const GENERAL_FAILURE_AFTER_AUTHENTICATION: u16 = 0;
    pub const USER_DENIED: u16 = 1026;
    pub const USER_NOT_SUBSCRIBED: u16 = 1031;
    pub const GENERAL_FAILURE: u16 = 16384;
    pub const SUCCESS: u16 = 32768;

    pub fn is_success(code: u16) -> bool {
        code & SUCCESS_BIT != 0
    }

    /// Notifications with the P bit set carry no AT_MAC
    pub fn is_before_challenge(code: u16) -> bool {
        code & PHASE_BIT != 0
    }
}

/// AT_CLIENT_ERROR_CODE values (RFC 4187 Section 10.20)
pub mod client_error {
    pub const UNABLE_TO_PROCESS: u16 = 0;
}

/// KDF number for CK'/IK' derivation with HMAC-SHA-256 (RFC 5448)
pub const KDF_AKA_PRIME_SHA256: u16 = 1;

/// Decoded EAP-AKA or EAP-AKA' message
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AkaMessage {
    /// Request or Response
    pub code: EapCode,
    pub identifier: u8,
    pub method: AkaMethod,
    pub subtype: Subtype,
    /// Attributes in wire order
    pub attributes: Vec<Attribute>,
}

impl AkaMessage {
    /// Subtype + Reserved
    pub const BODY_HEADER_LENGTH: usize = 3;

    pub fn new(code: EapCode, identifier: u8, method: AkaMethod, subtype: Subtype) -> Self {
        AkaMessage {
            code,
            identifier,
            method,
            subtype,
            attributes: Vec::new(),
        }
    }

    /// Append an attribute (builder style)
    pub fn with(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Decode the AKA body of an EAP Request or Response
    pub fn from_eap(packet: &EapPacket) -> Result<Self, EapError> {
        let method = packet
            .eap_type
            .and_then(AkaMethod::from_eap_type)
            .ok_or(EapError::NotAkaPacket(packet.eap_type))?;

        let data = &packet.data;
        if data.len() < Self::BODY_HEADER_LENGTH {
            return Err(EapError::PacketTooShort {
                expected: EapPacket::HEADER_LENGTH + 1 + Self::BODY_HEADER_LENGTH,
                actual: EapPacket::HEADER_LENGTH + 1 + data.len(),
            });
        }

        let subtype = Subtype::from_u8(data[0]).ok_or(EapError::UnknownSubtype(data[0]))?;
        let body = &data[Self::BODY_HEADER_LENGTH..];
        if body.len() % 4 != 0 {
            return Err(EapError::UnalignedBody(body.len()));
        }

        let mut attributes = Vec::new();
        let mut offset = 0;
        while offset < body.len() {
            let (attribute, consumed) = Attribute::decode(&body[offset..], offset)?;
            if attribute.kind().is_none() && !AttributeType::is_skippable(attribute.attr_type) {
                return Err(EapError::UnsupportedAttribute(attribute.attr_type));
            }
            attributes.push(attribute);
            offset += consumed;
        }

        Ok(AkaMessage {
            code: packet.code,
            identifier: packet.identifier,
            method,
            subtype,
            attributes,
        })
    }

    /// Build the EAP packet carrying this message
    pub fn to_eap(&self) -> EapPacket {
        let mut data = Vec::with_capacity(Self::BODY_HEADER_LENGTH + self.attributes_length());
        data.push(self.subtype.as_u8());
        data.extend_from_slice(&[0, 0]); // Reserved
        for attribute in &self.attributes {
            data.extend_from_slice(&attribute.encode());
        }
        EapPacket::new(self.code, self.identifier, Some(self.method.eap_type()), data)
    }

    /// Serialize straight to wire bytes
    pub fn encode(&self) -> Vec<u8> {
        self.to_eap().to_bytes()
    }

    fn attributes_length(&self) -> usize {
        self.attributes.iter().map(Attribute::encoded_length).sum()
    }

    /// First attribute of the given type
    pub fn find(&self, attr_type: AttributeType) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|attr| attr.attr_type == attr_type.as_u8())
    }

    /// First attribute of the given type, or an error naming it
    pub fn require(&self, attr_type: AttributeType) -> Result<&Attribute, EapError> {
        self.find(attr_type).ok_or(EapError::InvalidAttribute {
            attr_type: attr_type.as_u8(),
            reason: "missing",
        })
    }

    /// AT_MAC value, if present and well formed
    pub fn mac(&self) -> Option<[u8; 16]> {
        self.find(AttributeType::Mac).and_then(|attr| attr.as_block().ok())
    }

    /// Bytes the MAC covers: the whole EAP packet with the AT_MAC value zeroed
    fn mac_input(&self) -> Option<Vec<u8>> {
        let mut zeroed = self.clone();
        let slot = zeroed
            .attributes
            .iter_mut()
            .find(|attr| attr.attr_type == AttributeType::Mac.as_u8())?;
        *slot = Attribute::zero_mac();
        Some(zeroed.encode())
    }

    /// Fill in AT_MAC, which must already be present
    pub fn sign(&mut self, k_aut: &[u8]) -> Result<(), EapError> {
        let input = self.mac_input().ok_or(EapError::InvalidAttribute {
            attr_type: AttributeType::Mac.as_u8(),
            reason: "missing",
        })?;
        let mac = compute_mac(self.method, k_aut, &input);
        if let Some(slot) = self
            .attributes
            .iter_mut()
            .find(|attr| attr.attr_type == AttributeType::Mac.as_u8())
        {
            *slot = Attribute::mac(&mac);
        }
        Ok(())
    }

    /// Check AT_MAC against `k_aut`; false when absent or malformed
    pub fn verify_mac(&self, k_aut: &[u8]) -> bool {
        let (Some(received), Some(input)) = (self.mac(), self.mac_input()) else {
            return false;
        };
        let expected = compute_mac(self.method, k_aut, &input);
        verify_equal(&expected, &received)
    }
}

/// AKA-Identity request asking for the permanent identity
pub fn identity_request(identifier: u8, method: AkaMethod) -> EapPacket {
    AkaMessage::new(EapCode::Request, identifier, method, Subtype::Identity)
        .with(Attribute::permanent_id_req())
        .to_eap()
}

/// AKA-Notification request carrying only AT_NOTIFICATION
pub fn notification_request(identifier: u8, method: AkaMethod, code: u16) -> EapPacket {
    AkaMessage::new(EapCode::Request, identifier, method, Subtype::Notification)
        .with(Attribute::notification(code))
        .to_eap()
}

/// AKA-Challenge request: AT_RAND, AT_AUTN, [AT_KDF_INPUT, AT_KDF,] AT_MAC
///
/// `kdf_input` is the access network name and is required for AKA'.
pub fn challenge_request(
    identifier: u8,
    method: AkaMethod,
    rand: &[u8; 16],
    autn: &[u8; 16],
    kdf_input: Option<&str>,
    k_aut: &[u8],
) -> Result<EapPacket, EapError> {
    let mut message = AkaMessage::new(EapCode::Request, identifier, method, Subtype::Challenge)
        .with(Attribute::rand(rand))
        .with(Attribute::autn(autn));

    if method == AkaMethod::AkaPrime {
        let network_name = kdf_input.ok_or(EapError::InvalidAttribute {
            attr_type: AttributeType::KdfInput.as_u8(),
            reason: "missing",
        })?;
        message = message
            .with(Attribute::kdf_input(network_name)?)
            .with(Attribute::kdf(KDF_AKA_PRIME_SHA256));
    }

    message = message.with(Attribute::zero_mac());
    message.sign(k_aut)?;
    Ok(message.to_eap())
}

/// AKA-Identity response carrying AT_IDENTITY
pub fn identity_response(
    identifier: u8,
    method: AkaMethod,
    identity: &str,
) -> Result<EapPacket, EapError> {
    Ok(
        AkaMessage::new(EapCode::Response, identifier, method, Subtype::Identity)
            .with(Attribute::identity(identity)?)
            .to_eap(),
    )
}

/// AKA-Challenge response: AT_RES, AT_MAC
pub fn challenge_response(
    identifier: u8,
    method: AkaMethod,
    res: &[u8],
    k_aut: &[u8],
) -> Result<EapPacket, EapError> {
    let mut message = AkaMessage::new(EapCode::Response, identifier, method, Subtype::Challenge)
        .with(Attribute::res(res)?)
        .with(Attribute::zero_mac());
    message.sign(k_aut)?;
    Ok(message.to_eap())
}

/// AKA-Notification response to a notification sent before the challenge
pub fn notification_response(identifier: u8, method: AkaMethod) -> EapPacket {
    AkaMessage::new(EapCode::Response, identifier, method, Subtype::Notification).to_eap()
}

/// AKA-Synchronization-Failure response carrying AT_AUTS
pub fn synchronization_failure(identifier: u8, method: AkaMethod, auts: &[u8; 14]) -> EapPacket {
    AkaMessage::new(
        EapCode::Response,
        identifier,
        method,
        Subtype::SynchronizationFailure,
    )
    .with(Attribute::auts(auts))
    .to_eap()
}

/// AKA-Authentication-Reject response
pub fn authentication_reject(identifier: u8, method: AkaMethod) -> EapPacket {
    AkaMessage::new(
        EapCode::Response,
        identifier,
        method,
        Subtype::AuthenticationReject,
    )
    .to_eap()
}

/// AKA-Client-Error response
pub fn client_error(identifier: u8, method: AkaMethod, code: u16) -> EapPacket {
    AkaMessage::new(EapCode::Response, identifier, method, Subtype::ClientError)
        .with(Attribute::client_error_code(code))
        .to_eap()
}
