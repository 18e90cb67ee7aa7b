use crate::eap::EapError;

/// EAP-AKA / EAP-AKA' attribute types (RFC 4187 Section 11, RFC 5448)
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AttributeType {
    /// AT_RAND (1)
    Rand = 1,
    /// AT_AUTN (2)
    Autn = 2,
    /// AT_RES (3)
    Res = 3,
    /// AT_AUTS (4)
    Auts = 4,
    /// AT_PADDING (6)
    Padding = 6,
    /// AT_PERMANENT_ID_REQ (10)
    PermanentIdReq = 10,
    /// AT_MAC (11)
    Mac = 11,
    /// AT_NOTIFICATION (12)
    Notification = 12,
    /// AT_ANY_ID_REQ (13)
    AnyIdReq = 13,
    /// AT_IDENTITY (14)
    Identity = 14,
    /// AT_FULLAUTH_ID_REQ (17)
    FullauthIdReq = 17,
    /// AT_CLIENT_ERROR_CODE (22)
    ClientErrorCode = 22,
    /// AT_KDF_INPUT (23), AKA' only
    KdfInput = 23,
    /// AT_KDF (24), AKA' only
    Kdf = 24,
    /// AT_CHECKCODE (134)
    Checkcode = 134,
    /// AT_RESULT_IND (135)
    ResultInd = 135,
}

impl AttributeType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(AttributeType::Rand),
            2 => Some(AttributeType::Autn),
            3 => Some(AttributeType::Res),
            4 => Some(AttributeType::Auts),
            6 => Some(AttributeType::Padding),
            10 => Some(AttributeType::PermanentIdReq),
            11 => Some(AttributeType::Mac),
            12 => Some(AttributeType::Notification),
            13 => Some(AttributeType::AnyIdReq),
            14 => Some(AttributeType::Identity),
            17 => Some(AttributeType::FullauthIdReq),
            22 => Some(AttributeType::ClientErrorCode),
            23 => Some(AttributeType::KdfInput),
            24 => Some(AttributeType::Kdf),
            134 => Some(AttributeType::Checkcode),
            135 => Some(AttributeType::ResultInd),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Attributes numbered 128-255 may be ignored by a receiver that does
    /// not recognise them (RFC 4187 Section 8.1)
    pub fn is_skippable(raw: u8) -> bool {
        raw >= 128
    }
}

/// EAP-AKA attribute as defined in RFC 4187 Section 8.1
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Attribute Type|    Length     | Value...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Length counts 4-byte words and includes the Type and Length octets.
/// `value` holds everything after the Length octet, including any
/// Reserved field or inner length prefix, so every attribute built here
/// re-encodes to exactly the bytes it was decoded from.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Raw attribute type (unknown skippable types are carried as-is)
    pub attr_type: u8,
    /// Attribute value, excluding the Type and Length octets
    pub value: Vec<u8>,
}

impl Attribute {
    /// Type and Length octets
    pub const HEADER_LENGTH: usize = 2;
    /// Largest attribute the one-octet Length field can describe
    pub const MAX_LENGTH: usize = 255 * 4;
    /// Length of AT_RAND, AT_AUTN and AT_MAC payloads
    pub const BLOCK_LENGTH: usize = 16;
    /// Length of the AT_AUTS payload
    pub const AUTS_LENGTH: usize = 14;

    /// Create an attribute from a raw value
    ///
    /// The value must bring the attribute to a multiple of 4 bytes.
    pub fn new(attr_type: u8, value: Vec<u8>) -> Result<Self, EapError> {
        let total = Self::HEADER_LENGTH + value.len();
        if total % 4 != 0 {
            return Err(EapError::InvalidAttribute {
                attr_type,
                reason: "length is not a multiple of 4",
            });
        }
        if total > Self::MAX_LENGTH {
            return Err(EapError::InvalidAttribute {
                attr_type,
                reason: "value too long",
            });
        }
        Ok(Attribute { attr_type, value })
    }

    fn reserved_block(attr_type: AttributeType, block: &[u8; 16]) -> Self {
        let mut value = Vec::with_capacity(2 + Self::BLOCK_LENGTH);
        value.extend_from_slice(&[0, 0]); // Reserved
        value.extend_from_slice(block);
        Attribute {
            attr_type: attr_type.as_u8(),
            value,
        }
    }

    fn flag(attr_type: AttributeType) -> Self {
        Attribute {
            attr_type: attr_type.as_u8(),
            value: vec![0, 0],
        }
    }

    fn short(attr_type: AttributeType, value: u16) -> Self {
        Attribute {
            attr_type: attr_type.as_u8(),
            value: value.to_be_bytes().to_vec(),
        }
    }

    /// Value prefixed by its length (in `unit`s), padded to a 4-byte boundary
    fn length_prefixed(
        attr_type: AttributeType,
        data: &[u8],
        prefix: usize,
    ) -> Result<Self, EapError> {
        let prefix = u16::try_from(prefix).map_err(|_| EapError::InvalidAttribute {
            attr_type: attr_type.as_u8(),
            reason: "value too long",
        })?;
        let padded = (data.len() + 3) & !3;
        let mut value = Vec::with_capacity(2 + padded);
        value.extend_from_slice(&prefix.to_be_bytes());
        value.extend_from_slice(data);
        value.resize(2 + padded, 0);
        Self::new(attr_type.as_u8(), value)
    }

    /// AT_RAND
    pub fn rand(rand: &[u8; 16]) -> Self {
        Self::reserved_block(AttributeType::Rand, rand)
    }

    /// AT_AUTN
    pub fn autn(autn: &[u8; 16]) -> Self {
        Self::reserved_block(AttributeType::Autn, autn)
    }

    /// AT_MAC
    pub fn mac(mac: &[u8; 16]) -> Self {
        Self::reserved_block(AttributeType::Mac, mac)
    }

    /// AT_MAC with an all-zero value, as used while computing the MAC
    pub fn zero_mac() -> Self {
        Self::mac(&[0u8; 16])
    }

    /// AT_RES, length-prefixed in bits
    pub fn res(res: &[u8]) -> Result<Self, EapError> {
        Self::length_prefixed(AttributeType::Res, res, res.len() * 8)
    }

    /// AT_AUTS
    pub fn auts(auts: &[u8; 14]) -> Self {
        Attribute {
            attr_type: AttributeType::Auts.as_u8(),
            value: auts.to_vec(),
        }
    }

    /// AT_IDENTITY, length-prefixed in bytes
    pub fn identity(identity: &str) -> Result<Self, EapError> {
        Self::length_prefixed(AttributeType::Identity, identity.as_bytes(), identity.len())
    }

    /// AT_KDF_INPUT carrying the access network name
    pub fn kdf_input(network_name: &str) -> Result<Self, EapError> {
        Self::length_prefixed(
            AttributeType::KdfInput,
            network_name.as_bytes(),
            network_name.len(),
        )
    }

    /// AT_KDF
    pub fn kdf(kdf: u16) -> Self {
        Self::short(AttributeType::Kdf, kdf)
    }

    /// AT_PERMANENT_ID_REQ
    pub fn permanent_id_req() -> Self {
        Self::flag(AttributeType::PermanentIdReq)
    }

    /// AT_ANY_ID_REQ
    pub fn any_id_req() -> Self {
        Self::flag(AttributeType::AnyIdReq)
    }

    /// AT_FULLAUTH_ID_REQ
    pub fn fullauth_id_req() -> Self {
        Self::flag(AttributeType::FullauthIdReq)
    }

    /// AT_RESULT_IND
    pub fn result_ind() -> Self {
        Self::flag(AttributeType::ResultInd)
    }

    /// AT_NOTIFICATION
    pub fn notification(code: u16) -> Self {
        Self::short(AttributeType::Notification, code)
    }

    /// AT_CLIENT_ERROR_CODE
    pub fn client_error_code(code: u16) -> Self {
        Self::short(AttributeType::ClientErrorCode, code)
    }

    /// Known attribute type, if any
    pub fn kind(&self) -> Option<AttributeType> {
        AttributeType::from_u8(self.attr_type)
    }

    /// Encode attribute to bytes
    pub fn encode(&self) -> Vec<u8> {
        let length = self.encoded_length();
        let mut buffer = Vec::with_capacity(length);
        buffer.push(self.attr_type);
        buffer.push((length / 4) as u8);
        buffer.extend_from_slice(&self.value);
        buffer
    }

    /// Decode one attribute from the start of `data`
    ///
    /// Returns the attribute and the number of bytes it occupied.
    pub fn decode(data: &[u8], offset: usize) -> Result<(Self, usize), EapError> {
        if data.len() < Self::HEADER_LENGTH {
            let attr_type = data.first().copied().unwrap_or(0);
            return Err(EapError::AttributeOverrun { attr_type, offset });
        }

        let attr_type = data[0];
        let length = data[1] as usize * 4;
        if length == 0 {
            return Err(EapError::ZeroLengthAttribute(attr_type));
        }
        if data.len() < length {
            return Err(EapError::AttributeOverrun { attr_type, offset });
        }

        let attribute = Attribute {
            attr_type,
            value: data[Self::HEADER_LENGTH..length].to_vec(),
        };
        Ok((attribute, length))
    }

    /// Get the encoded length of this attribute
    pub fn encoded_length(&self) -> usize {
        Self::HEADER_LENGTH + self.value.len()
    }

    fn invalid(&self, reason: &'static str) -> EapError {
        EapError::InvalidAttribute {
            attr_type: self.attr_type,
            reason,
        }
    }

    /// 16-byte payload after the Reserved field (AT_RAND, AT_AUTN, AT_MAC)
    pub fn as_block(&self) -> Result<[u8; 16], EapError> {
        if self.value.len() != 2 + Self::BLOCK_LENGTH {
            return Err(self.invalid("expected a 16-byte value"));
        }
        let mut block = [0u8; 16];
        block.copy_from_slice(&self.value[2..]);
        Ok(block)
    }

    /// AT_AUTS payload
    pub fn as_auts(&self) -> Result<[u8; 14], EapError> {
        if self.value.len() != Self::AUTS_LENGTH {
            return Err(self.invalid("expected a 14-byte value"));
        }
        let mut auts = [0u8; 14];
        auts.copy_from_slice(&self.value);
        Ok(auts)
    }

    /// 2-byte value (AT_NOTIFICATION, AT_CLIENT_ERROR_CODE, AT_KDF)
    pub fn as_u16(&self) -> Result<u16, EapError> {
        if self.value.len() != 2 {
            return Err(self.invalid("expected a 2-byte value"));
        }
        Ok(u16::from_be_bytes([self.value[0], self.value[1]]))
    }

    fn prefixed_bytes(&self, byte_len: usize) -> Result<&[u8], EapError> {
        if self.value.len() < 2 + byte_len {
            return Err(self.invalid("inner length exceeds attribute"));
        }
        Ok(&self.value[2..2 + byte_len])
    }

    fn prefix(&self) -> Result<usize, EapError> {
        if self.value.len() < 2 {
            return Err(self.invalid("missing length prefix"));
        }
        Ok(u16::from_be_bytes([self.value[0], self.value[1]]) as usize)
    }

    /// AT_RES payload, trimmed to its declared bit length
    pub fn as_res(&self) -> Result<Vec<u8>, EapError> {
        let bits = self.prefix()?;
        Ok(self.prefixed_bytes(bits.div_ceil(8))?.to_vec())
    }

    /// AT_IDENTITY or AT_KDF_INPUT payload
    pub fn as_string(&self) -> Result<String, EapError> {
        let len = self.prefix()?;
        let bytes = self.prefixed_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| self.invalid("value is not UTF-8"))
    }
}
