//! PLMN allow-list and permanent identity parsing

use eap_aka_proto::AkaMethod;

/// Accepted home networks, matched as IMSI prefixes
#[derive(Debug, Clone, Default)]
pub struct PlmnFilter {
    plmn_ids: Vec<String>,
}

impl PlmnFilter {
    pub fn new(plmn_ids: Vec<String>) -> Self {
        PlmnFilter { plmn_ids }
    }

    /// Whether the IMSI belongs to an accepted PLMN
    ///
    /// Entries are 5-digit (MCC + 2-digit MNC) or 6-digit (MCC + 3-digit
    /// MNC) prefixes. An empty list accepts every IMSI.
    pub fn accepts(&self, imsi: &str) -> bool {
        self.plmn_ids.is_empty() || self.plmn_ids.iter().any(|plmn| imsi.starts_with(plmn.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.plmn_ids.is_empty()
    }
}

/// Extract the IMSI from a permanent identity (`<prefix><IMSI>@<realm>`)
///
/// Returns `None` unless the identity carries the method's permanent
/// identity prefix followed by 5 to 15 digits.
pub fn imsi_from_identity(identity: &str, method: AkaMethod) -> Option<String> {
    let user = identity.split('@').next().unwrap_or(identity);
    let imsi = user.strip_prefix(method.permanent_identity_prefix())?;
    if (5..=15).contains(&imsi.len()) && imsi.chars().all(|c| c.is_ascii_digit()) {
        Some(imsi.to_string())
    } else {
        None
    }
}
