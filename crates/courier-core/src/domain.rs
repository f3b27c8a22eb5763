use std::{fmt, str::FromStr};

use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{errors::Error, Result};

/// Addressing suffix for individual chats.
pub const USER_DOMAIN: &str = "s.whatsapp.net";
/// Addressing suffix for group chats.
pub const GROUP_DOMAIN: &str = "g.us";

/// Sender identity: a phone-number-like key, digits only.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Normalize raw user input (`+1 (555) 123-4567` -> `15551234567`).
    pub fn parse(raw: &str, min_digits: usize) -> Result<Self> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Err(Error::InvalidIdentity(
                "a phone number with country code is required".to_string(),
            ));
        }
        if digits.len() < min_digits {
            return Err(Error::InvalidIdentity(format!(
                "{digits} is shorter than {min_digits} digits"
            )));
        }
        Ok(Self(digits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bulk-send task id: 128 bits of OS randomness, hex-encoded.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Individual,
    Group,
}

impl TargetKind {
    fn domain(self) -> &'static str {
        match self {
            TargetKind::Individual => USER_DOMAIN,
            TargetKind::Group => GROUP_DOMAIN,
        }
    }
}

impl FromStr for TargetKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "individual" | "user" | "" => Ok(TargetKind::Individual),
            "group" => Ok(TargetKind::Group),
            other => Err(Error::InvalidRequest(format!("unknown target type `{other}`"))),
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Individual => f.write_str("individual"),
            TargetKind::Group => f.write_str("group"),
        }
    }
}

/// Format a target into the transport's addressing form.
///
/// Already fully-qualified targets (containing `@`) pass through untouched.
pub fn format_target(target: &str, kind: TargetKind) -> String {
    let target = target.trim();
    if target.contains('@') {
        return target.to_string();
    }
    format!("{target}@{}", kind.domain())
}

/// Address of one contact-list entry, or `None` when the entry has no digits.
///
/// Entries that are already fully qualified pass through. Otherwise every
/// non-digit is stripped and `country_code` is prefixed unless the number
/// already starts with it.
pub fn contact_address(raw: &str, country_code: Option<&str>) -> Option<String> {
    let raw = raw.trim();
    if raw.contains('@') {
        return Some(raw.to_string());
    }
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let number = match country_code {
        Some(code) if !digits.starts_with(code) => format!("{code}{digits}"),
        _ => digits,
    };
    Some(format!("{number}@{USER_DOMAIN}"))
}

/// A group the sender participates in, as reported by the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GroupInfo {
    pub name: String,
    pub id: String,
}

impl GroupInfo {
    /// Group id without the addressing suffix (what callers pass back as a target).
    pub fn short_id(&self) -> &str {
        self.id.split('@').next().unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_strips_formatting() {
        let id = Identity::parse("+1 (555) 123-4567", 10).unwrap();
        assert_eq!(id.as_str(), "15551234567");
    }

    #[test]
    fn identity_rejects_empty_and_short_numbers() {
        assert!(matches!(
            Identity::parse("abc", 10),
            Err(Error::InvalidIdentity(_))
        ));
        assert!(matches!(
            Identity::parse("12345", 10),
            Err(Error::InvalidIdentity(_))
        ));
        assert!(Identity::parse("12345", 5).is_ok());
    }

    #[test]
    fn task_ids_are_128_bit_hex_and_distinct() {
        let a = TaskId::generate();
        let b = TaskId::generate();
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn format_target_appends_domain_by_kind() {
        assert_eq!(
            format_target("15559998888", TargetKind::Individual),
            "15559998888@s.whatsapp.net"
        );
        assert_eq!(
            format_target("120363021234567890", TargetKind::Group),
            "120363021234567890@g.us"
        );
        assert_eq!(
            format_target("1203@g.us", TargetKind::Individual),
            "1203@g.us"
        );
    }

    #[test]
    fn target_kind_parses_case_insensitively() {
        assert_eq!("Group".parse::<TargetKind>().unwrap(), TargetKind::Group);
        assert_eq!(
            "individual".parse::<TargetKind>().unwrap(),
            TargetKind::Individual
        );
        assert!("channel".parse::<TargetKind>().is_err());
    }

    #[test]
    fn contact_address_normalizes_and_prefixes_country_code() {
        assert_eq!(
            contact_address(" 98765-43210 ", Some("91")).as_deref(),
            Some("919876543210@s.whatsapp.net")
        );
        assert_eq!(
            contact_address("919876543210", Some("91")).as_deref(),
            Some("919876543210@s.whatsapp.net")
        );
        assert_eq!(
            contact_address("+1 555 123 4567", None).as_deref(),
            Some("15551234567@s.whatsapp.net")
        );
        assert_eq!(
            contact_address("1203@g.us", Some("91")).as_deref(),
            Some("1203@g.us")
        );
        assert_eq!(contact_address("Alice", Some("91")), None);
    }

    #[test]
    fn group_short_id_drops_suffix() {
        let g = GroupInfo {
            name: "Family".to_string(),
            id: "1203@g.us".to_string(),
        };
        assert_eq!(g.short_id(), "1203");
    }
}
