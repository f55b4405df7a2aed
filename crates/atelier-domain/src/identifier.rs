//! Login identifiers: an E.164 phone number or a lowercased email address.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Longest address accepted (RFC 5321 path limit).
const MAX_EMAIL_LEN: usize = 254;
const MAX_LOCAL_PART_LEN: usize = 64;

/// E.164 allows at most 15 digits; shorter than 7 is never a routable subscriber number.
const MIN_PHONE_DIGITS: usize = 7;
const MAX_PHONE_DIGITS: usize = 15;

/// Which channel an identifier is reached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    Phone,
    Email,
}

impl IdentifierKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::Email => "email",
        }
    }

    /// Parse the stored wire value. Returns `None` for unknown values.
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "phone" => Some(Self::Phone),
            "email" => Some(Self::Email),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,
    #[error("malformed email address")]
    MalformedEmail,
    #[error("phone number must be in international format (+<country><number>)")]
    MalformedPhone,
}

/// A validated, normalized login identifier.
///
/// Normalization makes the value usable as a unique key: phone numbers are reduced to
/// `+` followed by digits, email addresses are trimmed and lowercased.
///
/// ```
/// use atelier_domain::identifier::{Identifier, IdentifierKind};
///
/// let phone: Identifier = "+91 12345-67890".parse().unwrap();
/// assert_eq!(phone.as_str(), "+911234567890");
/// assert_eq!(phone.kind(), IdentifierKind::Phone);
///
/// let email: Identifier = " User@Example.COM ".parse().unwrap();
/// assert_eq!(email.as_str(), "user@example.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier {
    kind: IdentifierKind,
    value: String,
}

impl Identifier {
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IdentifierError::Empty);
        }
        if trimmed.contains('@') {
            normalize_email(trimmed).map(|value| Self {
                kind: IdentifierKind::Email,
                value,
            })
        } else {
            normalize_phone(trimmed).map(|value| Self {
                kind: IdentifierKind::Phone,
                value,
            })
        }
    }

    pub fn kind(&self) -> IdentifierKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Redacted form for logs: `+91******7890`, `u***@example.com`.
    pub fn masked(&self) -> String {
        match self.kind {
            IdentifierKind::Phone => {
                let digits = &self.value[1..];
                let keep_tail = 4.min(digits.len());
                let keep_head = 2.min(digits.len() - keep_tail);
                let hidden = digits.len() - keep_head - keep_tail;
                format!(
                    "+{}{}{}",
                    &digits[..keep_head],
                    "*".repeat(hidden),
                    &digits[digits.len() - keep_tail..]
                )
            }
            IdentifierKind::Email => {
                let (local, domain) = self
                    .value
                    .split_once('@')
                    .unwrap_or(("", self.value.as_str()));
                let first = local.chars().next().map(String::from).unwrap_or_default();
                format!("{first}***@{domain}")
            }
        }
    }
}

fn normalize_phone(raw: &str) -> Result<String, IdentifierError> {
    let rest = raw.strip_prefix('+').ok_or(IdentifierError::MalformedPhone)?;
    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '(' | ')' | '.' => {}
            _ => return Err(IdentifierError::MalformedPhone),
        }
    }
    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len()) || digits.starts_with('0')
    {
        return Err(IdentifierError::MalformedPhone);
    }
    Ok(format!("+{digits}"))
}

fn normalize_email(raw: &str) -> Result<String, IdentifierError> {
    let value = raw.to_lowercase();
    if value.len() > MAX_EMAIL_LEN {
        return Err(IdentifierError::MalformedEmail);
    }
    let (local, domain) = value
        .split_once('@')
        .ok_or(IdentifierError::MalformedEmail)?;

    let local_ok = !local.is_empty()
        && local.len() <= MAX_LOCAL_PART_LEN
        && !local.starts_with('.')
        && !local.ends_with('.')
        && !local.contains("..")
        && local
            .chars()
            .all(|c| !c.is_whitespace() && !c.is_control() && c != '@');
    if !local_ok {
        return Err(IdentifierError::MalformedEmail);
    }

    let labels: Vec<&str> = domain.split('.').collect();
    let domain_ok = labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_alphanumeric() || c == '-')
        });
    if !domain_ok {
        return Err(IdentifierError::MalformedEmail);
    }

    Ok(value)
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.value
    }
}
