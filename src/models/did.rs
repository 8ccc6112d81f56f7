// src/models/did.rs
//! Decentralized Identifier (DID) value type.
//!
//! Issuers are published under a DID following the
//! [DID Core Specification](https://www.w3.org/TR/did-core/) syntax:
//! ```text
//! did:<method>:<method-specific-id>
//! ```
//! Only the syntax is checked here; resolution of DID documents belongs to
//! the issuer's own infrastructure.

use crate::error::CredentialError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A syntactically valid DID string.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    /// Parses and validates a DID.
    ///
    /// # Errors
    /// Returns [`CredentialError::InvalidDid`] if:
    /// - the `did:` scheme prefix is missing
    /// - the method name is empty or not lowercase alphanumeric
    /// - the method-specific id is empty or contains whitespace
    pub fn parse(raw: &str) -> Result<Self, CredentialError> {
        let invalid = || CredentialError::InvalidDid(raw.to_string());
        let rest = raw.strip_prefix("did:").ok_or_else(invalid)?;
        let (method, id) = rest.split_once(':').ok_or_else(invalid)?;

        let method_ok = !method.is_empty()
            && method
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        let id_ok = !id.is_empty() && !id.chars().any(char::is_whitespace);
        if !method_ok || !id_ok {
            return Err(invalid());
        }
        Ok(Did(raw.to_string()))
    }

    /// The DID method, e.g. `web` for `did:web:example.org`.
    pub fn method(&self) -> &str {
        self.0[4..].split(':').next().unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Did {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Did::parse(s)
    }
}

impl TryFrom<String> for Did {
    type Error = CredentialError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Did::parse(&value)
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_valid_dids() {
        let did = Did::parse("did:web:university.example").unwrap();
        assert_eq!(did.method(), "web");
        assert_eq!(did.to_string(), "did:web:university.example");
        assert!(Did::parse("did:key:z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK").is_ok());
        assert!(Did::parse("did:ethr:0x5:0xabc").is_ok());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in ["", "did:", "did:web", "did::abc", "web:abc", "did:Web:abc", "did:web:a b"] {
            let err = Did::parse(raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput, "{raw}");
        }
    }

    #[test]
    fn test_serde_validates() {
        assert!(serde_json::from_str::<Did>("\"did:web:ok\"").is_ok());
        assert!(serde_json::from_str::<Did>("\"not-a-did\"").is_err());
    }
}
