// src/utils/serialization.rs
//! Serialization utilities.
//!
//! Provides:
//! - Canonical byte payloads used for transaction signing
//! - URL-safe base64 wrapping for out-of-band (QR) payloads and proofs

use serde::{de::DeserializeOwned, Serialize};

/// Produces the byte payload that gets signed for a value.
///
/// Round-trips through `serde_json::Value`, whose object maps are ordered by key,
/// so two structurally equal values always yield the same bytes.
pub fn canonical_bytes<T: Serialize>(data: &T) -> Result<Vec<u8>, serde_json::Error> {
    let value = serde_json::to_value(data)?;
    serde_json::to_vec(&value)
}

/// Encodes a value as URL-safe, unpadded base64 JSON.
pub fn encode_compact<T: Serialize>(data: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(data)?;
    Ok(base64::encode_config(json, base64::URL_SAFE_NO_PAD))
}

/// Decodes a value produced by [`encode_compact`].
pub fn decode_compact<T: DeserializeOwned>(data: &str) -> Result<T, String> {
    let bytes = base64::decode_config(data.trim(), base64::URL_SAFE_NO_PAD)
        .map_err(|e| format!("Base64 decoding failed: {}", e))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("Deserialization failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Sample {
        id: String,
        attrs: Vec<String>,
    }

    #[test]
    fn test_canonical_bytes_ignore_insertion_order() {
        let mut a = HashMap::new();
        a.insert("zeta", 1);
        a.insert("alpha", 2);
        let mut b = HashMap::new();
        b.insert("alpha", 2);
        b.insert("zeta", 1);
        assert_eq!(canonical_bytes(&a).unwrap(), canonical_bytes(&b).unwrap());
    }

    #[test]
    fn test_compact_encoding_is_url_safe() {
        let sample = Sample {
            id: "req/with+chars?".into(),
            attrs: vec!["age_over_18".into()],
        };
        let encoded = encode_compact(&sample).unwrap();
        assert!(!encoded.contains('+') && !encoded.contains('/') && !encoded.contains('='));
        let decoded: Sample = decode_compact(&encoded).unwrap();
        assert_eq!(decoded, sample);
    }

    #[test]
    fn test_decode_compact_rejects_garbage() {
        assert!(decode_compact::<Sample>("not base64 !!").is_err());
    }
}
