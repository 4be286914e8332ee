//! Integrity hashing for audit records
//!
//! This module provides:
//! - Canonical JSON encoding (JCS: sorted keys, no whitespace, decimals as strings)
//! - SHA-256 record digests, hex encoded
//! - Content digests for storing payloads by fingerprint

use crate::{types::AuditRecord, Result};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Field excluded from the record digest
const HASH_FIELD: &str = "integrity_hash";

/// Hash arbitrary bytes using SHA-256
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hex SHA-256 of a UTF-8 string
pub fn digest_text(text: &str) -> String {
    hex::encode(hash_bytes(text.as_bytes()))
}

/// Canonical JSON bytes of a value (RFC 8785)
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_jcs::to_vec(value)?)
}

/// Digest over every field of the record except `integrity_hash`
pub fn record_hash(record: &AuditRecord) -> Result<String> {
    let mut value = serde_json::to_value(record)?;
    if let Value::Object(map) = &mut value {
        map.remove(HASH_FIELD);
    }

    Ok(hex::encode(hash_bytes(&canonical_json(&value)?)))
}
