//! Audit content handling
//!
//! Payloads are passed through a [`Redactor`] before they reach the audit
//! trail. [`AuditContentMode`] then decides whether the record keeps the
//! redacted text or only its SHA-256 digest.

use ledger_core::crypto::digest_text;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Masks sensitive content before it is recorded
pub trait Redactor: Send + Sync {
    /// Redacted form of `text`
    fn redact<'a>(&self, text: &'a str) -> Cow<'a, str>;
}

/// Records content unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRedactor;

impl Redactor for NoopRedactor {
    fn redact<'a>(&self, text: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(text)
    }
}

/// What the audit record stores for input and output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditContentMode {
    /// Redacted text
    #[default]
    Masked,
    /// `sha256:<hex>` of the redacted text
    Digest,
}

impl AuditContentMode {
    /// Text to store for `content`
    pub fn render(&self, redactor: &dyn Redactor, content: &str) -> String {
        let redacted = redactor.redact(content);
        match self {
            AuditContentMode::Masked => redacted.into_owned(),
            AuditContentMode::Digest => format!("sha256:{}", digest_text(&redacted)),
        }
    }
}
