//! Mailbox collaborator seams.
//!
//! The triage core stays protocol-agnostic: fetching messages and applying
//! labels happen behind traits, and the raw message shape is converted to an
//! [`EmailRecord`] exactly once, here. Protocol and OAuth plumbing belong to
//! whichever collaborator implements the traits.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{domain_of, parse_sender, CategoryTag, EmailRecord};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Mailbox transport: {0}")]
    Transport(String),

    #[error("Mailbox authentication failed: {0}")]
    Auth(String),

    #[error("Malformed message {0}")]
    Malformed(String),
}

/// Message-fetching collaborator.
pub trait MailFetch {
    /// Fetch up to `max_results` messages matching `query`, already converted
    /// to records (via [`RawMessage::into_record`]).
    fn fetch(&self, query: &str, max_results: usize) -> Result<Vec<EmailRecord>, FetchError>;
}

/// External label-application collaborator. Wire names for the labels come
/// from [`CategoryTag::as_wire`].
pub trait LabelApply {
    fn apply_label(&self, message_id: &str, tag: CategoryTag) -> Result<(), FetchError>;
}

// ============================================================================
// Raw message conversion
// ============================================================================

/// A message as a fetching collaborator hands it over: raw header values,
/// nothing derived yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: String,
    /// Raw From header, e.g. `"Dr. X <x@dept.edu>"`.
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub subject: String,
    /// Raw Date header (RFC 2822 in the common case).
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub attachment_names: Vec<String>,
    #[serde(default)]
    pub mime_types: Vec<String>,
    #[serde(default)]
    pub body_plain: String,
    #[serde(default)]
    pub body_html: String,
}

impl RawMessage {
    /// Derive the record fields from the raw headers. This is the only place
    /// sender name/address/domain and the normalized timestamp are computed;
    /// everything downstream trusts the derived fields.
    pub fn into_record(self) -> EmailRecord {
        let (sender_name, sender_address) = parse_sender(&self.from);
        let sender_domain = domain_of(&sender_address);
        let received_at = normalize_date(&self.date);

        let mut record = EmailRecord {
            id: self.id,
            sender: self.from,
            sender_name,
            sender_address,
            sender_domain,
            subject: self.subject,
            received_at,
            attachment_names: self.attachment_names,
            mime_types: self.mime_types,
            body_plain: self.body_plain,
            body_html: self.body_html,
            ..Default::default()
        };
        record.normalize();
        record
    }
}

/// RFC 2822 date header to RFC 3339. An unparseable header is kept verbatim
/// rather than dropped, so the original evidence survives in the store.
fn normalize_date(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    match chrono::DateTime::parse_from_rfc2822(trimmed) {
        Ok(dt) => dt.to_rfc3339(),
        Err(e) => {
            log::debug!("unparseable date header {:?}: {}", trimmed, e);
            trimmed.to_string()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
