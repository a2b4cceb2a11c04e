//! Attachment safety checks with a persistent verdict cache.
//!
//! Three deterministic heuristics, evaluated in order: a disguised
//! double extension (`report.pdf.exe`), an executable-like extension, and a
//! declared-MIME mismatch against the known extension map. The cache is
//! keyed by exact `(message id, filename)` and is purely a performance
//! optimization — a lost or corrupt cache file means recomputation, never a
//! wrong verdict.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::EmailRecord;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outcome of one attachment check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub safe: bool,
    pub reason: String,
}

impl Verdict {
    fn safe(reason: impl Into<String>) -> Verdict {
        Verdict {
            safe: true,
            reason: reason.into(),
        }
    }

    fn unsafe_because(reason: impl Into<String>) -> Verdict {
        Verdict {
            safe: false,
            reason: reason.into(),
        }
    }
}

/// Executable-like suffixes that are flagged outright.
const DANGEROUS_EXTENSIONS: [&str; 18] = [
    "exe", "bat", "cmd", "com", "scr", "pif", "msi", "js", "jse", "vbs", "vbe", "wsf", "ps1",
    "jar", "hta", "cpl", "lnk", "reg",
];

/// Document-like extensions used by the double-extension heuristic.
const DOCUMENT_EXTENSIONS: [&str; 15] = [
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "rtf", "odt", "jpg", "jpeg",
    "png", "zip", "csv",
];

/// Known extension → acceptable declared MIME types.
const EXTENSION_MIME_MAP: [(&str, &[&str]); 12] = [
    ("pdf", &["application/pdf"]),
    ("doc", &["application/msword"]),
    (
        "docx",
        &["application/vnd.openxmlformats-officedocument.wordprocessingml.document"],
    ),
    ("xls", &["application/vnd.ms-excel"]),
    (
        "xlsx",
        &["application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"],
    ),
    ("ppt", &["application/vnd.ms-powerpoint"]),
    (
        "pptx",
        &["application/vnd.openxmlformats-officedocument.presentationml.presentation"],
    ),
    ("txt", &["text/plain"]),
    ("jpg", &["image/jpeg"]),
    ("jpeg", &["image/jpeg"]),
    ("png", &["image/png"]),
    ("zip", &["application/zip", "application/x-zip-compressed"]),
];

/// Evaluate one attachment. Deterministic: the same filename and declared
/// type always produce the same verdict.
pub fn check_attachment(filename: &str, declared_mime: Option<&str>) -> Verdict {
    let filename = filename.trim();
    if filename.is_empty() {
        return Verdict::safe("no attachment data");
    }

    let parts: Vec<String> = filename.split('.').map(|p| p.to_lowercase()).collect();
    if parts.len() < 2 || parts.last().is_some_and(|e| e.is_empty()) {
        return Verdict::unsafe_because("no file extension");
    }
    let ext = parts.last().map(String::as_str).unwrap_or_default().to_string();

    // Double-extension disguise: a document-like extension immediately
    // followed by a further extension ("report.pdf.exe").
    for i in 1..parts.len().saturating_sub(1) {
        if DOCUMENT_EXTENSIONS.contains(&parts[i].as_str()) {
            return Verdict::unsafe_because(format!(
                "disguised extension: .{} followed by .{}",
                parts[i],
                parts[i + 1]
            ));
        }
    }

    if DANGEROUS_EXTENSIONS.contains(&ext.as_str()) {
        return Verdict::unsafe_because(format!("dangerous extension: .{}", ext));
    }

    let expected = EXTENSION_MIME_MAP
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mimes)| *mimes);
    let Some(expected) = expected else {
        return Verdict::safe(format!("unknown extension: .{}", ext));
    };

    match declared_mime.map(str::trim).filter(|m| !m.is_empty() && *m != "unknown") {
        Some(mime) if !expected.contains(&mime) => Verdict::unsafe_because(format!(
            "declared type mismatch: .{} file but {}",
            ext, mime
        )),
        _ => Verdict::safe("ok"),
    }
}

// ============================================================================
// Verdict cache
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedVerdict {
    pub safe: bool,
    pub reason: String,
    pub checked_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub total: usize,
    pub safe: usize,
    pub suspicious: usize,
}

/// JSON-file cache of verdicts, keyed `"<message_id>:<filename>"`.
pub struct AttachmentCache {
    path: PathBuf,
    entries: HashMap<String, CachedVerdict>,
}

impl AttachmentCache {
    /// Open the cache at `path`. A missing or corrupt file starts empty —
    /// verdicts are recomputed, nothing fails.
    pub fn open(path: impl Into<PathBuf>) -> AttachmentCache {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(map) => map,
                Err(e) => {
                    log::warn!("attachment cache {} corrupt ({}), starting empty", path.display(), e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        AttachmentCache { path, entries }
    }

    fn key(message_id: &str, filename: &str) -> String {
        format!("{}:{}", message_id, filename)
    }

    /// Cached verdict for an exact `(message id, filename)` pair, if any.
    pub fn get(&self, message_id: &str, filename: &str) -> Option<&CachedVerdict> {
        self.entries.get(&Self::key(message_id, filename))
    }

    /// Cache-first check: return the stored verdict on a hit, otherwise
    /// compute, store, and persist. A failed cache write is logged and does
    /// not affect the verdict.
    pub fn check(&mut self, message_id: &str, filename: &str, declared_mime: Option<&str>) -> Verdict {
        let key = Self::key(message_id, filename);
        if let Some(hit) = self.entries.get(&key) {
            return Verdict {
                safe: hit.safe,
                reason: hit.reason.clone(),
            };
        }

        let verdict = check_attachment(filename, declared_mime);
        self.entries.insert(
            key,
            CachedVerdict {
                safe: verdict.safe,
                reason: verdict.reason.clone(),
                checked_at: chrono::Utc::now().to_rfc3339(),
            },
        );
        if let Err(e) = self.persist() {
            log::warn!("failed to persist attachment cache: {}", e);
        }
        verdict
    }

    fn persist(&self) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn clear(&mut self) -> Result<(), CacheError> {
        self.entries.clear();
        self.persist()
    }

    pub fn stats(&self) -> CacheStats {
        let safe = self.entries.values().filter(|v| v.safe).count();
        CacheStats {
            total: self.entries.len(),
            safe,
            suspicious: self.entries.len() - safe,
        }
    }
}

// ============================================================================
// Batch audit
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct AuditFinding {
    pub message_id: String,
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct AuditReport {
    pub total_checked: usize,
    pub suspicious: Vec<AuditFinding>,
}

/// Sweep every attachment of every message through the cache-backed check.
pub fn audit_batch(emails: &[EmailRecord], cache: &mut AttachmentCache) -> AuditReport {
    let mut report = AuditReport::default();
    for email in emails {
        for (i, filename) in email.attachment_names.iter().enumerate() {
            let mime = email.mime_types.get(i).map(String::as_str);
            let verdict = cache.check(&email.id, filename, mime);
            report.total_checked += 1;
            if !verdict.safe {
                report.suspicious.push(AuditFinding {
                    message_id: email.id.clone(),
                    filename: filename.clone(),
                    reason: verdict.reason,
                });
            }
        }
    }
    report
}

// ============================================================================
// Tests
// ============================================================================
