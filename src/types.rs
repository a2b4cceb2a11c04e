//! Shared types for the triage core.
//!
//! The message record is a concrete struct with defaulted fields rather than
//! a loose key/value map, so a missing field is a compile error at the call
//! site instead of a silent default. Category tags are a closed enum with one
//! canonical wire form; every external spelling (display labels, accented
//! variants from the label service) is normalized at the boundary via
//! [`CategoryTag::from_label`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Wire form of the "not yet categorized" sentinel.
pub const UNCLASSIFIED_SENTINEL: &str = "----";

// ============================================================================
// Category tags
// ============================================================================

/// Closed set of triage categories.
///
/// Declaration order is the rule-priority order: department membership beats
/// leadership membership, which beats the system senders, and the
/// non-institutional fallback comes last before the sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CategoryTag {
    /// Sender belongs to the user's own department.
    Department,
    /// University leadership / heads of other departments.
    Leadership,
    /// Registrar system notifications (Neptun).
    Registrar,
    /// Course system notifications (Moodle).
    Course,
    /// Partner-system notifications (Milt-On).
    Partner,
    /// Non-institutional sender domain, typically student mail.
    NonInstitutional,
    /// Categorized, but fits no specific bucket.
    Other,
    /// Sentinel: not yet categorized.
    Unclassified,
}

impl CategoryTag {
    /// Every real category, in rule-priority declaration order.
    /// The sentinel is deliberately absent: nothing maps *to* unclassified.
    pub const SUGGESTIBLE: [CategoryTag; 7] = [
        CategoryTag::Department,
        CategoryTag::Leadership,
        CategoryTag::Registrar,
        CategoryTag::Course,
        CategoryTag::Partner,
        CategoryTag::NonInstitutional,
        CategoryTag::Other,
    ];

    /// Canonical wire name, used in the persisted CSV and the label service.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Department => "tanszek",
            Self::Leadership => "vezetoseg",
            Self::Registrar => "neptun",
            Self::Course => "moodle",
            Self::Partner => "milt-on",
            Self::NonInstitutional => "hianyos",
            Self::Other => "egyeb",
            Self::Unclassified => UNCLASSIFIED_SENTINEL,
        }
    }

    /// Human-facing display label (accented form shown by the UI collaborator).
    pub fn display_label(&self) -> &'static str {
        match self {
            Self::Department => "Tanszék",
            Self::Leadership => "Vezetőség",
            Self::Registrar => "Neptun",
            Self::Course => "Moodle",
            Self::Partner => "Milt-On",
            Self::NonInstitutional => "Hiányos",
            Self::Other => "Egyéb",
            Self::Unclassified => UNCLASSIFIED_SENTINEL,
        }
    }

    /// Normalize an external label to a tag.
    ///
    /// Accepts the canonical wire names plus the accented display variants the
    /// label service has used over time. Unknown labels return `None` — an
    /// unrecognized external label is never guessed into a category.
    pub fn from_label(label: &str) -> Option<CategoryTag> {
        let norm = label.trim().to_lowercase();
        match norm.as_str() {
            "tanszek" | "tanszék" => Some(Self::Department),
            "vezetoseg" | "vezetőség" => Some(Self::Leadership),
            "neptun" => Some(Self::Registrar),
            "moodle" => Some(Self::Course),
            "milt-on" | "milton" => Some(Self::Partner),
            "hianyos" | "hiányos" => Some(Self::NonInstitutional),
            "egyeb" | "egyéb" => Some(Self::Other),
            UNCLASSIFIED_SENTINEL => Some(Self::Unclassified),
            _ => None,
        }
    }

    pub fn is_unclassified(&self) -> bool {
        matches!(self, Self::Unclassified)
    }
}

impl Default for CategoryTag {
    fn default() -> Self {
        Self::Unclassified
    }
}

// ============================================================================
// Body format
// ============================================================================

/// Format flag for an out-of-band body file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyFormat {
    Html,
    Plain,
    /// No body stored.
    #[default]
    None,
}

impl BodyFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Plain => "plain",
            Self::None => "",
        }
    }

    pub fn parse(s: &str) -> BodyFormat {
        match s.trim() {
            "html" => Self::Html,
            "plain" => Self::Plain,
            _ => Self::None,
        }
    }
}

// ============================================================================
// Message record
// ============================================================================

/// One message in the persisted set.
///
/// Created the first time an id is seen in a fetched batch; mutated by the
/// classifier (`tag`, `matched_rule`), the sync engine (`in_latest_fetch`,
/// content fields), and the AI paths (`tag` override, `ai_summary`). Never
/// deleted — ids that stop appearing in fetches are retained.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailRecord {
    /// Stable external message id. Opaque, unique, never regenerated.
    pub id: String,
    /// Raw From header as fetched (`"Display Name <addr>"` or bare address).
    pub sender: String,
    pub sender_name: String,
    /// Lowercased bare address extracted from the From header.
    pub sender_address: String,
    /// Substring after `@` in the address; empty when the address has none.
    pub sender_domain: String,
    pub subject: String,
    /// RFC 3339 where the Date header parsed; otherwise the raw header value.
    pub received_at: String,
    pub attachment_names: Vec<String>,
    pub mime_types: Vec<String>,
    /// Always `attachment_names.len()` after [`EmailRecord::normalize`].
    pub attachment_count: usize,
    pub tag: CategoryTag,
    /// Name of the rule that produced `tag`; empty while unclassified.
    pub matched_rule: String,
    /// True iff this id appeared in the most recent fetched batch.
    pub in_latest_fetch: bool,
    /// Path of the out-of-band body file, empty if none.
    pub body_file: String,
    pub body_format: BodyFormat,
    #[serde(default)]
    pub body_plain: String,
    #[serde(default)]
    pub body_html: String,
    pub ai_summary: String,
}

impl EmailRecord {
    /// Re-establish the derived-field invariant after load or merge.
    pub fn normalize(&mut self) {
        self.attachment_count = self.attachment_names.len();
    }

    pub fn has_attachments(&self) -> bool {
        !self.attachment_names.is_empty()
    }

    pub fn has_ai_summary(&self) -> bool {
        !self.ai_summary.trim().is_empty()
    }
}

// ============================================================================
// Sender parsing
// ============================================================================

/// Extract `(display name, bare address)` from a raw From header.
///
/// `"Dr. X <X@Dept.EDU>"` → `("Dr. X", "x@dept.edu")`; a bare address parses
/// to an empty name. The address is trimmed and lowercased; comparisons
/// elsewhere are all against this canonical form.
pub fn parse_sender(raw: &str) -> (String, String) {
    if let Ok(list) = mailparse::addrparse(raw) {
        for addr in list.iter() {
            if let mailparse::MailAddr::Single(info) = addr {
                let name = info.display_name.clone().unwrap_or_default();
                return (name, info.addr.trim().to_lowercase());
            }
        }
    }
    // mailparse rejects some real-world headers; fall back to a bracket scan.
    if let (Some(lt), Some(gt)) = (raw.find('<'), raw.rfind('>')) {
        if lt < gt {
            let name = raw[..lt].trim().trim_matches('"').to_string();
            let addr = raw[lt + 1..gt].trim().to_lowercase();
            return (name, addr);
        }
    }
    (String::new(), raw.trim().to_lowercase())
}

/// Domain part of an address: the substring after `@`, empty if absent.
pub fn domain_of(address: &str) -> String {
    address
        .split('@')
        .nth(1)
        .map(|d| d.trim().to_lowercase())
        .unwrap_or_default()
}

// ============================================================================
// Cancellation
// ============================================================================

/// Cooperative cancellation signal for batch operations.
///
/// Batches check it between per-message iterations and stop cleanly; work
/// already done is kept, nothing is rolled back.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_label_roundtrip() {
        for tag in CategoryTag::SUGGESTIBLE {
            assert_eq!(CategoryTag::from_label(tag.as_wire()), Some(tag));
        }
        assert_eq!(
            CategoryTag::from_label(UNCLASSIFIED_SENTINEL),
            Some(CategoryTag::Unclassified)
        );
    }

    #[test]
    fn test_accented_label_variants() {
        assert_eq!(
            CategoryTag::from_label("Vezetőség"),
            Some(CategoryTag::Leadership)
        );
        assert_eq!(
            CategoryTag::from_label("tanszék"),
            Some(CategoryTag::Department)
        );
        assert_eq!(
            CategoryTag::from_label("  Hiányos "),
            Some(CategoryTag::NonInstitutional)
        );
        assert_eq!(CategoryTag::from_label("milton"), Some(CategoryTag::Partner));
    }

    #[test]
    fn test_unknown_label_is_not_guessed() {
        assert_eq!(CategoryTag::from_label("spam"), None);
        assert_eq!(CategoryTag::from_label(""), None);
    }

    #[test]
    fn test_parse_sender_display_name_form() {
        let (name, addr) = parse_sender("Dr. Honfi Vid <Honfi@Uni-Milton.HU>");
        assert_eq!(name, "Dr. Honfi Vid");
        assert_eq!(addr, "honfi@uni-milton.hu");
    }

    #[test]
    fn test_parse_sender_bare_address() {
        let (name, addr) = parse_sender("student@gmail.com");
        assert_eq!(name, "");
        assert_eq!(addr, "student@gmail.com");
    }

    #[test]
    fn test_parse_sender_quoted_name_with_comma() {
        let (name, addr) = parse_sender("\"Doe, Jane\" <jane.doe@dept.edu>");
        assert_eq!(name, "Doe, Jane");
        assert_eq!(addr, "jane.doe@dept.edu");
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(
            domain_of("x@mail.neptun.example.edu"),
            "mail.neptun.example.edu"
        );
        assert_eq!(domain_of("no-at-sign"), "");
        assert_eq!(domain_of(""), "");
    }

    #[test]
    fn test_normalize_recomputes_attachment_count() {
        let mut rec = EmailRecord {
            attachment_names: vec!["a.pdf".into(), "b.docx".into()],
            attachment_count: 99,
            ..Default::default()
        };
        rec.normalize();
        assert_eq!(rec.attachment_count, 2);
    }

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        let clone = flag.clone();
        clone.cancel();
        assert!(flag.is_cancelled());
    }
}
