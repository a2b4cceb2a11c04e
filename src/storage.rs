//! Flat-file persistence for the message set.
//!
//! One CSV row per message record. List-valued fields are pipe-joined on
//! save and split on `;` or `|` on load, numeric fields default to zero on
//! malformed input, and a malformed row degrades field-by-field instead of
//! aborting the load. Saves rewrite the whole file through a temp-file
//! rename, so a failed write leaves the previous file untouched.
//!
//! A sentinel test dataset (`emails_mod.csv`), when present, takes read
//! precedence over the normal file and disables persistence — a read-only
//! override for reproducible demo state.
//!
//! Message bodies are stored out-of-band under `bodies/<id>.html|.txt` and
//! referenced from the row by path plus format flag.

use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::{BodyFormat, CategoryTag, EmailRecord};

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to create data directory {0}")]
    CreateDir(PathBuf),
}

/// Column order of the persisted CSV. Keep stable; loads index by header.
const COLUMNS: [&str; 15] = [
    "message_id",
    "sender",
    "sender_name",
    "sender_domain",
    "subject",
    "received_at",
    "attachment_count",
    "attachment_names",
    "mime_types",
    "tag",
    "in_latest_fetch",
    "rule_applied",
    "body_file",
    "body_format",
    "ai_summary",
];

/// CSV-backed message store rooted at a data directory.
pub struct EmailStore {
    data_dir: PathBuf,
    csv_path: PathBuf,
    test_csv_path: PathBuf,
    bodies_dir: PathBuf,
}

impl EmailStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> EmailStore {
        let data_dir = data_dir.into();
        EmailStore {
            csv_path: data_dir.join("emails.csv"),
            test_csv_path: data_dir.join("emails_mod.csv"),
            bodies_dir: data_dir.join("bodies"),
            data_dir,
        }
    }

    /// Default store under the user's home directory (`~/.sortify/data`).
    pub fn default_location() -> EmailStore {
        let base = dirs::home_dir().unwrap_or_default().join(".sortify");
        EmailStore::new(base.join("data"))
    }

    /// True when the sentinel test dataset is present: reads come from it and
    /// persistence is disabled.
    pub fn is_test_mode(&self) -> bool {
        self.test_csv_path.exists()
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn read_path(&self) -> &Path {
        if self.is_test_mode() {
            &self.test_csv_path
        } else {
            &self.csv_path
        }
    }

    // ------------------------------------------------------------------
    // Load
    // ------------------------------------------------------------------

    /// Load all records. A missing file is an empty set, not an error;
    /// malformed fields default rather than failing the row.
    pub fn load(&self) -> Vec<EmailRecord> {
        let path = self.read_path();
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => {
                log::info!("store {} not found, starting empty", path.display());
                return Vec::new();
            }
        };

        let rows = parse_csv(&content);
        let mut iter = rows.into_iter();
        let header = match iter.next() {
            Some(h) => h,
            None => return Vec::new(),
        };
        let col = |name: &str| header.iter().position(|h| h == name);
        let idx: Vec<Option<usize>> = COLUMNS.iter().map(|c| col(c)).collect();
        let field = |row: &[String], i: usize| -> String {
            idx[i]
                .and_then(|j| row.get(j))
                .map(|s| s.to_string())
                .unwrap_or_default()
        };

        let mut emails = Vec::new();
        for row in iter {
            if row.iter().all(|f| f.is_empty()) {
                continue;
            }
            let sender = field(&row, 1);
            let (_, address) = crate::types::parse_sender(&sender);
            let mut rec = EmailRecord {
                id: field(&row, 0),
                sender_name: field(&row, 2),
                sender_address: address,
                sender_domain: field(&row, 3).trim().to_lowercase(),
                subject: field(&row, 4),
                received_at: field(&row, 5),
                attachment_names: split_list_field(&field(&row, 7)),
                mime_types: split_list_field(&field(&row, 8)),
                tag: CategoryTag::from_label(&field(&row, 9)).unwrap_or_default(),
                in_latest_fetch: parse_flag(&field(&row, 10)),
                matched_rule: field(&row, 11),
                body_file: field(&row, 12),
                body_format: BodyFormat::parse(&field(&row, 13)),
                ai_summary: field(&row, 14),
                sender,
                ..Default::default()
            };
            rec.normalize();
            if !rec.body_file.is_empty() {
                let (html, plain) = self.load_body_raw(&rec.body_file);
                rec.body_html = html;
                rec.body_plain = plain;
            }
            emails.push(rec);
        }

        log::info!("loaded {} records from {}", emails.len(), path.display());
        emails
    }

    // ------------------------------------------------------------------
    // Save
    // ------------------------------------------------------------------

    /// Persist the full set (whole-file rewrite). In test mode the write is
    /// skipped so the sentinel dataset is never clobbered.
    pub fn save(&self, emails: &[EmailRecord]) -> Result<(), StoreError> {
        if self.is_test_mode() {
            log::info!("test mode active, skipping persist of {} records", emails.len());
            return Ok(());
        }
        std::fs::create_dir_all(&self.data_dir)
            .map_err(|_| StoreError::CreateDir(self.data_dir.clone()))?;

        let mut out = String::new();
        out.push_str(&COLUMNS.join(","));
        out.push('\n');
        for email in emails {
            let fields = [
                email.id.clone(),
                email.sender.clone(),
                email.sender_name.clone(),
                email.sender_domain.clone(),
                email.subject.clone(),
                email.received_at.clone(),
                email.attachment_count.to_string(),
                email.attachment_names.join("|"),
                email.mime_types.join("|"),
                email.tag.as_wire().to_string(),
                if email.in_latest_fetch { "1" } else { "0" }.to_string(),
                email.matched_rule.clone(),
                email.body_file.clone(),
                email.body_format.as_str().to_string(),
                email.ai_summary.clone(),
            ];
            let row: Vec<String> = fields.iter().map(|f| csv_escape(f)).collect();
            out.push_str(&row.join(","));
            out.push('\n');
        }

        // Write-then-rename so a failed write never truncates the live file.
        let tmp_path = self.csv_path.with_extension("csv.tmp");
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(out.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.csv_path)?;
        log::info!("saved {} records to {}", emails.len(), self.csv_path.display());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Out-of-band bodies
    // ------------------------------------------------------------------

    /// Store a message body under `bodies/`, preferring the HTML variant.
    /// Returns the stored path and format; empty bodies store nothing.
    pub fn save_body(
        &self,
        message_id: &str,
        body_plain: &str,
        body_html: &str,
    ) -> Result<(String, BodyFormat), StoreError> {
        let (content, format, ext) = if !body_html.trim().is_empty() {
            (body_html, BodyFormat::Html, "html")
        } else if !body_plain.trim().is_empty() {
            (body_plain, BodyFormat::Plain, "txt")
        } else {
            return Ok((String::new(), BodyFormat::None));
        };

        std::fs::create_dir_all(&self.bodies_dir)
            .map_err(|_| StoreError::CreateDir(self.bodies_dir.clone()))?;
        let path = self.bodies_dir.join(format!("{}.{}", message_id, ext));
        std::fs::write(&path, content)?;
        Ok((path.to_string_lossy().into_owned(), format))
    }

    /// Reload a body file without stripping: `(html, plain)`, empty strings
    /// when the file is missing or unreadable.
    pub fn load_body_raw(&self, body_file: &str) -> (String, String) {
        if body_file.is_empty() {
            return (String::new(), String::new());
        }
        match std::fs::read_to_string(body_file) {
            Ok(content) if body_file.ends_with(".html") => (content, String::new()),
            Ok(content) => (String::new(), content),
            Err(_) => (String::new(), String::new()),
        }
    }

    /// Collaborator-facing body text: plain body if present, else the HTML
    /// body rendered down to text.
    pub fn body_display_text(email: &EmailRecord) -> String {
        if !email.body_plain.trim().is_empty() {
            return email.body_plain.clone();
        }
        if email.body_html.trim().is_empty() {
            return String::new();
        }
        html2text::from_read(email.body_html.as_bytes(), 80).unwrap_or_default()
    }
}

// ============================================================================
// CSV primitives
// ============================================================================

/// RFC 4180 escape: quote the field when it contains a comma, quote, or
/// newline, doubling embedded quotes.
fn csv_escape(value: &str) -> String {
    let needs_quotes = value.contains(',') || value.contains('"') || value.contains('\n');
    if !needs_quotes {
        return value.to_string();
    }
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Minimal RFC 4180 reader: quoted fields, doubled-quote escapes, embedded
/// commas and newlines. Tolerates CRLF line endings.
fn parse_csv(content: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => {
                row.push(std::mem::take(&mut field));
            }
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}

/// Split a delimiter-joined list field; both `;` and `|` are accepted.
fn split_list_field(s: &str) -> Vec<String> {
    s.split(|c| c == ';' || c == '|')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Flag fields tolerate anything; only `1`/`true` count as set.
fn parse_flag(s: &str) -> bool {
    matches!(s.trim(), "1" | "true")
}

// ============================================================================
// Tests
// ============================================================================
