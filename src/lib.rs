//! Email triage core: priority-ordered sender classification, an idempotent
//! sync against a persisted CSV store, an attachment safety checker with a
//! verdict cache, and an optional AI bridge for category suggestions and
//! summaries.
//!
//! The core is single-threaded and synchronous; long-running batch
//! operations take a [`types::CancelFlag`] and a progress callback instead
//! of spawning anything. Mailbox protocols and UI belong to collaborators
//! behind the seams in [`mailbox`].

pub mod ai;
pub mod attachments;
pub mod classifier;
pub mod mailbox;
pub mod rules;
pub mod storage;
pub mod sync;
pub mod types;

pub use classifier::{classify, classify_batch};
pub use rules::RuleSet;
pub use storage::EmailStore;
pub use sync::{merge, sync};
pub use types::{CancelFlag, CategoryTag, EmailRecord};
