//! Bridge between free-text model output and the typed triage core.
//!
//! The rest of the crate never sees raw model text: category suggestions are
//! mapped onto the closed tag set here, and summaries land as plain strings
//! on the record. A model answer that matches nothing in the set degrades to
//! `Other`, never to the unclassified sentinel — the sentinel means "no one
//! has looked at this yet", and the model has looked.

use crate::storage::EmailStore;
use crate::types::{CancelFlag, CategoryTag, EmailRecord};

use super::prompts;
use super::{AiError, TextGenerator};

const EMPTY_BODY_SUMMARY: &str = "No message content to summarize.";

/// Ask the provider for a category and resolve the answer onto the tag set.
pub fn suggest_category(
    generator: &dyn TextGenerator,
    email: &EmailRecord,
    body_text: &str,
) -> Result<CategoryTag, AiError> {
    let prompt = prompts::category_prompt(email, body_text);
    let answer = generator.generate(&prompt)?;
    let tag = resolve_label(&answer);
    log::debug!(
        "{} suggested {:?} for {} (raw: {:?})",
        generator.name(),
        tag,
        email.id,
        answer.chars().take(60).collect::<String>()
    );
    Ok(tag)
}

/// Map a free-text answer to a tag by substring match, in the declared
/// priority order of the suggestible set. First hit wins; no hit is `Other`.
fn resolve_label(answer: &str) -> CategoryTag {
    let lowered = answer.to_lowercase();
    for tag in CategoryTag::SUGGESTIBLE {
        let label = tag.display_label().to_lowercase();
        if lowered.contains(&label) || lowered.contains(tag.as_wire()) {
            return tag;
        }
    }
    CategoryTag::Other
}

/// Summarize one email. An empty body never reaches the provider; it gets a
/// fixed placeholder so the batch does not re-attempt it forever.
pub fn summarize_email(
    generator: &dyn TextGenerator,
    email: &EmailRecord,
    body_text: &str,
) -> Result<String, AiError> {
    if body_text.trim().is_empty() && email.subject.trim().is_empty() {
        return Ok(EMPTY_BODY_SUMMARY.to_string());
    }
    let prompt = prompts::summary_prompt(email, body_text);
    generator.generate(&prompt)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Summarize every record that has none yet, in place.
///
/// Per-item failures are logged and counted but never abort the batch; the
/// records already summarized keep their results. Cancellation is checked
/// between items. `progress` is called after each attempt with
/// (done, total-to-attempt).
pub fn summarize_batch(
    generator: &dyn TextGenerator,
    emails: &mut [EmailRecord],
    cancel: &CancelFlag,
    mut progress: impl FnMut(usize, usize),
) -> BatchReport {
    let total = emails
        .iter()
        .filter(|e| e.ai_summary.trim().is_empty())
        .count();

    let mut report = BatchReport::default();
    for email in emails.iter_mut() {
        if cancel.is_cancelled() {
            log::info!(
                "summarize_batch cancelled after {}/{} attempts",
                report.attempted,
                total
            );
            break;
        }
        if !email.ai_summary.trim().is_empty() {
            continue;
        }
        report.attempted += 1;
        let body = EmailStore::body_display_text(email);
        match summarize_email(generator, email, &body) {
            Ok(summary) => {
                email.ai_summary = summary;
                report.succeeded += 1;
            }
            Err(e) => {
                log::warn!("summary failed for {}: {}", email.id, e);
                report.failed += 1;
            }
        }
        progress(report.attempted, total);
    }
    report
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Scripted provider: pops canned responses, records prompts.
    struct FakeGenerator {
        responses: RefCell<Vec<Result<String, AiError>>>,
        prompts: RefCell<Vec<String>>,
    }

    impl FakeGenerator {
        fn new(responses: Vec<Result<String, AiError>>) -> Self {
            let mut responses = responses;
            responses.reverse();
            Self {
                responses: RefCell::new(responses),
                prompts: RefCell::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.borrow().len()
        }
    }

    impl TextGenerator for FakeGenerator {
        fn generate(&self, prompt: &str) -> Result<String, AiError> {
            self.prompts.borrow_mut().push(prompt.to_string());
            self.responses
                .borrow_mut()
                .pop()
                .unwrap_or(Err(AiError::EmptyResponse("fake")))
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    fn email(id: &str, subject: &str, body: &str) -> EmailRecord {
        EmailRecord {
            id: id.to_string(),
            sender: "x@uni-milton.hu".into(),
            subject: subject.to_string(),
            body_plain: body.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_label_exact_and_chatty() {
        assert_eq!(resolve_label("Tanszék"), CategoryTag::Department);
        assert_eq!(
            resolve_label("I would say this is Neptun related."),
            CategoryTag::Registrar
        );
    }

    #[test]
    fn test_resolve_label_unknown_maps_to_other_not_sentinel() {
        let tag = resolve_label("spam, probably");
        assert_eq!(tag, CategoryTag::Other);
        assert!(!tag.is_unclassified());
    }

    #[test]
    fn test_resolve_label_first_match_wins() {
        // Mentions two labels; the earlier tag in the declared order wins.
        assert_eq!(
            resolve_label("tanszék or maybe vezetőség"),
            CategoryTag::Department
        );
    }

    #[test]
    fn test_suggest_category_uses_model_answer() {
        let fake = FakeGenerator::new(vec![Ok("Moodle".into())]);
        let tag = suggest_category(&fake, &email("m1", "s", "b"), "b").unwrap();
        assert_eq!(tag, CategoryTag::Course);
    }

    #[test]
    fn test_summarize_empty_body_skips_provider() {
        let fake = FakeGenerator::new(vec![]);
        let summary = summarize_email(&fake, &email("m1", "", ""), "").unwrap();
        assert_eq!(summary, EMPTY_BODY_SUMMARY);
        assert_eq!(fake.calls(), 0);
    }

    #[test]
    fn test_summarize_batch_skips_existing_and_survives_failures() {
        let fake = FakeGenerator::new(vec![
            Ok("first summary".into()),
            Err(AiError::Api {
                status: 400,
                message: "bad".into(),
            }),
        ]);
        let mut emails = vec![
            email("m1", "a", "body a"),
            email("m2", "b", "body b"),
            email("m3", "c", "body c"),
        ];
        emails[1].ai_summary = "already done".into();

        let mut ticks = Vec::new();
        let report = summarize_batch(&fake, &mut emails, &CancelFlag::new(), |done, total| {
            ticks.push((done, total))
        });

        assert_eq!(
            report,
            BatchReport {
                attempted: 2,
                succeeded: 1,
                failed: 1
            }
        );
        assert_eq!(emails[0].ai_summary, "first summary");
        assert_eq!(emails[1].ai_summary, "already done");
        assert!(emails[2].ai_summary.is_empty());
        assert_eq!(ticks, vec![(1, 2), (2, 2)]);
    }

    #[test]
    fn test_summarize_batch_cancellation_stops_early() {
        let fake = FakeGenerator::new(vec![Ok("unused".into())]);
        let mut emails = vec![email("m1", "a", "body")];
        let cancel = CancelFlag::new();
        cancel.cancel();
        let report = summarize_batch(&fake, &mut emails, &cancel, |_, _| {});
        assert_eq!(report.attempted, 0);
        assert_eq!(fake.calls(), 0);
    }
}
