//! Prompt construction for category suggestion and summarization.

use crate::types::{CategoryTag, EmailRecord};

/// Bodies are truncated before prompting; enough context for a two-sentence
/// summary without paying for the whole newsletter.
const BODY_PROMPT_LIMIT: usize = 2000;

/// Build the category-suggestion prompt. The model is asked to answer with
/// exactly one label from the closed set; the bridge maps whatever comes back
/// onto the enum, so a chatty answer still resolves.
pub fn category_prompt(email: &EmailRecord, body_text: &str) -> String {
    let labels: Vec<&str> = CategoryTag::SUGGESTIBLE
        .iter()
        .map(|t| t.display_label())
        .collect();
    format!(
        "You are labelling a university staff inbox. Pick the single best \
         category for the email below.\n\
         Answer with exactly one of these labels and nothing else: {}.\n\n\
         From: {}\n\
         Subject: {}\n\
         Body:\n{}",
        labels.join(", "),
        email.sender,
        email.subject,
        truncate_body(body_text),
    )
}

/// Build the summarization prompt: two plain sentences, same language as the
/// email, no markdown.
pub fn summary_prompt(email: &EmailRecord, body_text: &str) -> String {
    format!(
        "Summarize this email in at most two plain sentences, in the same \
         language the email is written in. Do not use markdown or bullet \
         points.\n\n\
         From: {}\n\
         Subject: {}\n\
         Body:\n{}",
        email.sender,
        email.subject,
        truncate_body(body_text),
    )
}

fn truncate_body(body: &str) -> &str {
    match body.char_indices().nth(BODY_PROMPT_LIMIT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> EmailRecord {
        EmailRecord {
            id: "m1".into(),
            sender: "Dean <dean@uni-milton.hu>".into(),
            subject: "Exam schedule".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_category_prompt_lists_every_suggestible_label() {
        let prompt = category_prompt(&email(), "body");
        for tag in CategoryTag::SUGGESTIBLE {
            assert!(prompt.contains(tag.display_label()), "missing {:?}", tag);
        }
        assert!(!prompt.contains("----"));
    }

    #[test]
    fn test_body_truncated_on_char_boundary() {
        let body = "é".repeat(3000);
        let prompt = summary_prompt(&email(), &body);
        assert!(prompt.len() < body.len());
        // must not panic on multi-byte boundaries, and keeps the limit
        assert_eq!(truncate_body(&body).chars().count(), 2000);
    }

    #[test]
    fn test_short_body_kept_whole() {
        assert_eq!(truncate_body("hello"), "hello");
    }
}
