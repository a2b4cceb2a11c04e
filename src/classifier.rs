//! Sender-based message classification.
//!
//! Pure rule evaluation against a [`RuleSet`] — no I/O, no shared state.
//! Rules run in fixed priority order and the first match wins: a sender in
//! the department set gets `Department` even when its domain would also hit
//! the non-institutional fallback.

use crate::rules::{RuleSet, STUDENT_MAIL_RULE};
use crate::types::{domain_of, parse_sender, CancelFlag, CategoryTag, EmailRecord};

/// Classify one message's sender fields against the rule table.
///
/// Pure function of the inputs: identical message + rules always yields the
/// identical `(tag, rule name)` pair. The sender address is re-extracted from
/// the raw From header so a record fetched before field derivation still
/// classifies correctly.
pub fn classify(email: &EmailRecord, rules: &RuleSet) -> (CategoryTag, String) {
    let address = if email.sender_address.is_empty() {
        parse_sender(&email.sender).1
    } else {
        email.sender_address.trim().to_lowercase()
    };
    let domain = if email.sender_domain.is_empty() {
        domain_of(&address)
    } else {
        email.sender_domain.trim().to_lowercase()
    };

    for rule in &rules.rules {
        if rule.matches(&address, &domain) {
            return (rule.tag, rule.name.clone());
        }
    }

    // Non-institutional fallback: requires a non-empty domain that does not
    // contain the institutional domain. An addressless, domainless sender
    // stays unclassified.
    if !domain.is_empty() && !domain.contains(rules.uni_domain.as_str()) {
        return (CategoryTag::NonInstitutional, STUDENT_MAIL_RULE.to_string());
    }

    (CategoryTag::Unclassified, String::new())
}

/// Classify a batch in place, returning how many messages were newly tagged.
///
/// With `only_unclassified` (the default for repeat runs) any message whose
/// tag is not the sentinel is left untouched, which makes re-running the
/// batch idempotent and preserves manual or AI overrides. Cancellation is
/// checked between messages; already-processed records keep their new tags.
pub fn classify_batch(
    emails: &mut [EmailRecord],
    rules: &RuleSet,
    only_unclassified: bool,
    cancel: &CancelFlag,
) -> usize {
    let mut tagged = 0;
    for email in emails.iter_mut() {
        if cancel.is_cancelled() {
            log::info!("classify_batch cancelled after {} newly tagged", tagged);
            break;
        }
        if only_unclassified && !email.tag.is_unclassified() {
            continue;
        }
        let (tag, rule) = classify(email, rules);
        email.tag = tag;
        email.matched_rule = rule;
        if !tag.is_unclassified() {
            tagged += 1;
        }
    }
    tagged
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{CategoryRule, RuleSet};
    use std::collections::HashSet;

    fn test_rules() -> RuleSet {
        RuleSet {
            rules: vec![
                CategoryRule {
                    name: "tanszek".into(),
                    tag: CategoryTag::Department,
                    addresses: ["x@dept.edu".to_string()].into_iter().collect(),
                    domains: vec![],
                },
                CategoryRule {
                    name: "vezetoseg".into(),
                    tag: CategoryTag::Leadership,
                    addresses: ["boss@dept.edu".to_string(), "x@dept.edu".to_string()]
                        .into_iter()
                        .collect(),
                    domains: vec![],
                },
                CategoryRule {
                    name: "neptun".into(),
                    tag: CategoryTag::Registrar,
                    addresses: HashSet::new(),
                    domains: vec!["neptun".into()],
                },
            ],
            uni_domain: "dept.edu".into(),
            fallback_sections: vec![],
        }
    }

    fn email(sender: &str, domain: &str) -> EmailRecord {
        let (name, address) = parse_sender(sender);
        EmailRecord {
            id: "m1".into(),
            sender: sender.to_string(),
            sender_name: name,
            sender_address: address,
            sender_domain: domain.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_department_rule_wins_over_later_matches() {
        // x@dept.edu is in both the department and leadership sets; the
        // department rule is evaluated first and must win.
        let msg = email("Dr. X <x@dept.edu>", "dept.edu");
        let (tag, rule) = classify(&msg, &test_rules());
        assert_eq!(tag, CategoryTag::Department);
        assert_eq!(rule, "tanszek");
    }

    #[test]
    fn test_classify_is_pure() {
        let msg = email("Dr. X <x@dept.edu>", "dept.edu");
        let rules = test_rules();
        assert_eq!(classify(&msg, &rules), classify(&msg, &rules));
    }

    #[test]
    fn test_domain_substring_containment() {
        let msg = email("noreply@mail.neptun.example.edu", "mail.neptun.example.edu");
        let (tag, rule) = classify(&msg, &test_rules());
        assert_eq!(tag, CategoryTag::Registrar);
        assert_eq!(rule, "neptun");
    }

    #[test]
    fn test_non_institutional_fallback() {
        let msg = email("student@gmail.com", "gmail.com");
        let (tag, rule) = classify(&msg, &test_rules());
        assert_eq!(tag, CategoryTag::NonInstitutional);
        assert_eq!(rule, STUDENT_MAIL_RULE);
    }

    #[test]
    fn test_institutional_unmatched_stays_unclassified() {
        let msg = email("someone@dept.edu", "dept.edu");
        let (tag, rule) = classify(&msg, &test_rules());
        assert_eq!(tag, CategoryTag::Unclassified);
        assert_eq!(rule, "");
    }

    #[test]
    fn test_empty_domain_does_not_hit_fallback() {
        let msg = email("mailer-daemon", "");
        let (tag, _) = classify(&msg, &test_rules());
        assert_eq!(tag, CategoryTag::Unclassified);
    }

    #[test]
    fn test_address_match_beats_fallback_despite_external_domain() {
        // Department member mailing from an external domain entry: the
        // address set contains the external address, so department wins.
        let mut rules = test_rules();
        rules.rules[0].addresses.insert("attila@dlabs.hu".into());
        let msg = email("attila@dlabs.hu", "dlabs.hu");
        let (tag, rule) = classify(&msg, &rules);
        assert_eq!(tag, CategoryTag::Department);
        assert_eq!(rule, "tanszek");
    }

    #[test]
    fn test_classify_batch_skips_tagged_records() {
        let rules = test_rules();
        let mut emails = vec![email("x@dept.edu", "dept.edu"), email("s@gmail.com", "gmail.com")];
        emails[0].tag = CategoryTag::Other;
        emails[0].matched_rule = "manual".into();

        let tagged = classify_batch(&mut emails, &rules, true, &CancelFlag::new());
        assert_eq!(tagged, 1);
        // manual override untouched
        assert_eq!(emails[0].tag, CategoryTag::Other);
        assert_eq!(emails[0].matched_rule, "manual");
        assert_eq!(emails[1].tag, CategoryTag::NonInstitutional);
    }

    #[test]
    fn test_classify_batch_idempotent() {
        let rules = test_rules();
        let mut emails = vec![
            email("Dr. X <x@dept.edu>", "dept.edu"),
            email("s@gmail.com", "gmail.com"),
            email("unknown@dept.edu", "dept.edu"),
        ];
        classify_batch(&mut emails, &rules, true, &CancelFlag::new());
        let tags: Vec<_> = emails.iter().map(|e| e.tag).collect();

        classify_batch(&mut emails, &rules, true, &CancelFlag::new());
        let tags_again: Vec<_> = emails.iter().map(|e| e.tag).collect();
        assert_eq!(tags, tags_again);
    }

    #[test]
    fn test_classify_batch_reclassify_all_overrides() {
        let rules = test_rules();
        let mut emails = vec![email("x@dept.edu", "dept.edu")];
        emails[0].tag = CategoryTag::Other;

        classify_batch(&mut emails, &rules, false, &CancelFlag::new());
        assert_eq!(emails[0].tag, CategoryTag::Department);
    }

    #[test]
    fn test_classify_batch_cancellation_keeps_partial_progress() {
        let rules = test_rules();
        let mut emails = vec![email("x@dept.edu", "dept.edu"), email("s@gmail.com", "gmail.com")];
        let cancel = CancelFlag::new();
        cancel.cancel();
        let tagged = classify_batch(&mut emails, &rules, true, &cancel);
        assert_eq!(tagged, 0);
        assert_eq!(emails[0].tag, CategoryTag::Unclassified);
    }
}
