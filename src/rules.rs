//! Rule table: priority-ordered sender predicates loaded from TOML.
//!
//! The rule source is a sectioned key/value document (`config/rules.toml`)
//! with one `[rules.<category>]` section per category, each holding a
//! comma-separated `emails` list and optionally a comma-separated `domains`
//! substring list, plus `[general] uni_domain`. A missing or unparseable
//! file degrades to the built-in fallback table; a missing section degrades
//! only that section. Degradation is logged and recorded on the result,
//! never raised to the caller.
//!
//! The loaded `RuleSet` is an explicit value passed into the classifier —
//! there is no process-wide rule state, so tests construct arbitrary tables
//! freely.

use std::collections::HashSet;
use std::path::Path;

use crate::types::CategoryTag;

/// One category predicate: exact address matches plus optional
/// domain-substring matches.
#[derive(Debug, Clone)]
pub struct CategoryRule {
    /// Rule name recorded on matched messages (`matched_rule`).
    pub name: String,
    pub tag: CategoryTag,
    /// Exact sender addresses, lowercased and trimmed.
    pub addresses: HashSet<String>,
    /// Substring patterns matched anywhere in the sender domain.
    pub domains: Vec<String>,
}

impl CategoryRule {
    /// Does this rule match the given (already canonicalized) sender fields?
    pub fn matches(&self, address: &str, domain: &str) -> bool {
        if !address.is_empty() && self.addresses.contains(address) {
            return true;
        }
        if !domain.is_empty() {
            return self.domains.iter().any(|d| domain.contains(d.as_str()));
        }
        false
    }
}

/// Priority-ordered rule table.
///
/// Evaluation order is fixed: department, leadership, registrar, course,
/// partner, then the non-institutional fallback, then the unclassified
/// default. Department outranks leadership — the original rule engine
/// evaluated the user's own department first in every surviving revision,
/// and this table keeps that order.
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub rules: Vec<CategoryRule>,
    /// Institutional domain; senders whose non-empty domain does not contain
    /// it fall into [`CategoryTag::NonInstitutional`].
    pub uni_domain: String,
    /// Sections that could not be read from the source and use fallback data.
    /// Empty when the whole table came from configuration.
    pub fallback_sections: Vec<String>,
}

/// Rule name used for the non-institutional domain fallback.
pub const STUDENT_MAIL_RULE: &str = "student_mail";

// Section descriptors: (section key, rule name, tag, fallback addresses,
// fallback domain substrings). Order here is the evaluation order.
const SECTIONS: [(&str, &str, CategoryTag, &[&str], &[&str]); 5] = [
    (
        "department",
        "tanszek",
        CategoryTag::Department,
        FALLBACK_DEPARTMENT_EMAILS,
        &[],
    ),
    (
        "leadership",
        "vezetoseg",
        CategoryTag::Leadership,
        FALLBACK_LEADERSHIP_EMAILS,
        &[],
    ),
    (
        "neptun",
        "neptun",
        CategoryTag::Registrar,
        &["neptun@uni-milton.hu", "scott.d.edu@pm.me"],
        &["neptun"],
    ),
    (
        "moodle",
        "moodle",
        CategoryTag::Course,
        &["moodle@uni-milton.hu"],
        &["moodle"],
    ),
    (
        "milton",
        "milt-on",
        CategoryTag::Partner,
        &["noreply@milt-on.hu"],
        &["milt-on"],
    ),
];

const FALLBACK_UNI_DOMAIN: &str = "uni-milton.hu";

const FALLBACK_LEADERSHIP_EMAILS: &[&str] = &[
    "toth.tamas@uni-milton.hu",
    "kovacs.aron@uni-milton.hu",
    "grajczjar.istvan@uni-milton.hu",
    "szegedine.lengyel.piroska@uni-milton.hu",
    "szayly.jozsef@uni-milton.hu",
    "kukla.krisztian@uni-milton.hu",
    "szabo.k.gabor@uni-milton.hu",
    "schottner.krisztina@uni-milton.hu",
];

const FALLBACK_DEPARTMENT_EMAILS: &[&str] = &[
    "honfi@uni-milton.hu",
    "barkanyi.pal@uni-milton.hu",
    "cser.jozsef@uni-milton.hu",
    "illesi.zsolt@uni-milton.hu",
    "nyikes.zoltan@uni-milton.hu",
    "atol.gabor@uni-milton.hu",
    "belle.csabane@uni-milton.hu",
    "feherpolgar.pal@uni-milton.hu",
    "keszthelyi.andras@uni-milton.hu",
    "kuris.zoltan@uni-milton.hu",
    "levai.istvan@uni-milton.hu",
    "madarasz.istvan@uni-milton.hu",
    "molnar.tamas@uni-milton.hu",
    "nagy.istvan@uni-milton.hu",
    "nemeth.imre.istvan@uni-milton.hu",
    "racz.julianna@uni-milton.hu",
    "szabo.istvan@uni-milton.hu",
    "szalai.patrik@uni-milton.hu",
    "tokodi.gergely@uni-milton.hu",
    "udvaros.jozsef@uni-milton.hu",
    "attila@dlabs.hu",
];

impl RuleSet {
    /// The built-in table, used when the configuration source is absent or
    /// unreadable.
    pub fn fallback() -> RuleSet {
        let rules = SECTIONS
            .iter()
            .map(|(_, name, tag, addrs, domains)| CategoryRule {
                name: (*name).to_string(),
                tag: *tag,
                addresses: addrs.iter().map(|a| a.to_string()).collect(),
                domains: domains.iter().map(|d| d.to_string()).collect(),
            })
            .collect();
        RuleSet {
            rules,
            uni_domain: FALLBACK_UNI_DOMAIN.to_string(),
            fallback_sections: SECTIONS.iter().map(|(s, ..)| s.to_string()).collect(),
        }
    }

    /// Load the rule table from a TOML file.
    ///
    /// Never fails: a missing or malformed file yields the full fallback
    /// table, a missing section yields that section's fallback, and either
    /// condition is reported via `log::warn!` and `fallback_sections`.
    pub fn load(path: &Path) -> RuleSet {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                log::warn!(
                    "rule source {} not readable ({}), using built-in fallback",
                    path.display(),
                    e
                );
                return Self::fallback();
            }
        };
        Self::from_toml_str(&content)
    }

    /// Parse a rule table from TOML text. Same degradation semantics as
    /// [`RuleSet::load`].
    pub fn from_toml_str(content: &str) -> RuleSet {
        let doc: toml::Value = match content.parse() {
            Ok(v) => v,
            Err(e) => {
                log::warn!("rule source unparseable ({}), using built-in fallback", e);
                return Self::fallback();
            }
        };

        let mut rules = Vec::with_capacity(SECTIONS.len());
        let mut fallback_sections = Vec::new();

        for (section, name, tag, fb_addrs, fb_domains) in SECTIONS {
            let table = doc.get("rules").and_then(|r| r.get(section));

            let addresses = match table.and_then(|t| t.get("emails")).and_then(|v| v.as_str()) {
                Some(s) => split_list(s).into_iter().collect(),
                None => {
                    fallback_sections.push(section.to_string());
                    fb_addrs.iter().map(|a| a.to_string()).collect()
                }
            };

            // Domain patterns have their own built-in default even when the
            // section itself came from configuration.
            let domains = match table.and_then(|t| t.get("domains")).and_then(|v| v.as_str()) {
                Some(s) => split_list(s),
                None => fb_domains.iter().map(|d| d.to_string()).collect(),
            };

            rules.push(CategoryRule {
                name: name.to_string(),
                tag,
                addresses,
                domains,
            });
        }

        let uni_domain = doc
            .get("general")
            .and_then(|g| g.get("uni_domain"))
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_else(|| {
                fallback_sections.push("general".to_string());
                FALLBACK_UNI_DOMAIN.to_string()
            });

        if !fallback_sections.is_empty() {
            log::warn!(
                "rule sections using built-in fallback: {}",
                fallback_sections.join(", ")
            );
        }

        RuleSet {
            rules,
            uni_domain,
            fallback_sections,
        }
    }

    /// Per-rule configured sizes, for diagnostics and the CLI report.
    pub fn summary(&self) -> Vec<(String, usize, usize)> {
        self.rules
            .iter()
            .map(|r| (r.name.clone(), r.addresses.len(), r.domains.len()))
            .collect()
    }
}

/// Split a comma-separated list into lowercased, trimmed, non-empty entries.
fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_table_shape() {
        let rules = RuleSet::fallback();
        assert_eq!(rules.rules.len(), 5);
        assert_eq!(rules.rules[0].tag, CategoryTag::Department);
        assert_eq!(rules.rules[1].tag, CategoryTag::Leadership);
        assert_eq!(rules.uni_domain, "uni-milton.hu");
        assert!(rules.rules[0].addresses.contains("honfi@uni-milton.hu"));
        assert_eq!(rules.rules[2].domains, vec!["neptun".to_string()]);
    }

    #[test]
    fn test_load_full_config() {
        let toml = r#"
            [general]
            uni_domain = "Dept.EDU"

            [rules.department]
            emails = "X@Dept.edu , y@dept.edu"

            [rules.leadership]
            emails = "boss@dept.edu"

            [rules.neptun]
            emails = "registrar@dept.edu"
            domains = "neptun"

            [rules.moodle]
            emails = "courses@dept.edu"
            domains = "moodle, lms"

            [rules.milton]
            emails = "noreply@partner.example"
            domains = "partner"
        "#;
        let rules = RuleSet::from_toml_str(toml);
        assert!(rules.fallback_sections.is_empty());
        assert_eq!(rules.uni_domain, "dept.edu");
        assert!(rules.rules[0].addresses.contains("x@dept.edu"));
        assert_eq!(rules.rules[3].domains, vec!["moodle", "lms"]);
    }

    #[test]
    fn test_missing_section_degrades_only_that_section() {
        let toml = r#"
            [general]
            uni_domain = "dept.edu"

            [rules.department]
            emails = "x@dept.edu"

            [rules.neptun]
            emails = "registrar@dept.edu"

            [rules.moodle]
            emails = "courses@dept.edu"

            [rules.milton]
            emails = "noreply@partner.example"
        "#;
        let rules = RuleSet::from_toml_str(toml);
        assert_eq!(rules.fallback_sections, vec!["leadership".to_string()]);
        // leadership fell back to the built-in set
        assert!(rules.rules[1]
            .addresses
            .contains("grajczjar.istvan@uni-milton.hu"));
        // department stayed configured
        assert_eq!(rules.rules[0].addresses.len(), 1);
    }

    #[test]
    fn test_malformed_source_degrades_to_full_fallback() {
        let rules = RuleSet::from_toml_str("this is [ not toml = =");
        assert_eq!(rules.fallback_sections.len(), 5);
        assert_eq!(rules.uni_domain, "uni-milton.hu");
    }

    #[test]
    fn test_missing_file_degrades_to_full_fallback() {
        let rules = RuleSet::load(Path::new("/nonexistent/rules.toml"));
        assert_eq!(rules.fallback_sections.len(), 5);
    }

    #[test]
    fn test_rule_matches_address_case_handled_by_caller_canonical_form() {
        let rule = CategoryRule {
            name: "tanszek".into(),
            tag: CategoryTag::Department,
            addresses: ["x@dept.edu".to_string()].into_iter().collect(),
            domains: vec![],
        };
        assert!(rule.matches("x@dept.edu", "dept.edu"));
        assert!(!rule.matches("", "dept.edu"));
    }

    #[test]
    fn test_rule_matches_domain_substring() {
        let rule = CategoryRule {
            name: "neptun".into(),
            tag: CategoryTag::Registrar,
            addresses: HashSet::new(),
            domains: vec!["neptun".into()],
        };
        assert!(rule.matches("anything@x", "mail.neptun.example.edu"));
        assert!(!rule.matches("anything@x", "dept.edu"));
        // empty domain never matches a domain pattern
        assert!(!rule.matches("anything", ""));
    }

    #[test]
    fn test_summary_counts() {
        let rules = RuleSet::fallback();
        let summary = rules.summary();
        assert_eq!(summary.len(), 5);
        let dept = summary.iter().find(|(n, _, _)| n == "tanszek").unwrap();
        assert_eq!(dept.1, 21);
    }
}
