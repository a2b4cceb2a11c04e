//! Offline triage CLI: inspect the store, run the classifier, audit
//! attachments. Everything here works against the local store only; no
//! mailbox or AI collaborator is contacted.

use std::path::PathBuf;
use std::process::ExitCode;

use sortify::attachments::{audit_batch, AttachmentCache};
use sortify::rules::RuleSet;
use sortify::storage::EmailStore;
use sortify::types::{CancelFlag, CategoryTag};
use sortify::{classify_batch, EmailRecord};

const USAGE: &str = "usage: sortify <command>

commands:
  report                per-category counts and rule-table summary
  classify [--all]      classify stored messages (--all re-tags everything)
  audit-attachments     check every stored attachment, list suspicious ones";

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match args.first() {
        Some(c) => c.as_str(),
        None => {
            eprintln!("{}", USAGE);
            return ExitCode::from(2);
        }
    };

    let store = EmailStore::default_location();
    match command {
        "report" => report(&store),
        "classify" => {
            let all = args.iter().any(|a| a == "--all");
            classify_cmd(&store, all)
        }
        "audit-attachments" => audit(&store),
        other => {
            eprintln!("unknown command: {}\n\n{}", other, USAGE);
            ExitCode::from(2)
        }
    }
}

fn rules_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".sortify")
        .join("rules.toml")
}

fn report(store: &EmailStore) -> ExitCode {
    let emails = store.load();
    let rules = RuleSet::load(&rules_path());

    println!("{} messages in store", emails.len());
    if store.is_test_mode() {
        println!("(test dataset active, persistence disabled)");
    }

    let latest = emails.iter().filter(|e| e.in_latest_fetch).count();
    println!("{} in the latest fetch\n", latest);

    for tag in CategoryTag::SUGGESTIBLE {
        let count = emails.iter().filter(|e| e.tag == tag).count();
        println!("  {:<12} {}", tag.display_label(), count);
    }
    let unclassified = emails.iter().filter(|e| e.tag.is_unclassified()).count();
    println!("  {:<12} {}\n", "unclassified", unclassified);

    println!("rule table:");
    for (name, addresses, domains) in rules.summary() {
        println!("  {:<12} {} addresses, {} domain patterns", name, addresses, domains);
    }
    if !rules.fallback_sections.is_empty() {
        println!("  (built-in fallback for: {})", rules.fallback_sections.join(", "));
    }
    ExitCode::SUCCESS
}

fn classify_cmd(store: &EmailStore, all: bool) -> ExitCode {
    let mut emails: Vec<EmailRecord> = store.load();
    if emails.is_empty() {
        println!("store is empty, nothing to classify");
        return ExitCode::SUCCESS;
    }

    let rules = RuleSet::load(&rules_path());
    let tagged = classify_batch(&mut emails, &rules, !all, &CancelFlag::new());
    println!("{} messages tagged", tagged);

    match store.save(&emails) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("classification done but saving failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn audit(store: &EmailStore) -> ExitCode {
    let emails = store.load();
    let mut cache = AttachmentCache::open(store.data_dir().join("attachment_cache.json"));
    let report = audit_batch(&emails, &mut cache);

    println!(
        "{} attachments checked, {} suspicious",
        report.total_checked,
        report.suspicious.len()
    );
    for finding in &report.suspicious {
        println!("  {} {}: {}", finding.message_id, finding.filename, finding.reason);
    }
    if report.suspicious.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
