//! Integration tests for the custodian-audit crate.
//!
//! These tests drive the chain through its public API and then edit the
//! JSON-lines files directly to simulate tampering and aged data.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{Duration, SubsecRound, Utc};
use custodian_audit::{
    ANCHOR_FILE, AuditChain, AuditConfig, AuditEntry, AuditEvent, AuditQuery, EXPORT_FORMAT,
    EventType, Severity, ViolationKind,
};

fn open_chain(dir: &Path) -> AuditChain {
    AuditChain::open(&AuditConfig::new().with_audit_dir(dir)).unwrap()
}

fn log_files(dir: &Path, owner: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir.join(owner))
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    files.sort();
    files
}

/// Rewrite one line of a log file through a JSON edit.
fn edit_line(path: &Path, line: usize, edit: impl FnOnce(&mut serde_json::Value)) {
    let content = std::fs::read_to_string(path).unwrap();
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let mut value: serde_json::Value = serde_json::from_str(&lines[line]).unwrap();
    edit(&mut value);
    lines[line] = serde_json::to_string(&value).unwrap();
    std::fs::write(path, lines.join("\n") + "\n").unwrap();
}

/// Write a valid chain of entries aged `days_ago`, one file per entry, the
/// way an older deployment would have left them.
fn write_aged_chain(dir: &Path, owner: &str, aged: &[(i64, EventType)]) -> String {
    let owner_dir = dir.join(owner);
    std::fs::create_dir_all(&owner_dir).unwrap();

    let mut previous_hash = String::new();
    for (seq, (days_ago, event_type)) in aged.iter().enumerate() {
        let timestamp = (Utc::now() - Duration::days(*days_ago)).trunc_subsecs(6);
        let mut entry = AuditEntry {
            event_id: format!("0000000{seq}-aged"),
            timestamp,
            event_type: *event_type,
            owner_id: owner.to_string(),
            actor_id: None,
            severity: Severity::Info,
            description: format!("aged entry {seq}"),
            metadata: BTreeMap::new(),
            previous_hash: previous_hash.clone(),
            hash: String::new(),
        };
        entry.hash = entry.compute_hash();

        let day = entry.timestamp.format("%Y%m%d");
        let path = owner_dir.join(format!("audit_{day}_{:04}.jsonl", seq + 1));
        std::fs::write(&path, serde_json::to_string(&entry).unwrap() + "\n").unwrap();
        previous_hash = entry.hash;
    }
    previous_hash
}

// ═══════════════════════════════════════════════════════════════════════
//  Append and verify
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn tampered_description_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let chain = open_chain(dir.path());

    chain
        .log(AuditEvent::new(EventType::AuthSuccess, "acme", "alice signed in"))
        .unwrap();
    let middle = chain
        .log(AuditEvent::new(EventType::SecretAccessed, "acme", "read crm/api_key"))
        .unwrap();
    chain
        .log(AuditEvent::new(EventType::ConfigChange, "acme", "rotated webhook"))
        .unwrap();
    assert!(chain.verify_chain("acme").unwrap());

    let files = log_files(dir.path(), "acme");
    assert_eq!(files.len(), 1);
    edit_line(&files[0], 1, |entry| {
        entry["description"] = "read crm/api_kez".into();
    });

    assert!(!chain.verify_chain("acme").unwrap());
    let report = chain.verify_chain_report("acme").unwrap();
    let violation = report.violation().unwrap();
    assert!(matches!(violation.kind, ViolationKind::HashMismatch { .. }));
    assert_eq!(violation.event_id.as_deref(), Some(middle.as_str()));
    assert_eq!(violation.line, 2);
    assert_eq!(report.entries_checked, 1);
}

#[test]
fn tampered_hash_link_and_metadata_are_detected() {
    let edits: Vec<Box<dyn Fn(&mut serde_json::Value)>> = vec![
        Box::new(|e: &mut serde_json::Value| e["hash"] = "00".repeat(32).into()),
        Box::new(|e: &mut serde_json::Value| e["previous_hash"] = "ff".repeat(32).into()),
        Box::new(|e: &mut serde_json::Value| e["metadata"]["category"] = "billing".into()),
    ];

    for edit in edits {
        let dir = tempfile::tempdir().unwrap();
        let chain = open_chain(dir.path());
        for i in 0..3 {
            chain
                .log(
                    AuditEvent::new(EventType::SecretStored, "acme", format!("stored {i}"))
                        .meta("category", "crm"),
                )
                .unwrap();
        }

        let files = log_files(dir.path(), "acme");
        edit_line(&files[0], 1, |entry| edit(entry));
        assert!(!chain.verify_chain("acme").unwrap());
    }
}

#[test]
fn deleted_entry_breaks_the_chain() {
    let dir = tempfile::tempdir().unwrap();
    let chain = open_chain(dir.path());
    for i in 0..3 {
        chain
            .log(AuditEvent::new(EventType::DataAccess, "acme", format!("read {i}")))
            .unwrap();
    }

    let path = &log_files(dir.path(), "acme")[0];
    let content = std::fs::read_to_string(path).unwrap();
    let kept: Vec<&str> = content
        .lines()
        .enumerate()
        .filter(|(i, _)| *i != 1)
        .map(|(_, line)| line)
        .collect();
    std::fs::write(path, kept.join("\n") + "\n").unwrap();

    let report = chain.verify_chain_report("acme").unwrap();
    assert!(matches!(
        report.violation().unwrap().kind,
        ViolationKind::BrokenLink { .. }
    ));
}

#[test]
fn chain_continues_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    open_chain(dir.path())
        .log(AuditEvent::new(EventType::SystemEvent, "acme", "boot"))
        .unwrap();

    let chain = open_chain(dir.path());
    chain
        .log(AuditEvent::new(EventType::SystemEvent, "acme", "boot again"))
        .unwrap();

    let entries = chain.get("acme", &AuditQuery::new()).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].previous_hash, entries[0].hash);
    assert!(chain.verify_chain("acme").unwrap());
}

#[test]
fn chain_continues_across_rotation() {
    let dir = tempfile::tempdir().unwrap();
    let config = AuditConfig::new()
        .with_audit_dir(dir.path())
        .with_max_file_bytes(600);
    let chain = AuditChain::open(&config).unwrap();

    for i in 0..10 {
        chain
            .log(AuditEvent::new(EventType::ToolExecution, "acme", format!("tool run {i}")))
            .unwrap();
    }

    assert!(log_files(dir.path(), "acme").len() > 1);
    let report = chain.verify_chain_report("acme").unwrap();
    assert!(report.is_intact());
    assert_eq!(report.entries_checked, 10);
}

#[test]
fn owners_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let chain = open_chain(dir.path());

    chain
        .log(AuditEvent::new(EventType::DataAccess, "acme", "a1"))
        .unwrap();
    chain
        .log(AuditEvent::new(EventType::DataAccess, "globex", "g1"))
        .unwrap();
    chain
        .log(AuditEvent::new(EventType::DataAccess, "acme", "a2"))
        .unwrap();

    let acme = chain.get("acme", &AuditQuery::new()).unwrap();
    let globex = chain.get("globex", &AuditQuery::new()).unwrap();
    assert_eq!(acme.len(), 2);
    assert_eq!(globex.len(), 1);
    assert!(globex[0].previous_hash.is_empty());
    assert_eq!(acme[1].previous_hash, acme[0].hash);

    edit_line(&log_files(dir.path(), "globex")[0], 0, |e| {
        e["description"] = "forged".into();
    });
    assert!(!chain.verify_chain("globex").unwrap());
    assert!(chain.verify_chain("acme").unwrap());
}

#[test]
fn entry_moved_between_owners_is_foreign() {
    let dir = tempfile::tempdir().unwrap();
    let chain = open_chain(dir.path());
    chain
        .log(AuditEvent::new(EventType::DataAccess, "globex", "g1"))
        .unwrap();

    let globex_file = &log_files(dir.path(), "globex")[0];
    std::fs::create_dir_all(dir.path().join("acme")).unwrap();
    std::fs::copy(globex_file, dir.path().join("acme").join("audit_20260101_0001.jsonl")).unwrap();

    let report = chain.verify_chain_report("acme").unwrap();
    assert!(matches!(
        report.violation().unwrap().kind,
        ViolationKind::ForeignOwner { .. }
    ));
}

#[test]
fn stem_of_another_owner_gets_its_own_chain() {
    let dir = tempfile::tempdir().unwrap();
    let chain = open_chain(dir.path());
    let stem = custodian_store::owner_file_stem("a.b").unwrap();

    chain
        .log(AuditEvent::new(EventType::DataAccess, "a.b", "victim"))
        .unwrap();
    chain
        .log(AuditEvent::new(EventType::DataAccess, stem.as_str(), "crafted"))
        .unwrap();

    let victim = chain.verify_chain_report("a.b").unwrap();
    assert!(victim.is_intact());
    assert_eq!(victim.entries_checked, 1);

    let crafted = chain.get(&stem, &AuditQuery::new()).unwrap();
    assert_eq!(crafted.len(), 1);
    assert_eq!(crafted[0].description, "crafted");
    assert!(crafted[0].previous_hash.is_empty());

    let mut expected = vec!["a.b".to_string(), stem];
    expected.sort();
    assert_eq!(chain.owners().unwrap(), expected);
}

#[test]
fn foreign_chain_in_owner_directory_blocks_append() {
    let dir = tempfile::tempdir().unwrap();
    {
        let chain = open_chain(dir.path());
        chain
            .log(AuditEvent::new(EventType::DataAccess, "globex", "g1"))
            .unwrap();
    }
    // Put globex's chain where acme's would live.
    std::fs::rename(dir.path().join("globex"), dir.path().join("acme")).unwrap();

    let chain = open_chain(dir.path());
    let result = chain.log(AuditEvent::new(EventType::DataAccess, "acme", "a1"));
    assert!(matches!(
        result,
        Err(custodian_audit::AuditError::OwnerCollision { .. })
    ));
    assert!(chain.get("acme", &AuditQuery::new()).unwrap().is_empty());
    assert!(!chain.verify_chain("acme").unwrap());
}

// ═══════════════════════════════════════════════════════════════════════
//  Retrieval
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn get_filters_and_limits() {
    let dir = tempfile::tempdir().unwrap();
    let chain = open_chain(dir.path());

    chain
        .log(AuditEvent::new(EventType::AuthFailure, "acme", "bad token").actor("bob"))
        .unwrap();
    chain
        .log(AuditEvent::new(EventType::AuthSuccess, "acme", "ok").actor("bob"))
        .unwrap();
    chain
        .log(AuditEvent::new(EventType::AuthFailure, "acme", "bad token").actor("eve"))
        .unwrap();
    chain
        .log(AuditEvent::new(EventType::AuthFailure, "acme", "bad token").actor("bob"))
        .unwrap();

    let failures = chain
        .get("acme", &AuditQuery::new().event_type(EventType::AuthFailure))
        .unwrap();
    assert_eq!(failures.len(), 3);

    let bob = chain
        .get(
            "acme",
            &AuditQuery::new().event_type(EventType::AuthFailure).actor("bob"),
        )
        .unwrap();
    assert_eq!(bob.len(), 2);

    let first_two = chain.get("acme", &AuditQuery::new().limit(2)).unwrap();
    assert_eq!(first_two.len(), 2);
    assert_eq!(first_two[0].event_type, EventType::AuthFailure);
    assert_eq!(first_two[1].event_type, EventType::AuthSuccess);

    let future = chain
        .get("acme", &AuditQuery::new().since(Utc::now() + Duration::hours(1)))
        .unwrap();
    assert!(future.is_empty());

    assert!(chain.get("nobody", &AuditQuery::new()).unwrap().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════
//  Retention
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn purge_removes_aged_files_and_keeps_chain_verifiable() {
    let dir = tempfile::tempdir().unwrap();
    let last_aged = write_aged_chain(
        dir.path(),
        "acme",
        &[(120, EventType::DataAccess), (90, EventType::DataAccess)],
    );

    let chain = open_chain(dir.path());
    chain
        .log(AuditEvent::new(EventType::DataAccess, "acme", "fresh"))
        .unwrap();
    assert!(chain.verify_chain("acme").unwrap());

    let report = chain.purge(30).unwrap();
    assert_eq!(report.files_removed, 2);
    assert_eq!(report.entries_removed, 2);
    assert_eq!(report.owners_affected, vec!["acme"]);

    assert!(dir.path().join("acme").join(ANCHOR_FILE).exists());
    let entries = chain.get("acme", &AuditQuery::new()).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].previous_hash, last_aged);

    assert!(chain.verify_chain("acme").unwrap());

    // Appends after the purge still link to the retained head.
    chain
        .log(AuditEvent::new(EventType::DataAccess, "acme", "after purge"))
        .unwrap();
    assert!(chain.verify_chain("acme").unwrap());
    assert_eq!(chain.purge(30).unwrap().files_removed, 0);
}

#[test]
fn purge_everything_then_append_links_to_anchor() {
    let dir = tempfile::tempdir().unwrap();
    let last_aged = write_aged_chain(dir.path(), "acme", &[(200, EventType::SystemEvent)]);

    let chain = open_chain(dir.path());
    assert_eq!(chain.purge(30).unwrap().files_removed, 1);
    assert!(log_files(dir.path(), "acme").is_empty());
    assert!(chain.verify_chain("acme").unwrap());

    chain
        .log(AuditEvent::new(EventType::SystemEvent, "acme", "first after purge"))
        .unwrap();
    let entries = chain.get("acme", &AuditQuery::new()).unwrap();
    assert_eq!(entries[0].previous_hash, last_aged);
    assert!(chain.verify_chain("acme").unwrap());
}

#[test]
fn purge_stops_at_first_retained_file() {
    let dir = tempfile::tempdir().unwrap();
    // The compliance record in the middle must outlive the ordinary window,
    // which pins the file after it too.
    write_aged_chain(
        dir.path(),
        "acme",
        &[
            (400, EventType::DataAccess),
            (300, EventType::DataExport),
            (200, EventType::DataAccess),
        ],
    );

    let config = AuditConfig::new()
        .with_audit_dir(dir.path())
        .with_compliance_retention_days(365);
    let chain = AuditChain::open(&config).unwrap();

    let report = chain.purge(30).unwrap();
    assert_eq!(report.files_removed, 1);
    assert_eq!(log_files(dir.path(), "acme").len(), 2);
    assert!(chain.verify_chain("acme").unwrap());

    // Past the compliance window everything can go.
    let report = chain.purge(500).unwrap();
    assert_eq!(report.files_removed, 0);
    let config = config.with_compliance_retention_days(0);
    let chain = AuditChain::open(&config).unwrap();
    assert_eq!(chain.purge(100).unwrap().files_removed, 2);
    assert!(chain.verify_chain("acme").unwrap());
}

// ═══════════════════════════════════════════════════════════════════════
//  Export
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn export_is_logged_after_the_fact() {
    let dir = tempfile::tempdir().unwrap();
    let chain = open_chain(dir.path());
    chain
        .log(AuditEvent::new(EventType::ComplianceRequest, "acme", "DSAR received"))
        .unwrap();
    chain
        .log(AuditEvent::new(EventType::DataAccess, "acme", "read profile"))
        .unwrap();

    let export = chain.export("acme", None, None).unwrap();
    assert_eq!(export.format, EXPORT_FORMAT);
    assert_eq!(export.version, 1);
    assert_eq!(export.entry_count, 2);
    assert!(export.chain.chain_intact);
    assert_eq!(export.chain.head_hash, export.entries[1].hash);
    assert!(
        export
            .entries
            .iter()
            .all(|e| e.event_type != EventType::DataExport)
    );

    let all = chain.get("acme", &AuditQuery::new()).unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[2].event_type, EventType::DataExport);
    assert_eq!(all[2].previous_hash, export.chain.head_hash);
    assert!(chain.verify_chain("acme").unwrap());

    let json: serde_json::Value =
        serde_json::from_str(&export.to_json_pretty().unwrap()).unwrap();
    assert_eq!(json["format"], "custodian-audit-export");
    assert_eq!(json["entries"].as_array().unwrap().len(), 2);
}

#[test]
fn export_of_tampered_chain_says_so() {
    let dir = tempfile::tempdir().unwrap();
    let chain = open_chain(dir.path());
    chain
        .log(AuditEvent::new(EventType::DataAccess, "acme", "read"))
        .unwrap();
    edit_line(&log_files(dir.path(), "acme")[0], 0, |e| {
        e["severity"] = "critical".into();
    });

    let export = chain.export("acme", None, None).unwrap();
    assert!(!export.chain.chain_intact);
    assert_eq!(export.chain.entries_verified, 0);
}
