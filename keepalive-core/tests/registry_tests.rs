//! Registry error-message, atomic-write, and activity-log persistence tests.
//! Storage: ~/.keepalive/subjects/<subject>.yaml

use assert_fs::prelude::*;
use chrono::Utc;
use keepalive_core::{
    registry, ActivityAction, ActivityLogEntry, MonitoredRepository, MonitoringSubject, RepoSlug,
    StoreError, SubjectId, SYSTEM_REPO,
};
use predicates::prelude::predicate;
use std::fs;

fn alice() -> SubjectId {
    SubjectId::from("alice")
}

fn slug(name: &str) -> RepoSlug {
    RepoSlug::new("alice", name).expect("slug")
}

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_subject_returns_not_found() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let err = registry::load_subject_at(home.path(), &alice()).unwrap_err();
    assert!(matches!(err, StoreError::SubjectNotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("alice.yaml"));
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let dir = home.path().join(".keepalive").join("subjects");
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join("alice.yaml"), b": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = registry::load_subject_at(home.path(), &alice()).unwrap_err();
    assert!(matches!(err, StoreError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("alice.yaml"));
}

// ---------------------------------------------------------------------------
// 2. Atomic write
// ---------------------------------------------------------------------------

#[test]
fn register_writes_subject_file_without_tmp_leftover() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    registry::register_subject_at(home.path(), &alice(), "alice", Utc::now()).expect("register");

    let file = home.child(".keepalive/subjects/alice.yaml");
    file.assert(predicate::path::exists());
    file.assert(predicate::str::contains("owner_identity: alice"));
    home.child(".keepalive/subjects/alice.yaml.tmp")
        .assert(predicate::path::missing());
}

#[test]
fn failed_save_removes_tmp_file() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    // A directory in the way makes the final rename fail.
    home.child(".keepalive/subjects/alice.yaml/keep").touch().expect("blocker");

    let subject = MonitoringSubject::new(alice(), "alice", Utc::now());
    registry::save_subject_at(home.path(), &subject).unwrap_err();

    home.child(".keepalive/subjects/alice.yaml.tmp")
        .assert(predicate::path::missing());
    home.child(".keepalive/subjects/alice.yaml").assert(predicate::path::is_dir());
}

#[test]
fn failed_mutation_leaves_file_untouched() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    registry::register_subject_at(home.path(), &alice(), "alice", Utc::now()).expect("register");
    let path = registry::subject_path_at(home.path(), &alice());
    let before = fs::read_to_string(&path).expect("read");

    let err = registry::set_repository_active_at(home.path(), &alice(), &slug("ghost"), false, Utc::now())
        .unwrap_err();
    assert!(matches!(err, StoreError::RepositoryNotFound { .. }));
    assert_eq!(fs::read_to_string(&path).expect("read"), before);
}

// ---------------------------------------------------------------------------
// 3. Repository list and activity log persist together
// ---------------------------------------------------------------------------

#[test]
fn add_and_remove_are_logged_newest_first() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    registry::register_subject_at(home.path(), &alice(), "alice", Utc::now()).expect("register");

    for name in ["one", "two"] {
        let s = slug(name);
        registry::add_repository_at(
            home.path(),
            &alice(),
            MonitoredRepository::new(&s, s.full_name()),
            Utc::now(),
        )
        .expect("add");
    }
    registry::remove_repository_at(home.path(), &alice(), &slug("one"), Utc::now()).expect("remove");

    let subject = registry::load_subject_at(home.path(), &alice()).expect("load");
    assert_eq!(subject.repositories.len(), 1);
    assert_eq!(subject.repositories[0].full_name, "alice/two");

    let actions: Vec<_> = subject.activity_log.iter().map(|e| (e.repo.as_str(), e.action)).collect();
    assert_eq!(
        actions,
        vec![
            ("alice/one", ActivityAction::RepositoryRemoved),
            ("alice/two", ActivityAction::RepositoryAdded),
            ("alice/one", ActivityAction::RepositoryAdded),
        ]
    );
}

#[test]
fn activity_log_stays_capped_across_saves() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    registry::register_subject_at(home.path(), &alice(), "alice", Utc::now()).expect("register");
    for n in 0..55 {
        registry::record_activity_at(
            home.path(),
            &alice(),
            ActivityLogEntry::system(ActivityAction::PollError, format!("poll {n}"), false, Utc::now()),
        )
        .expect("record");
    }
    let subject = registry::load_subject_at(home.path(), &alice()).expect("load");
    assert_eq!(subject.activity_log.len(), 50);
    let latest = subject.activity_log.latest().expect("latest");
    assert_eq!(latest.message, "poll 54");
    assert_eq!(latest.repo, SYSTEM_REPO);
}

#[test]
fn clear_activity_empties_log_but_keeps_repositories() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    registry::register_subject_at(home.path(), &alice(), "alice", Utc::now()).expect("register");
    let s = slug("notes");
    registry::add_repository_at(home.path(), &alice(), MonitoredRepository::new(&s, s.full_name()), Utc::now())
        .expect("add");
    registry::clear_activity_at(home.path(), &alice(), Utc::now()).expect("clear");

    let subject = registry::load_subject_at(home.path(), &alice()).expect("load");
    assert!(subject.activity_log.is_empty());
    assert_eq!(subject.repositories.len(), 1);
}

#[test]
fn list_subject_ids_is_sorted_and_ignores_other_files() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    for id in ["zed", "alice", "mike"] {
        registry::register_subject_at(home.path(), &SubjectId::from(id), id, Utc::now()).expect("register");
    }
    home.child(".keepalive/subjects/notes.txt").write_str("ignore me").expect("write");
    home.child(".keepalive/subjects/archive.yaml/old.yaml").touch().expect("nested");

    let ids = registry::list_subject_ids_at(home.path()).expect("list");
    let names: Vec<_> = ids.iter().map(|id| id.0.as_str()).collect();
    assert_eq!(names, vec!["alice", "mike", "zed"]);
}
