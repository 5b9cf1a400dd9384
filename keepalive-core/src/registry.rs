//! Per-subject YAML registry.
//!
//! # Storage layout
//!
//! ```text
//! ~/.keepalive/
//!   subjects/
//!     <subject>.yaml          (one aggregate per subject, mode 0600)
//!   credentials/
//!     <subject>.token         (see `credentials`)
//! ```
//!
//! # API pattern
//!
//! Every function takes an explicit `home: &Path` (`fn_at(home, …)`). Callers
//! resolve the real home once via [`home_dir`]; tests pass a `TempDir`.
//!
//! A subject is always written back whole: repositories and activity log in
//! one atomic replace, so a crash never leaves a half-updated list on disk.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::activity::{ActivityAction, ActivityLogEntry};
use crate::error::StoreError;
use crate::types::{MonitoredRepository, MonitoringSubject, RepoSlug, SubjectId};

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.keepalive/`
pub fn keepalive_root(home: &Path) -> PathBuf {
    home.join(".keepalive")
}

/// `<home>/.keepalive/subjects/`
pub fn subjects_dir_at(home: &Path) -> PathBuf {
    keepalive_root(home).join("subjects")
}

/// `<home>/.keepalive/subjects/<subject>.yaml` (pure, no I/O).
pub fn subject_path_at(home: &Path, subject: &SubjectId) -> PathBuf {
    subjects_dir_at(home).join(format!("{}.yaml", subject.0))
}

/// Resolve the user's home directory.
pub fn home_dir() -> Result<PathBuf, StoreError> {
    dirs::home_dir().ok_or(StoreError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load one subject aggregate.
///
/// Returns `StoreError::SubjectNotFound` if absent,
/// `StoreError::Parse` (with path + line context) if malformed YAML.
pub fn load_subject_at(home: &Path, subject: &SubjectId) -> Result<MonitoringSubject, StoreError> {
    let path = subject_path_at(home, subject);
    if !path.exists() {
        return Err(StoreError::SubjectNotFound {
            subject: subject.0.clone(),
            path,
        });
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| StoreError::Parse { path, source: e })
}

/// Names of every stored subject, sorted. An absent registry is empty, not an error.
pub fn list_subject_ids_at(home: &Path) -> Result<Vec<SubjectId>, StoreError> {
    let dir = subjects_dir_at(home);
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "skipping unreadable registry entry");
                continue;
            }
        };
        match entry.file_type() {
            Ok(t) if t.is_file() => {}
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "skipping registry entry");
                continue;
            }
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(id) = name.strip_suffix(".yaml") {
            ids.push(SubjectId::from(id));
        }
    }
    ids.sort();
    Ok(ids)
}

/// Load every subject, sorted by id. Fails on the first malformed file.
pub fn list_subjects_at(home: &Path) -> Result<Vec<MonitoringSubject>, StoreError> {
    list_subject_ids_at(home)?
        .iter()
        .map(|id| load_subject_at(home, id))
        .collect()
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically replace the stored aggregate for `subject.id`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
/// The tmp file is removed again if any step after creating it fails.
pub fn save_subject_at(home: &Path, subject: &MonitoringSubject) -> Result<(), StoreError> {
    let dir = subjects_dir_at(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    let path = subject_path_at(home, &subject.id);
    let tmp_path = path.with_file_name(format!("{}.yaml.tmp", subject.id.0));

    let yaml = serde_yaml::to_string(subject)?;
    let written = std::fs::write(&tmp_path, yaml)
        .and_then(|()| set_file_permissions(&tmp_path))
        .and_then(|()| std::fs::rename(&tmp_path, &path));
    if let Err(e) = written {
        if tmp_path.is_file() {
            let _ = std::fs::remove_file(&tmp_path);
        }
        return Err(e.into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 4. Register
// ---------------------------------------------------------------------------

/// Create the aggregate for a subject whose credential has just validated.
///
/// Idempotent: an existing subject is returned unchanged.
pub fn register_subject_at(
    home: &Path,
    subject: &SubjectId,
    owner_identity: &str,
    now: DateTime<Utc>,
) -> Result<MonitoringSubject, StoreError> {
    if subject_path_at(home, subject).exists() {
        return load_subject_at(home, subject);
    }
    let created = MonitoringSubject::new(subject.clone(), owner_identity, now);
    save_subject_at(home, &created)?;
    Ok(created)
}

// ---------------------------------------------------------------------------
// 5. Repository management
// ---------------------------------------------------------------------------

/// Start monitoring `repo` for `subject`. Records `Repository Added`.
///
/// Returns `StoreError::DuplicateRepository` when owner+name is already present.
pub fn add_repository_at(
    home: &Path,
    subject: &SubjectId,
    repo: MonitoredRepository,
    now: DateTime<Utc>,
) -> Result<MonitoredRepository, StoreError> {
    update_subject_at(home, subject, now, |s| {
        if s.repository(&repo.slug()).is_some() {
            return Err(StoreError::DuplicateRepository {
                subject: subject.0.clone(),
                repo: repo.slug().to_string(),
            });
        }
        s.activity_log.record(ActivityLogEntry::new(
            repo.full_name.clone(),
            ActivityAction::RepositoryAdded,
            "Started monitoring this repository",
            true,
            now,
        ));
        s.repositories.push(repo.clone());
        Ok(repo)
    })
}

/// Stop monitoring `slug`. Records `Repository Removed`.
pub fn remove_repository_at(
    home: &Path,
    subject: &SubjectId,
    slug: &RepoSlug,
    now: DateTime<Utc>,
) -> Result<MonitoredRepository, StoreError> {
    update_subject_at(home, subject, now, |s| {
        let Some(index) = s.repositories.iter().position(|r| r.matches(slug)) else {
            return Err(repo_not_found(subject, slug));
        };
        let removed = s.repositories.remove(index);
        s.activity_log.record(ActivityLogEntry::new(
            removed.full_name.clone(),
            ActivityAction::RepositoryRemoved,
            "Stopped monitoring this repository",
            true,
            now,
        ));
        Ok(removed)
    })
}

/// Pause (`false`) or resume (`true`) one repository.
pub fn set_repository_active_at(
    home: &Path,
    subject: &SubjectId,
    slug: &RepoSlug,
    active: bool,
    now: DateTime<Utc>,
) -> Result<MonitoredRepository, StoreError> {
    update_subject_at(home, subject, now, |s| {
        let repo = s
            .repository_mut(slug)
            .ok_or_else(|| repo_not_found(subject, slug))?;
        repo.is_active = active;
        Ok(repo.clone())
    })
}

// ---------------------------------------------------------------------------
// 6. Monitoring gate and activity
// ---------------------------------------------------------------------------

/// Flip periodic-sweep participation and optionally the advisory interval.
///
/// An out-of-range interval is ignored. Records
/// `Background Monitoring Enabled` / `Background Monitoring Disabled`.
pub fn set_monitoring_at(
    home: &Path,
    subject: &SubjectId,
    enabled: bool,
    poll_interval_ms: Option<u64>,
    now: DateTime<Utc>,
) -> Result<MonitoringSubject, StoreError> {
    update_subject_at(home, subject, now, |s| {
        s.is_monitoring_enabled = enabled;
        if let Some(interval) = poll_interval_ms {
            s.set_poll_interval(interval);
        }
        let (action, message) = if enabled {
            (
                ActivityAction::MonitoringEnabled,
                "Background monitoring enabled",
            )
        } else {
            (
                ActivityAction::MonitoringDisabled,
                "Background monitoring disabled",
            )
        };
        s.activity_log
            .record(ActivityLogEntry::system(action, message, true, now));
        Ok(s.clone())
    })
}

/// Append one entry to a subject's log outside of a check cycle.
pub fn record_activity_at(
    home: &Path,
    subject: &SubjectId,
    entry: ActivityLogEntry,
) -> Result<(), StoreError> {
    let now = entry.timestamp;
    update_subject_at(home, subject, now, |s| {
        s.activity_log.record(entry);
        Ok(())
    })
}

/// Drop every activity entry for a subject.
pub fn clear_activity_at(
    home: &Path,
    subject: &SubjectId,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    update_subject_at(home, subject, now, |s| {
        s.activity_log.clear();
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Load → mutate → stamp `updated_at` → save. Nothing is written if `f` fails.
fn update_subject_at<T>(
    home: &Path,
    subject: &SubjectId,
    now: DateTime<Utc>,
    f: impl FnOnce(&mut MonitoringSubject) -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    let mut loaded = load_subject_at(home, subject)?;
    let out = f(&mut loaded)?;
    loaded.updated_at = now;
    save_subject_at(home, &loaded)?;
    Ok(out)
}

fn repo_not_found(subject: &SubjectId, slug: &RepoSlug) -> StoreError {
    StoreError::RepositoryNotFound {
        subject: subject.0.clone(),
        repo: slug.to_string(),
    }
}

#[cfg(unix)]
pub(crate) fn set_dir_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
}
#[cfg(not(unix))]
pub(crate) fn set_dir_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
pub(crate) fn set_file_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}
#[cfg(not(unix))]
pub(crate) fn set_file_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn alice() -> SubjectId {
        SubjectId::from("alice")
    }

    fn notes() -> RepoSlug {
        RepoSlug::new("alice", "notes").expect("slug")
    }

    #[test]
    fn subject_path_is_correct() {
        let home = TempDir::new().expect("tempdir");
        let path = subject_path_at(home.path(), &alice());
        assert!(path.ends_with(".keepalive/subjects/alice.yaml"));
    }

    #[test]
    fn register_is_idempotent() {
        let home = TempDir::new().expect("tempdir");
        let first = register_subject_at(home.path(), &alice(), "alice", Utc::now()).expect("first");
        let second =
            register_subject_at(home.path(), &alice(), "someone-else", Utc::now()).expect("second");
        assert_eq!(first, second);
        assert_eq!(second.owner_identity, "alice");
    }

    #[test]
    fn save_cleans_up_tmp_and_sets_mode() {
        let home = TempDir::new().expect("tempdir");
        register_subject_at(home.path(), &alice(), "alice", Utc::now()).expect("register");
        let path = subject_path_at(home.path(), &alice());
        assert!(!path.with_file_name("alice.yaml.tmp").exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn add_then_duplicate_is_rejected() {
        let home = TempDir::new().expect("tempdir");
        register_subject_at(home.path(), &alice(), "alice", Utc::now()).expect("register");
        let repo = MonitoredRepository::new(&notes(), "alice/notes");
        add_repository_at(home.path(), &alice(), repo.clone(), Utc::now()).expect("add");
        let err = add_repository_at(home.path(), &alice(), repo, Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateRepository { .. }));

        let loaded = load_subject_at(home.path(), &alice()).expect("load");
        assert_eq!(loaded.repositories.len(), 1);
        assert_eq!(
            loaded.activity_log.latest().map(|e| e.action),
            Some(ActivityAction::RepositoryAdded)
        );
    }

    #[test]
    fn remove_missing_repository_is_not_found() {
        let home = TempDir::new().expect("tempdir");
        register_subject_at(home.path(), &alice(), "alice", Utc::now()).expect("register");
        let err = remove_repository_at(home.path(), &alice(), &notes(), Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::RepositoryNotFound { .. }));
    }

    #[test]
    fn pause_and_resume_flip_is_active() {
        let home = TempDir::new().expect("tempdir");
        register_subject_at(home.path(), &alice(), "alice", Utc::now()).expect("register");
        add_repository_at(
            home.path(),
            &alice(),
            MonitoredRepository::new(&notes(), "alice/notes"),
            Utc::now(),
        )
        .expect("add");

        let paused =
            set_repository_active_at(home.path(), &alice(), &notes(), false, Utc::now()).expect("pause");
        assert!(!paused.is_active);
        let loaded = load_subject_at(home.path(), &alice()).expect("load");
        assert_eq!(loaded.active_repository_count(), 0);
    }

    #[test]
    fn monitoring_toggle_records_system_entry() {
        let home = TempDir::new().expect("tempdir");
        register_subject_at(home.path(), &alice(), "alice", Utc::now()).expect("register");
        let s = set_monitoring_at(home.path(), &alice(), true, Some(1_000), Utc::now()).expect("toggle");
        assert!(s.is_monitoring_enabled);
        assert_eq!(s.poll_interval_ms, crate::types::DEFAULT_POLL_INTERVAL_MS);
        let latest = s.activity_log.latest().expect("entry");
        assert_eq!(latest.action, ActivityAction::MonitoringEnabled);
        assert_eq!(latest.repo, crate::activity::SYSTEM_REPO);
    }

    #[test]
    fn list_subjects_empty_when_no_registry() {
        let home = TempDir::new().expect("tempdir");
        assert!(list_subject_ids_at(home.path()).expect("list").is_empty());
    }
}
