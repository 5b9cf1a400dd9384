//! Scripted in-memory source host plus home-directory fixtures.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use keepalive_core::{credentials, registry, MonitoredRepository, RepoSlug, SubjectId};
use keepalive_host::{
    CommitInfo, Credential, FileWrite, HostError, HostIdentity, RepoInfo, SourceHost, TrackedFile,
};

#[derive(Debug, Clone, Default)]
struct RepoState {
    /// Newest first.
    commits: Vec<CommitInfo>,
    readme: Option<String>,
    revision: u64,
    fail_list: Option<String>,
    hang_list: bool,
    reject_writes: bool,
    /// Simulates a concurrent writer: every read bumps the revision.
    bump_on_read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub repo: String,
    pub path: String,
    pub content: String,
    pub revision: String,
    pub message: String,
}

/// In-memory host. Successful writes add a commit authored by `writer`.
#[derive(Debug, Default)]
pub struct FakeHost {
    repos: Mutex<HashMap<String, RepoState>>,
    writes: Mutex<Vec<WriteRecord>>,
    identity: Mutex<Option<HostIdentity>>,
    writer: Mutex<String>,
    list_delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    list_calls: AtomicUsize,
}

impl FakeHost {
    pub fn new(writer: &str) -> Arc<Self> {
        let host = Self::default();
        *host.writer.lock().unwrap() = writer.to_string();
        *host.identity.lock().unwrap() = Some(HostIdentity {
            login: writer.to_string(),
            id: 1,
            name: None,
        });
        Arc::new(host)
    }

    fn with_repo<T>(&self, repo: &str, f: impl FnOnce(&mut RepoState) -> T) -> T {
        let mut repos = self.repos.lock().unwrap();
        f(repos.entry(repo.to_string()).or_default())
    }

    pub fn add_repo(&self, repo: &str) {
        self.with_repo(repo, |_| ());
    }

    pub fn push_commit(&self, repo: &str, sha: &str, author: &str) {
        self.with_repo(repo, |r| {
            r.commits.insert(
                0,
                CommitInfo {
                    sha: sha.into(),
                    author: author.into(),
                    message: format!("commit {sha}"),
                    date: Utc::now(),
                },
            )
        });
    }

    pub fn set_readme(&self, repo: &str, content: &str) {
        self.with_repo(repo, |r| {
            r.readme = Some(content.to_string());
            r.revision += 1;
        });
    }

    pub fn fail_commits(&self, repo: &str, message: &str) {
        self.with_repo(repo, |r| r.fail_list = Some(message.to_string()));
    }

    pub fn hang_commits(&self, repo: &str) {
        self.with_repo(repo, |r| r.hang_list = true);
    }

    pub fn reject_writes(&self, repo: &str) {
        self.with_repo(repo, |r| r.reject_writes = true);
    }

    pub fn bump_revision_on_read(&self, repo: &str) {
        self.with_repo(repo, |r| r.bump_on_read = true);
    }

    pub fn reject_credentials(&self) {
        *self.identity.lock().unwrap() = None;
    }

    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = Some(delay);
    }

    pub fn readme(&self, repo: &str) -> Option<String> {
        self.with_repo(repo, |r| r.readme.clone())
    }

    pub fn revision(&self, repo: &str) -> u64 {
        self.with_repo(repo, |r| r.revision)
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceHost for FakeHost {
    async fn list_recent_commits(
        &self,
        _credential: &Credential,
        repo: &RepoSlug,
        limit: u8,
    ) -> Result<Vec<CommitInfo>, HostError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.list_delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let state = self.with_repo(&repo.full_name(), |r| r.clone());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if state.hang_list {
            std::future::pending::<()>().await;
        }
        if let Some(message) = state.fail_list {
            return Err(HostError::Status {
                status: 500,
                message,
            });
        }
        Ok(state.commits.into_iter().take(limit as usize).collect())
    }

    async fn read_tracked_file(
        &self,
        _credential: &Credential,
        repo: &RepoSlug,
    ) -> Result<Option<TrackedFile>, HostError> {
        Ok(self.with_repo(&repo.full_name(), |r| {
            if r.bump_on_read {
                r.revision += 1;
            }
            r.readme.clone().map(|content| TrackedFile {
                path: "README.md".to_string(),
                content,
                revision: format!("rev{}", r.revision),
            })
        }))
    }

    async fn write_tracked_file(
        &self,
        _credential: &Credential,
        repo: &RepoSlug,
        write: &FileWrite,
    ) -> Result<(), HostError> {
        let writer = self.writer.lock().unwrap().clone();
        let full = repo.full_name();
        let outcome = self.with_repo(&full, |r| {
            if r.reject_writes {
                return Err(HostError::Status {
                    status: 403,
                    message: "Resource not accessible".into(),
                });
            }
            if write.revision != format!("rev{}", r.revision) {
                return Err(HostError::Conflict("sha does not match".into()));
            }
            r.readme = Some(write.content.clone());
            r.revision += 1;
            let sha = format!("keepalive-{}", r.revision);
            r.commits.insert(
                0,
                CommitInfo {
                    sha,
                    author: writer,
                    message: write.message.clone(),
                    date: Utc::now(),
                },
            );
            Ok(())
        });
        if outcome.is_ok() {
            self.writes.lock().unwrap().push(WriteRecord {
                repo: full,
                path: write.path.clone(),
                content: write.content.clone(),
                revision: write.revision.clone(),
                message: write.message.clone(),
            });
        }
        outcome
    }

    async fn validate_credential(
        &self,
        _credential: &Credential,
    ) -> Result<Option<HostIdentity>, HostError> {
        Ok(self.identity.lock().unwrap().clone())
    }

    async fn repository_info(
        &self,
        _credential: &Credential,
        repo: &RepoSlug,
    ) -> Result<Option<RepoInfo>, HostError> {
        let known = self.repos.lock().unwrap().contains_key(&repo.full_name());
        Ok(known.then(|| RepoInfo {
            full_name: repo.full_name(),
            name: repo.name.clone(),
            private: false,
            description: None,
        }))
    }
}

// ---------------------------------------------------------------------------
// Home fixtures
// ---------------------------------------------------------------------------

pub fn slug(full: &str) -> RepoSlug {
    full.parse().expect("slug")
}

/// Register `owner` with a stored credential and the given repositories,
/// each with optional tracked `(sha, author)`.
pub fn seed_subject(home: &Path, owner: &str, repos: &[(&str, Option<(&str, &str)>)]) -> SubjectId {
    let id = SubjectId::from(owner);
    registry::register_subject_at(home, &id, owner, Utc::now()).expect("register");
    credentials::store_credential_at(home, &id, &Credential::new(format!("token-{owner}")))
        .expect("credential");
    for (full, tracked) in repos {
        let s = slug(full);
        let mut repo = MonitoredRepository::new(&s, s.full_name());
        if let Some((sha, author)) = tracked {
            repo.commit(sha, author, Utc::now() - chrono::Duration::minutes(5));
        }
        registry::add_repository_at(home, &id, repo, Utc::now()).expect("add");
    }
    // Start each test with an empty log so assertions only see cycle output.
    registry::clear_activity_at(home, &id, Utc::now()).expect("clear");
    id
}

pub fn enable_monitoring(home: &Path, id: &SubjectId) {
    registry::set_monitoring_at(home, id, true, None, Utc::now()).expect("enable");
    registry::clear_activity_at(home, id, Utc::now()).expect("clear");
}
