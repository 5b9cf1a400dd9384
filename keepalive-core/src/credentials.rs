//! Per-subject credential files under `~/.keepalive/credentials/`.
//!
//! One token per file, mode 0600. The store being absent as a whole is a
//! different failure from one subject's token being absent: a sweep aborts on
//! the former and records a per-subject error for the latter.

use std::path::{Path, PathBuf};

use crate::error::CredentialError;
use crate::registry::{keepalive_root, set_dir_permissions, set_file_permissions};
use crate::types::{Credential, SubjectId};

/// `<home>/.keepalive/credentials/`
pub fn credentials_dir_at(home: &Path) -> PathBuf {
    keepalive_root(home).join("credentials")
}

/// `<home>/.keepalive/credentials/<subject>.token`
pub fn credential_path_at(home: &Path, subject: &SubjectId) -> PathBuf {
    credentials_dir_at(home).join(format!("{}.token", subject.0))
}

/// Check the store directory exists and is a directory.
pub fn ensure_available_at(home: &Path) -> Result<(), CredentialError> {
    let dir = credentials_dir_at(home);
    match std::fs::metadata(&dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(CredentialError::StoreUnavailable {
            path: dir,
            reason: "not a directory".to_string(),
        }),
        Err(e) => Err(CredentialError::StoreUnavailable {
            path: dir,
            reason: e.to_string(),
        }),
    }
}

/// Atomically write `credential` for `subject` (`.token.tmp` → rename).
pub fn store_credential_at(
    home: &Path,
    subject: &SubjectId,
    credential: &Credential,
) -> Result<(), CredentialError> {
    let dir = credentials_dir_at(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        set_dir_permissions(&dir).map_err(|e| io_err(&dir, e))?;
    }
    let path = credential_path_at(home, subject);
    let tmp = path.with_file_name(format!("{}.token.tmp", subject.0));
    std::fs::write(&tmp, credential.expose()).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    Ok(())
}

/// Read the token for `subject`. Surrounding whitespace is trimmed.
pub fn load_credential_at(home: &Path, subject: &SubjectId) -> Result<Credential, CredentialError> {
    ensure_available_at(home)?;
    let path = credential_path_at(home, subject);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CredentialError::Missing {
                subject: subject.0.clone(),
            })
        }
        Err(e) => return Err(io_err(&path, e)),
    };
    let token = raw.trim();
    if token.is_empty() || token.chars().any(char::is_whitespace) {
        return Err(CredentialError::Malformed {
            subject: subject.0.clone(),
        });
    }
    Ok(Credential::new(token))
}

/// Delete a stored token. Absent is not an error.
pub fn remove_credential_at(home: &Path, subject: &SubjectId) -> Result<(), CredentialError> {
    let path = credential_path_at(home, subject);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(&path, e)),
    }
}

fn io_err(path: &Path, source: std::io::Error) -> CredentialError {
    CredentialError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_store_is_unavailable() {
        let home = TempDir::new().expect("tempdir");
        let err = load_credential_at(home.path(), &SubjectId::from("alice")).unwrap_err();
        assert!(matches!(err, CredentialError::StoreUnavailable { .. }));
    }

    #[test]
    fn missing_token_is_distinct_from_missing_store() {
        let home = TempDir::new().expect("tempdir");
        store_credential_at(home.path(), &SubjectId::from("bob"), &Credential::new("t"))
            .expect("store");
        let err = load_credential_at(home.path(), &SubjectId::from("alice")).unwrap_err();
        assert!(matches!(err, CredentialError::Missing { .. }));
    }

    #[test]
    fn store_then_load_trims_newline() {
        let home = TempDir::new().expect("tempdir");
        let alice = SubjectId::from("alice");
        std::fs::create_dir_all(credentials_dir_at(home.path())).unwrap();
        std::fs::write(credential_path_at(home.path(), &alice), "ghp_abc\n").unwrap();
        let cred = load_credential_at(home.path(), &alice).expect("load");
        assert_eq!(cred.expose(), "ghp_abc");
    }

    #[test]
    fn blank_token_is_malformed() {
        let home = TempDir::new().expect("tempdir");
        let alice = SubjectId::from("alice");
        std::fs::create_dir_all(credentials_dir_at(home.path())).unwrap();
        std::fs::write(credential_path_at(home.path(), &alice), "  \n").unwrap();
        let err = load_credential_at(home.path(), &alice).unwrap_err();
        assert!(matches!(err, CredentialError::Malformed { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn stored_token_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let home = TempDir::new().expect("tempdir");
        let alice = SubjectId::from("alice");
        store_credential_at(home.path(), &alice, &Credential::new("ghp_abc")).expect("store");
        let mode = std::fs::metadata(credential_path_at(home.path(), &alice))
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600);
    }
}
