//! Sweep trigger authorization.

use sha2::{Digest, Sha256};

use keepalive_reconcile::ReconcileError;

/// Check the secret an external scheduler presented against the configured one.
///
/// Both sides are reduced to SHA-256 digests before comparison so the check
/// does not depend on secret length.
pub fn authorize_sweep(
    configured: Option<&str>,
    presented: Option<&str>,
) -> Result<(), ReconcileError> {
    let configured = configured.filter(|s| !s.is_empty()).ok_or_else(|| {
        ReconcileError::Configuration("sweep secret is not configured".to_string())
    })?;
    let presented = presented.ok_or(ReconcileError::Unauthorized)?;

    if digest(configured) == digest(presented) {
        Ok(())
    } else {
        Err(ReconcileError::Unauthorized)
    }
}

/// Short hex fingerprint of the configured secret, safe to show in status output.
pub fn secret_fingerprint(secret: &str) -> String {
    hex::encode(&digest(secret)[..6])
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_secret_is_accepted() {
        assert!(authorize_sweep(Some("s3cret"), Some("s3cret")).is_ok());
    }

    #[test]
    fn wrong_or_missing_secret_is_unauthorized() {
        assert!(matches!(
            authorize_sweep(Some("s3cret"), Some("guess")),
            Err(ReconcileError::Unauthorized)
        ));
        assert!(matches!(
            authorize_sweep(Some("s3cret"), None),
            Err(ReconcileError::Unauthorized)
        ));
    }

    #[test]
    fn unconfigured_secret_is_a_configuration_error() {
        assert!(matches!(
            authorize_sweep(None, Some("anything")),
            Err(ReconcileError::Configuration(_))
        ));
        assert!(matches!(
            authorize_sweep(Some(""), Some("")),
            Err(ReconcileError::Configuration(_))
        ));
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        assert_eq!(secret_fingerprint("abc"), secret_fingerprint("abc"));
        assert_eq!(secret_fingerprint("abc").len(), 12);
        assert_ne!(secret_fingerprint("abc"), secret_fingerprint("abd"));
    }
}
