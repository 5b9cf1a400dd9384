use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use keepalive_reconcile::ReconcileError;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

/// JSON newline-delimited request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub cmd: String,
    /// Calling subject for `check`. Absent means unauthenticated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Shared secret for `sweep`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl DaemonRequest {
    pub fn new(cmd: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
            ..Self::default()
        }
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable failure class, see [`error_code`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

pub const CODE_UNAUTHENTICATED: &str = "unauthenticated";
pub const CODE_NOT_FOUND: &str = "not_found";
pub const CODE_CREDENTIAL_INVALID: &str = "credential_invalid";
pub const CODE_RATE_LIMITED: &str = "rate_limited";
pub const CODE_UNAUTHORIZED: &str = "unauthorized";
pub const CODE_CONFIGURATION: &str = "configuration";
pub const CODE_BAD_REQUEST: &str = "bad_request";
pub const CODE_INTERNAL: &str = "internal";

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
            code: Some(code.to_string()),
        }
    }

    pub fn from_reconcile_error(err: &ReconcileError) -> Self {
        Self::error(error_code(err), err.to_string())
    }
}

pub fn error_code(err: &ReconcileError) -> &'static str {
    match err {
        ReconcileError::Unauthenticated => CODE_UNAUTHENTICATED,
        e if e.is_not_found() => CODE_NOT_FOUND,
        ReconcileError::CredentialInvalid { .. } => CODE_CREDENTIAL_INVALID,
        ReconcileError::Unauthorized => CODE_UNAUTHORIZED,
        ReconcileError::Configuration(_) => CODE_CONFIGURATION,
        _ => CODE_INTERNAL,
    }
}

/// Send one JSON request to the daemon socket and return one response.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }

    let mut stream = UnixStream::connect(&socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    })?;

    let mut payload = serde_json::to_string(request)?;
    payload.push('\n');
    stream
        .write_all(payload.as_bytes())
        .and_then(|()| stream.flush())
        .map_err(|e| io_err(&socket, e))?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }

    Ok(serde_json::from_str(line.trim_end())?)
}

/// Status with a short retry window, for use right after `daemon start`.
pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let request = DaemonRequest::new("status");

    let mut attempts_left = 5;
    loop {
        match send_request(home, &request) {
            Ok(response) => return response_into_data(response),
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                attempts_left -= 1;
                if attempts_left == 0 {
                    return Err(err);
                }
                sleep(Duration::from_millis(100));
            }
            Err(err) => return Err(err),
        }
    }
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    let response = send_request(home, &DaemonRequest::new("stop"))?;
    response_into_data(response).map(|_| ())
}

/// Run one check cycle for `subject` inside the daemon.
pub fn request_check(home: &Path, subject: Option<&str>) -> Result<Value, DaemonError> {
    let request = DaemonRequest {
        subject: subject.map(str::to_string),
        ..DaemonRequest::new("check")
    };
    response_into_data(send_request(home, &request)?)
}

/// Ask the daemon to sweep every monitoring-enabled subject.
pub fn request_sweep(home: &Path, secret: Option<&str>) -> Result<Value, DaemonError> {
    let request = DaemonRequest {
        secret: secret.map(str::to_string),
        ..DaemonRequest::new("sweep")
    };
    response_into_data(send_request(home, &request)?)
}

fn response_into_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Rejected {
            code: response.code.unwrap_or_else(|| CODE_INTERNAL.to_string()),
            message: response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn request_omits_absent_fields() {
        let encoded = serde_json::to_string(&DaemonRequest::new("status")).expect("encode");
        assert_eq!(encoded, r#"{"cmd":"status"}"#);
    }

    #[test]
    fn request_accepts_bare_command() {
        let request: DaemonRequest = serde_json::from_str(r#"{"cmd":"check"}"#).expect("decode");
        assert_eq!(request.cmd, "check");
        assert!(request.subject.is_none());
    }

    #[test]
    fn error_codes_follow_reconcile_errors() {
        assert_eq!(error_code(&ReconcileError::Unauthenticated), CODE_UNAUTHENTICATED);
        assert_eq!(
            error_code(&ReconcileError::SubjectNotFound("x".into())),
            CODE_NOT_FOUND
        );
        assert_eq!(error_code(&ReconcileError::Unauthorized), CODE_UNAUTHORIZED);
        assert_eq!(
            error_code(&ReconcileError::Configuration("no secret".into())),
            CODE_CONFIGURATION
        );
        assert_eq!(error_code(&ReconcileError::Join("boom".into())), CODE_INTERNAL);
    }

    #[test]
    fn rejected_response_keeps_code() {
        let err = response_into_data(DaemonResponse::error(CODE_RATE_LIMITED, "slow down"))
            .unwrap_err();
        assert_eq!(err.code(), Some(CODE_RATE_LIMITED));
        assert_eq!(err.to_string(), "slow down");
    }

    #[test]
    fn missing_socket_means_not_running() {
        let home = TempDir::new().expect("home");
        let err = send_request(home.path(), &DaemonRequest::new("status")).unwrap_err();
        assert!(matches!(err, DaemonError::DaemonNotRunning { .. }));
    }
}
