use std::path::{Path, PathBuf};

pub use keepalive_core::registry::keepalive_root;

pub const DAEMON_STDOUT_LOG: &str = "daemon.log";
pub const DAEMON_STDERR_LOG: &str = "daemon-err.log";
pub const DAEMON_SOCKET: &str = "keepalive.sock";
pub const CONFIG_FILE: &str = "config.toml";

pub fn run_dir(home: &Path) -> PathBuf {
    keepalive_root(home).join("run")
}

pub fn socket_path(home: &Path) -> PathBuf {
    keepalive_root(home).join(DAEMON_SOCKET)
}

pub fn config_path(home: &Path) -> PathBuf {
    keepalive_root(home).join(CONFIG_FILE)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    keepalive_root(home).join("logs")
}

pub fn stdout_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDOUT_LOG)
}

pub fn stderr_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDERR_LOG)
}
