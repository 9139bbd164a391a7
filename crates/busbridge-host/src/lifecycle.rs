//! Host lifecycle: well-known paths, PID file, liveness checks.

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Socket path for the host service channel.
pub fn socket_path() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("busbridge")
        .join("host.sock")
}

/// PID file path.
pub fn pid_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("busbridge")
        .join("host.pid")
}

/// Root directory for the durable onboarding containers.
pub fn store_dir() -> PathBuf {
    data_dir().join("onboarded")
}

/// Sharing-token vault directory. Durable: replay resolves tokens again
/// after a host restart.
pub fn vault_dir() -> PathBuf {
    data_dir().join("vault")
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("busbridge")
}

/// Write PID file.
pub fn write_pid_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, std::process::id().to_string())?;
    Ok(())
}

/// Remove PID file.
pub fn remove_pid_file(path: &Path) {
    let _ = fs::remove_file(path);
}

/// Check whether a host is running by reading the PID file and /proc.
pub fn is_host_running_at(path: &Path) -> bool {
    if let Ok(contents) = fs::read_to_string(path) {
        if let Ok(pid) = contents.trim().parse::<u32>() {
            return Path::new(&format!("/proc/{}", pid)).exists();
        }
    }
    false
}

/// Remove socket file if it exists.
pub fn remove_socket(path: &Path) {
    let _ = fs::remove_file(path);
}
