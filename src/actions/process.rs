//! Process spawn and signal helpers shared by the lifecycle actions.

use std::io::{Error, ErrorKind};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Spawn a detached cluster process and return its pid.
///
/// The child handle is dropped; from here on the process is tracked by pid
/// only. Output goes to `log` when given, otherwise it is discarded.
pub fn spawn_detached(
    binary: &Path,
    args: &[String],
    log: Option<&Path>,
) -> std::io::Result<u32> {
    let mut command = Command::new(binary);
    command.args(args).stdin(Stdio::null());

    match log {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            command.stdout(Stdio::from(file.try_clone()?));
            command.stderr(Stdio::from(file));
        }
        None => {
            command.stdout(Stdio::null());
            command.stderr(Stdio::null());
        }
    }

    let child = command.spawn()?;
    child
        .id()
        .ok_or_else(|| Error::new(ErrorKind::Other, "spawned process has no pid"))
}

/// True if a process with this pid still exists.
pub fn is_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

/// Ask a process to terminate. The process may already be gone.
pub fn terminate(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

/// Kill a process outright. The process may already be gone.
pub fn force_kill(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }
}

/// Remove a directory tree, treating absence as success.
pub async fn wipe_dir(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Remove a file, treating absence as success.
pub async fn wipe_file(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wipe_dir_is_idempotent() {
        let scratch = tempfile::tempdir().expect("Failed to create temp dir");
        let target = scratch.path().join("data-x");
        tokio::fs::create_dir_all(&target)
            .await
            .expect("Failed to create target");

        wipe_dir(&target).await.expect("First wipe failed");
        wipe_dir(&target).await.expect("Second wipe failed");
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_wipe_file_accepts_missing_path() {
        let scratch = tempfile::tempdir().expect("Failed to create temp dir");
        wipe_file(&scratch.path().join("no-such-log"))
            .await
            .expect("Wipe of missing file failed");
    }

    #[tokio::test]
    async fn test_spawn_detached_returns_pid() {
        let pid = spawn_detached(Path::new("/bin/sh"), &["-c".to_string(), "exit 0".to_string()], None)
            .expect("Failed to spawn");
        assert!(pid > 0);
    }
}
