//! Daemon Lifecycle
//!
//! Single-instance enforcement through two files in the state directory: a
//! PID file (`engram.pid`, ASCII decimal) and a JSON state file
//! (`engram.state`) describing the running instance. Liveness is probed with
//! signal 0 on Unix and a tasklist query on Windows.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use engram_core::{Config, EngineError, Result};

/// PID file name under the state directory.
const PID_FILE: &str = "engram.pid";
/// State file name under the state directory.
const STATE_FILE: &str = "engram.state";

/// How long stop waits for a graceful exit before killing.
const STOP_GRACE: Duration = Duration::from_secs(5);
/// Liveness poll interval while stopping.
const STOP_POLL: Duration = Duration::from_millis(100);

/// Contents of the state file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonState {
    pub pid: u32,
    pub start_time: DateTime<Utc>,
    pub version: String,
    pub rest_enabled: bool,
    pub rest_host: String,
    pub rest_port: u16,
    pub mcp_enabled: bool,
}

/// Status report for a running (or absent) daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<DaemonState>,
}

/// Handle over the lock files; removing them on drop covers panics too.
pub struct DaemonLock {
    pid_path: PathBuf,
    state_path: PathBuf,
}

impl DaemonLock {
    /// Acquire the single-instance lock and write both files.
    ///
    /// Fails with `Conflict` when another live instance holds the lock;
    /// stale files from a dead process are cleaned up silently.
    pub fn acquire(config: &Config, mcp_enabled: bool) -> Result<Self> {
        let dir = config.state_dir();
        std::fs::create_dir_all(&dir)?;
        let pid_path = dir.join(PID_FILE);
        let state_path = dir.join(STATE_FILE);

        if let Some(existing) = read_pid(&pid_path) {
            if is_process_alive(existing) {
                return Err(EngineError::Conflict(format!(
                    "daemon already running with pid {}",
                    existing
                )));
            }
            warn!(pid = existing, "Removing stale daemon files");
            remove_files(&pid_path, &state_path);
        }

        let pid = std::process::id();
        std::fs::write(&pid_path, pid.to_string())?;

        let state = DaemonState {
            pid,
            start_time: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            rest_enabled: config.rest_api.enabled,
            rest_host: config.rest_api.host.clone(),
            rest_port: config.rest_api.port,
            mcp_enabled,
        };
        std::fs::write(&state_path, serde_json::to_string_pretty(&state)?)?;

        info!(pid, "Daemon lock acquired");
        Ok(Self {
            pid_path,
            state_path,
        })
    }

    /// Remove both files. Also runs on drop.
    pub fn cleanup(&self) {
        remove_files(&self.pid_path, &self.state_path);
    }
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Stop a running daemon: SIGTERM, poll, then SIGKILL. Always removes the
/// lock files. Returns whether a process was actually signalled.
pub async fn stop(config: &Config) -> Result<bool> {
    let dir = config.state_dir();
    let pid_path = dir.join(PID_FILE);
    let state_path = dir.join(STATE_FILE);

    let Some(pid) = read_pid(&pid_path) else {
        return Ok(false);
    };

    if !is_process_alive(pid) {
        warn!(pid, "Daemon not running; cleaning up stale files");
        remove_files(&pid_path, &state_path);
        return Ok(false);
    }

    send_terminate(pid)?;
    info!(pid, "Sent terminate signal");

    let deadline = tokio::time::Instant::now() + STOP_GRACE;
    while tokio::time::Instant::now() < deadline {
        if !is_process_alive(pid) {
            remove_files(&pid_path, &state_path);
            return Ok(true);
        }
        tokio::time::sleep(STOP_POLL).await;
    }

    warn!(pid, "Daemon did not exit within grace period; killing");
    send_kill(pid)?;
    remove_files(&pid_path, &state_path);
    Ok(true)
}

/// Report the daemon's live state, cleaning up stale files on the way.
pub fn status(config: &Config) -> DaemonStatus {
    let dir = config.state_dir();
    let pid_path = dir.join(PID_FILE);
    let state_path = dir.join(STATE_FILE);

    let Some(pid) = read_pid(&pid_path) else {
        return DaemonStatus {
            running: false,
            pid: None,
            uptime_seconds: None,
            state: None,
        };
    };

    if !is_process_alive(pid) {
        remove_files(&pid_path, &state_path);
        return DaemonStatus {
            running: false,
            pid: Some(pid),
            uptime_seconds: None,
            state: None,
        };
    }

    let state: Option<DaemonState> = std::fs::read_to_string(&state_path)
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok());
    let uptime = state
        .as_ref()
        .map(|s| (Utc::now() - s.start_time).num_seconds());

    DaemonStatus {
        running: true,
        pid: Some(pid),
        uptime_seconds: uptime,
        state,
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|content| content.trim().parse::<u32>().ok())
}

fn remove_files(pid_path: &Path, state_path: &Path) {
    let _ = std::fs::remove_file(pid_path);
    let _ = std::fs::remove_file(state_path);
}

/// Probe liveness with signal 0 (Unix) or a tasklist query (Windows).
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;
        let Ok(pid_i32) = i32::try_from(pid) else {
            return false;
        };
        kill(Pid::from_raw(pid_i32), None).is_ok()
    }

    #[cfg(not(unix))]
    {
        std::process::Command::new("tasklist")
            .args(["/FI", &format!("PID eq {}", pid)])
            .output()
            .map(|output| String::from_utf8_lossy(&output.stdout).contains(&pid.to_string()))
            .unwrap_or(false)
    }
}

fn send_terminate(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;
        let pid_i32 = i32::try_from(pid)
            .map_err(|_| EngineError::Internal(format!("pid {} exceeds i32 range", pid)))?;
        kill(Pid::from_raw(pid_i32), Signal::SIGTERM)
            .map_err(|e| EngineError::Internal(format!("SIGTERM failed: {}", e)))?;
    }

    #[cfg(not(unix))]
    {
        std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string()])
            .output()
            .map_err(|e| EngineError::Internal(format!("taskkill failed: {}", e)))?;
    }

    Ok(())
}

fn send_kill(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;
        let pid_i32 = i32::try_from(pid)
            .map_err(|_| EngineError::Internal(format!("pid {} exceeds i32 range", pid)))?;
        // The process may have exited between the poll and now
        let _ = kill(Pid::from_raw(pid_i32), Signal::SIGKILL);
    }

    #[cfg(not(unix))]
    {
        let _ = std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/F"])
            .output();
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
