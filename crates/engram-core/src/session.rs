//! Session Detection
//!
//! Maps the current process context to a stable session identifier so
//! memories written from the same project land in the same session without
//! the caller passing one explicitly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use crate::config::{SessionConfig, SessionStrategy};
use crate::memory::AgentType;

/// Session identifier prefix shared by all strategies.
const SESSION_PREFIX: &str = "daemon-";

/// Fallback identifier when no project root can be found.
const FALLBACK_SESSION: &str = "daemon-default";

/// Derives session identifiers and agent types from the process context
pub struct SessionDetector {
    config: SessionConfig,
    /// Computed identifiers keyed by working directory, for the process lifetime.
    cache: Mutex<HashMap<PathBuf, String>>,
}

impl SessionDetector {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Session identifier for the current working directory.
    pub fn detect(&self) -> String {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        self.detect_for(&cwd)
    }

    /// Session identifier for an explicit directory.
    pub fn detect_for(&self, cwd: &Path) -> String {
        if let Ok(cache) = self.cache.lock() {
            if let Some(id) = cache.get(cwd) {
                return id.clone();
            }
        }

        let id = self.compute(cwd);

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(cwd.to_path_buf(), id.clone());
        }
        id
    }

    fn compute(&self, cwd: &Path) -> String {
        match self.config.strategy {
            SessionStrategy::Manual => match self
                .config
                .manual_id
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
            {
                Some(id) => id.to_string(),
                None => git_directory_session(cwd),
            },
            SessionStrategy::GitDirectory => git_directory_session(cwd),
            SessionStrategy::Hash => remote_hash_session(cwd),
        }
    }

    /// Agent type from environment markers, in precedence order: MCP
    /// invocation, agent-tool invocation, API invocation, unknown.
    pub fn detect_agent_type(&self) -> AgentType {
        if env_flag("ENGRAM_MCP") {
            AgentType::ClaudeDesktop
        } else if env_flag("CLAUDE_CODE") || env_flag("ENGRAM_AGENT_TOOL") {
            AgentType::ClaudeCode
        } else if env_flag("ENGRAM_API") {
            AgentType::Api
        } else {
            AgentType::Unknown
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| !v.trim().is_empty())
}

/// Walk ancestors looking for a `.git` entry; the session id is the sanitized
/// basename of the containing directory.
fn git_directory_session(cwd: &Path) -> String {
    match find_git_root(cwd) {
        Some(root) => {
            let basename = root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let sanitized = sanitize_session_name(&basename);
            if sanitized.is_empty() {
                FALLBACK_SESSION.to_string()
            } else {
                format!("{}{}", SESSION_PREFIX, sanitized)
            }
        }
        None => FALLBACK_SESSION.to_string(),
    }
}

/// Hash the git remote origin URL of the found root.
fn remote_hash_session(cwd: &Path) -> String {
    let Some(root) = find_git_root(cwd) else {
        return FALLBACK_SESSION.to_string();
    };

    let output = std::process::Command::new("git")
        .args(["config", "--get", "remote.origin.url"])
        .current_dir(&root)
        .output();

    match output {
        Ok(out) if out.status.success() => {
            let url = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if url.is_empty() {
                return git_directory_session(cwd);
            }
            let digest = Sha256::digest(url.as_bytes());
            let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
            format!("{}{}", SESSION_PREFIX, &hex[..16])
        }
        _ => {
            tracing::debug!(root = %root.display(), "No remote origin url; using directory name");
            git_directory_session(cwd)
        }
    }
}

fn find_git_root(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(d) = dir {
        if d.join(".git").exists() {
            return Some(d.to_path_buf());
        }
        dir = d.parent();
    }
    None
}

/// Lowercase; keep `[a-zA-Z0-9_-]`; space and dot become `-`; drop the rest.
fn sanitize_session_name(name: &str) -> String {
    name.chars()
        .filter_map(|c| match c {
            'a'..='z' | '0'..='9' | '_' | '-' => Some(c),
            'A'..='Z' => Some(c.to_ascii_lowercase()),
            ' ' | '.' => Some('-'),
            _ => None,
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;

    #[test]
    fn test_sanitize_session_name() {
        assert_eq!(sanitize_session_name("My Project.rs"), "my-project-rs");
        assert_eq!(sanitize_session_name("engram_core-v2"), "engram_core-v2");
        assert_eq!(sanitize_session_name("émoji🎉stuff"), "mojistuff");
        assert_eq!(sanitize_session_name(""), "");
    }

    #[test]
    fn test_git_directory_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("Sample Repo");
        std::fs::create_dir_all(root.join(".git")).unwrap();
        let nested = root.join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        let detector = SessionDetector::new(SessionConfig::default());
        assert_eq!(detector.detect_for(&nested), "daemon-sample-repo");
    }

    #[test]
    fn test_no_git_root_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let detector = SessionDetector::new(SessionConfig::default());
        assert_eq!(detector.detect_for(dir.path()), FALLBACK_SESSION);
    }

    #[test]
    fn test_manual_strategy() {
        let detector = SessionDetector::new(SessionConfig {
            strategy: SessionStrategy::Manual,
            manual_id: Some("my-session".to_string()),
        });
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detector.detect_for(dir.path()), "my-session");
    }

    #[test]
    fn test_manual_without_id_falls_back_to_git() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("proj");
        std::fs::create_dir_all(root.join(".git")).unwrap();

        let detector = SessionDetector::new(SessionConfig {
            strategy: SessionStrategy::Manual,
            manual_id: None,
        });
        assert_eq!(detector.detect_for(&root), "daemon-proj");
    }

    #[test]
    fn test_cache_returns_same_id() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cached");
        std::fs::create_dir_all(root.join(".git")).unwrap();

        let detector = SessionDetector::new(SessionConfig::default());
        let first = detector.detect_for(&root);
        // Removing .git does not change the cached answer within this process.
        std::fs::remove_dir_all(root.join(".git")).unwrap();
        let second = detector.detect_for(&root);
        assert_eq!(first, second);
    }
}
