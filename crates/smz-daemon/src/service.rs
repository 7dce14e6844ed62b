//! Daemon persistence and the user-service contract.
//!
//! `daemon.json` records how to reach a running daemon. The
//! [`ServiceDefinition`] declares the "install as a user service" contract
//! consumed by OS-specific supervisors (launchd, systemd, schtasks); the
//! installers themselves live outside this crate.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// `~/.summarize/daemon.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonFile {
    pub port: u16,
    pub token: String,
    pub installed_at_ms: i64,
}

impl DaemonFile {
    /// Load; `None` when absent or unreadable (the daemon is then assumed
    /// not installed).
    pub fn load(path: &Path) -> Option<Self> {
        let raw = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    /// Write atomically (temp → rename).
    pub fn store(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)
    }
}

/// Restart policy a supervisor should apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeepAlivePolicy {
    /// Restart whenever the process exits.
    Always,
    /// Restart only on non-zero exit.
    OnFailure,
}

/// What an OS supervisor needs to run the daemon as a user service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    /// Reverse-DNS label (launchd) / unit name stem (systemd).
    pub label: String,
    /// Absolute path to the daemon binary.
    pub program: String,
    pub args: Vec<String>,
    /// Environment the service must carry.
    pub env: Vec<(String, String)>,
    pub keep_alive: KeepAlivePolicy,
    pub run_at_load: bool,
}

impl ServiceDefinition {
    /// The contract for this daemon at a given port.
    pub fn for_daemon(program: &Path, port: u16) -> Self {
        Self {
            label: "dev.summarize.daemon".to_string(),
            program: program.to_string_lossy().to_string(),
            args: vec!["--port".to_string(), port.to_string()],
            env: Vec::new(),
            keep_alive: KeepAlivePolicy::OnFailure,
            run_at_load: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_daemon_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daemon.json");
        let file = DaemonFile {
            port: 8765,
            token: "tok".to_string(),
            installed_at_ms: 123,
        };
        file.store(&path).unwrap();
        assert_eq!(DaemonFile::load(&path), Some(file));
    }

    #[test]
    fn test_daemon_file_absent_or_corrupt() {
        let dir = TempDir::new().unwrap();
        assert_eq!(DaemonFile::load(&dir.path().join("missing.json")), None);

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{").unwrap();
        assert_eq!(DaemonFile::load(&bad), None);
    }

    #[test]
    fn test_service_definition_contract() {
        let def = ServiceDefinition::for_daemon(&PathBuf::from("/usr/local/bin/summarized"), 8765);
        assert_eq!(def.label, "dev.summarize.daemon");
        assert!(def.args.contains(&"8765".to_string()));
        assert_eq!(def.keep_alive, KeepAlivePolicy::OnFailure);
        assert!(def.run_at_load);
    }
}
