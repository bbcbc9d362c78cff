//! Configuration file format for `harbor`.
//!
//! # Example
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8989
//! keep_listening = true
//! workers = 4
//!
//! [progress]
//! handshake_timeout_ms = 500
//!
//! [symbols]
//! workspace_limit = 100
//!
//! [log]
//! filter = "info"
//! file = "/tmp/harbor.log"
//! ```
//!
//! Every section and key is optional.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use harbor_lsp::ServerConfig;
use serde::Deserialize;

/// Read from the working directory when `--config` is not given.
pub const DEFAULT_FILE: &str = "harbor.toml";

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: ServerSection,
    pub progress: ProgressSection,
    pub symbols: SymbolsSection,
    pub log: LogSection,
}

/// `[server]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub host: IpAddr,
    pub port: u16,
    /// Go back to listening after a client disconnects.
    pub keep_listening: bool,
    pub workers: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            host: defaults.address.ip(),
            port: defaults.address.port(),
            keep_listening: defaults.keep_listening,
            workers: defaults.worker_threads,
        }
    }
}

/// `[progress]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProgressSection {
    /// How long to wait for the client to accept a progress token.
    pub handshake_timeout_ms: u64,
}

impl Default for ProgressSection {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: ServerConfig::default().progress_handshake_timeout.as_millis()
                as u64,
        }
    }
}

/// `[symbols]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SymbolsSection {
    pub workspace_limit: usize,
}

impl Default for SymbolsSection {
    fn default() -> Self {
        Self {
            workspace_limit: ServerConfig::default().workspace_symbol_limit,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    /// `tracing` filter directives, used when `RUST_LOG` is unset.
    pub filter: String,
    /// Log to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            file: None,
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<IpAddr>,
    pub port: Option<u16>,
    pub once: bool,
    pub workers: Option<usize>,
}

// ── Functions ─────────────────────────────────────────────────────────────────

/// Read the configuration at `path`, or `harbor.toml` if it exists.
///
/// Returns a human-readable error string on failure.
pub fn load(path: Option<&Path>) -> Result<FileConfig, String> {
    match path {
        Some(path) => read(path),
        None => {
            let default = Path::new(DEFAULT_FILE);
            if default.is_file() {
                read(default)
            } else {
                Ok(FileConfig::default())
            }
        }
    }
}

fn read(path: &Path) -> Result<FileConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;

    toml::from_str(&content).map_err(|e| format!("could not parse '{}': {}", path.display(), e))
}

impl FileConfig {
    pub fn server_config(&self, overrides: &Overrides) -> ServerConfig {
        let host = overrides.host.unwrap_or(self.server.host);
        let port = overrides.port.unwrap_or(self.server.port);
        ServerConfig {
            address: SocketAddr::new(host, port),
            keep_listening: self.server.keep_listening && !overrides.once,
            worker_threads: overrides.workers.unwrap_or(self.server.workers).max(1),
            progress_handshake_timeout: Duration::from_millis(self.progress.handshake_timeout_ms),
            workspace_symbol_limit: self.symbols.workspace_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn empty_file_gives_server_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert_eq!(config, FileConfig::default());
        let server = config.server_config(&Overrides::default());
        assert_eq!(server.address, SocketAddr::from(([127, 0, 0, 1], 8989)));
        assert!(server.keep_listening);
        assert_eq!(server.worker_threads, 4);
        assert_eq!(server.progress_handshake_timeout, Duration::from_millis(500));
        assert_eq!(server.workspace_symbol_limit, 100);
    }

    #[test]
    fn sections_are_read() {
        let config: FileConfig = toml::from_str(
            r#"
            [server]
            port = 9000
            keep_listening = false
            workers = 8

            [progress]
            handshake_timeout_ms = 50

            [symbols]
            workspace_limit = 20

            [log]
            filter = "harbor_lsp=debug"
            file = "/tmp/harbor.log"
            "#,
        )
        .unwrap();
        let server = config.server_config(&Overrides::default());
        assert_eq!(server.address.port(), 9000);
        assert!(!server.keep_listening);
        assert_eq!(server.worker_threads, 8);
        assert_eq!(server.progress_handshake_timeout, Duration::from_millis(50));
        assert_eq!(server.workspace_symbol_limit, 20);
        assert_eq!(config.log.filter, "harbor_lsp=debug");
        assert_eq!(config.log.file, Some(PathBuf::from("/tmp/harbor.log")));
    }

    #[test]
    fn flags_override_the_file() {
        let config: FileConfig = toml::from_str("[server]\nport = 9000\nworkers = 8\n").unwrap();
        let server = config.server_config(&Overrides {
            host: Some(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2))),
            port: Some(0),
            once: true,
            workers: Some(0),
        });
        assert_eq!(server.address, SocketAddr::from(([127, 0, 0, 2], 0)));
        assert!(!server.keep_listening);
        assert_eq!(server.worker_threads, 1);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = toml::from_str::<FileConfig>("[server]\nprot = 1\n").unwrap_err();
        assert!(err.to_string().contains("prot"));
    }

    #[test]
    fn load_names_the_file_in_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");
        let err = load(Some(&missing)).unwrap_err();
        assert!(err.starts_with("could not read"));
        assert!(err.contains("missing.toml"));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[server\n").unwrap();
        let err = load(Some(&broken)).unwrap_err();
        assert!(err.starts_with("could not parse"));
    }
}
