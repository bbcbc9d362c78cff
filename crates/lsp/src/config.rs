use std::net::SocketAddr;
use std::time::Duration;

/// Settings of one [`ServerRunner`](crate::ServerRunner).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Loopback address to listen on. Port 0 picks a free port.
    pub address: SocketAddr,
    /// Return to listening after a session ends.
    pub keep_listening: bool,
    /// Size of the request worker pool (at least 1).
    pub worker_threads: usize,
    /// How long progress reporting waits for the client to acknowledge
    /// `window/workDoneProgress/create`.
    pub progress_handshake_timeout: Duration,
    /// Maximum number of `workspace/symbol` results.
    pub workspace_symbol_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([127, 0, 0, 1], 8989)),
            keep_listening: true,
            worker_threads: 4,
            progress_handshake_timeout: Duration::from_millis(500),
            workspace_symbol_limit: 100,
        }
    }
}

impl ServerConfig {
    pub(crate) fn workers(&self) -> usize {
        self.worker_threads.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.address.to_string(), "127.0.0.1:8989");
        assert!(config.keep_listening);
        assert_eq!(config.workspace_symbol_limit, 100);
        assert_eq!(config.progress_handshake_timeout, Duration::from_millis(500));
    }

    #[test]
    fn worker_count_has_a_floor() {
        let config = ServerConfig {
            worker_threads: 0,
            ..ServerConfig::default()
        };
        assert_eq!(config.workers(), 1);
    }
}
