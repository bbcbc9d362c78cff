//! The listening loop.
//!
//! A runner owns the loopback listener and serves one client at a time.
//! When a session ends it returns to listening if `keep_listening` is set,
//! otherwise the lifecycle closes.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use harbor_core::Backend;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::client::Client;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::executor::AsyncExecutor;
use crate::session::{ProjectSlot, Session, SessionEnd};
use crate::transport::socket_transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Socket bound, not yet waiting for a client.
    Listening,
    /// Blocked in `accept`.
    Accepting,
    /// A client is connected and has not initialized a project.
    Bound,
    /// A project is bound and requests are being served.
    Serving,
    /// The current session is tearing down.
    ShuttingDown,
    /// The lifecycle has ended; the socket is closed.
    Closed,
}

struct Shared {
    state: Arc<Mutex<LifecycleState>>,
    keep_listening: AtomicBool,
    stopping: AtomicBool,
    stop_signal: Mutex<Option<Sender<()>>>,
    local_addr: SocketAddr,
}

impl Shared {
    fn set_state(&self, state: LifecycleState) {
        *self.state.lock() = state;
    }
}

/// Controls a [`ServerRunner`] from another thread.
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

impl ServerHandle {
    pub fn state(&self) -> LifecycleState {
        *self.shared.state.lock()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    pub fn set_keep_listening(&self, keep: bool) {
        self.shared.keep_listening.store(keep, Ordering::Release);
    }

    /// End the current session, if any, and the listening loop.
    pub fn stop(&self) {
        if self.shared.stopping.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("stop requested");
        drop(self.shared.stop_signal.lock().take());
        // Wake a blocked accept.
        if let Err(e) = TcpStream::connect_timeout(&self.shared.local_addr, Duration::from_secs(1)) {
            warn!("could not wake the listener: {e}");
        }
    }
}

pub struct ServerRunner {
    listener: TcpListener,
    backend: Arc<dyn Backend>,
    config: ServerConfig,
    shared: Arc<Shared>,
    stop: Receiver<()>,
}

impl ServerRunner {
    /// Bind the listening socket.
    pub fn new(config: ServerConfig, backend: Arc<dyn Backend>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.address).map_err(|source| ServerError::Bind {
            address: config.address.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr()?;
        let (stop_signal, stop) = crossbeam_channel::bounded(0);
        Ok(Self {
            listener,
            backend,
            shared: Arc::new(Shared {
                state: Arc::new(Mutex::new(LifecycleState::Listening)),
                keep_listening: AtomicBool::new(config.keep_listening),
                stopping: AtomicBool::new(false),
                stop_signal: Mutex::new(Some(stop_signal)),
                local_addr,
            }),
            config,
            stop,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Accept and serve clients until stopped, until a session ends with
    /// `keep_listening` unset, or until `accept` fails.
    pub fn run(self) -> Result<(), ServerError> {
        let executor = AsyncExecutor::new(self.config.workers())?;
        let last_project = ProjectSlot::default();
        info!("listening on {}", self.shared.local_addr);

        let result = loop {
            if self.shared.stopping.load(Ordering::Acquire) {
                break Ok(());
            }
            self.shared.set_state(LifecycleState::Accepting);
            let stream = match self.listener.accept() {
                Ok((stream, peer)) => {
                    if self.shared.stopping.load(Ordering::Acquire) {
                        break Ok(());
                    }
                    info!(%peer, "client connected");
                    stream
                }
                Err(e) => {
                    error!("accept failed: {e}");
                    break Err(ServerError::Accept(e));
                }
            };
            self.shared.set_state(LifecycleState::Bound);
            match self.serve_connection(stream, &executor, &last_project) {
                Ok(end) => info!(?end, "client disconnected"),
                Err(e) => warn!("session transport failed: {e}"),
            }
            if !self.shared.keep_listening.load(Ordering::Acquire)
                || self.shared.stopping.load(Ordering::Acquire)
            {
                break Ok(());
            }
            self.shared.set_state(LifecycleState::Listening);
        };

        executor.shutdown();
        drop(self.listener);
        self.shared.set_state(LifecycleState::Closed);
        info!("server closed");
        result
    }

    fn serve_connection(
        &self,
        stream: TcpStream,
        executor: &AsyncExecutor,
        last_project: &ProjectSlot,
    ) -> Result<SessionEnd, ServerError> {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("cannot disable nagle: {e}");
        }
        let (connection, threads) = socket_transport(stream)?;
        let mut session = Session::new(
            Client::new(connection.sender.clone()),
            Arc::clone(&self.backend),
            executor.clone(),
            self.config.clone(),
        )
        .with_project_slot(Arc::clone(last_project))
        .with_lifecycle(Arc::clone(&self.shared.state));

        let end = session.serve(&connection.receiver, &self.stop);
        self.shared.set_state(LifecycleState::ShuttingDown);
        drop(session);
        drop(connection);
        threads.close()?;
        Ok(end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_core::TextBackend;

    fn loopback() -> ServerConfig {
        ServerConfig {
            address: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn bind_conflict_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let config = ServerConfig {
            address: taken.local_addr().unwrap(),
            ..loopback()
        };
        let err = ServerRunner::new(config, Arc::new(TextBackend::new())).err().unwrap();
        assert!(matches!(err, ServerError::Bind { .. }));
    }

    #[test]
    fn stop_wakes_a_blocked_accept() {
        let runner = ServerRunner::new(loopback(), Arc::new(TextBackend::new())).unwrap();
        let handle = runner.handle();
        assert_eq!(handle.state(), LifecycleState::Listening);
        let thread = std::thread::spawn(move || runner.run());
        while handle.state() != LifecycleState::Accepting {
            std::thread::sleep(Duration::from_millis(5));
        }
        handle.stop();
        thread.join().unwrap().unwrap();
        assert_eq!(handle.state(), LifecycleState::Closed);
    }
}
