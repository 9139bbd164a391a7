//! Connection supervisor.
//!
//! Runs as a background task distinct from request servicing: it opens the
//! channel to the host, issues a periodic health check, and re-enters
//! `Connecting` whenever the channel closes or the host stops answering
//! `"healthy"`. There is no terminal state while the process lives; the
//! only way out is the cancellation token.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ConnectionEvent, HostClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Socket path of the host service channel.
    pub socket_path: PathBuf,
    /// Fixed period of the reconnect/health-check loop.
    pub poll_interval: Duration,
    /// Upper bound on one health-check round trip.
    pub health_timeout: Duration,
    /// Consecutive health-check failures tolerated before the connection is
    /// torn down and re-established.
    pub max_failures: u32,
}

impl SupervisorConfig {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            poll_interval: Duration::from_secs(5),
            health_timeout: Duration::from_secs(3),
            max_failures: 1,
        }
    }
}

struct Connection {
    client: HostClient,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
}

pub struct Supervisor {
    config: SupervisorConfig,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
}

enum Wake {
    Cancelled,
    ChannelClosed,
    Tick,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            state_tx,
            state_rx,
            cancel: CancellationToken::new(),
        }
    }

    /// Watch the supervisor's connection state.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Token that stops the loop deterministically instead of relying on
    /// process teardown.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the supervision loop until cancelled.
    pub async fn run(self) {
        let mut connection: Option<Connection> = None;
        let mut failures: u32 = 0;
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let wake = {
                let closed = async {
                    match connection.as_mut() {
                        Some(conn) => {
                            // recv() yielding None means the reader task is
                            // gone, which is also a closed channel.
                            let _ = conn.events.recv().await;
                        }
                        None => std::future::pending().await,
                    }
                };
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Wake::Cancelled,
                    _ = closed => Wake::ChannelClosed,
                    _ = interval.tick() => Wake::Tick,
                }
            };

            match wake {
                Wake::Cancelled => {
                    info!("supervisor shutting down");
                    break;
                }
                Wake::ChannelClosed => {
                    // Immediate, not deferred to the next poll.
                    warn!("host channel closed");
                    connection = None;
                    failures = 0;
                    self.set_state(ConnectionState::Disconnected);
                }
                Wake::Tick => match connection.as_ref() {
                    None => {
                        self.set_state(ConnectionState::Connecting);
                        match HostClient::connect_to(&self.config.socket_path).await {
                            Ok((client, events)) => {
                                info!(
                                    socket = %self.config.socket_path.display(),
                                    "connected to host"
                                );
                                connection = Some(Connection { client, events });
                                failures = 0;
                                self.set_state(ConnectionState::Connected);
                            }
                            Err(e) => {
                                self.log_connect_failure(&e);
                                self.set_state(ConnectionState::Disconnected);
                            }
                        }
                    }
                    Some(conn) => {
                        let healthy = match conn
                            .client
                            .healthcheck(self.config.health_timeout)
                            .await
                        {
                            Ok(true) => true,
                            Ok(false) => {
                                warn!("host answered health check but not healthy");
                                false
                            }
                            Err(e) => {
                                warn!(error = %e, "health check failed");
                                false
                            }
                        };

                        if healthy {
                            failures = 0;
                            debug!("host healthy");
                        } else {
                            failures += 1;
                            if failures >= self.config.max_failures {
                                connection = None;
                                failures = 0;
                                self.set_state(ConnectionState::Disconnected);
                            }
                        }
                    }
                },
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    fn log_connect_failure(&self, error: &anyhow::Error) {
        let socket = self.config.socket_path.display();
        match error.downcast_ref::<std::io::Error>().map(|e| e.kind()) {
            Some(std::io::ErrorKind::NotFound) => {
                warn!(%socket, "host service socket not present; is the host installed and running?");
            }
            Some(std::io::ErrorKind::ConnectionRefused) => {
                warn!(%socket, "host is not accepting connections");
            }
            Some(std::io::ErrorKind::PermissionDenied) => {
                warn!(%socket, "host service socket is not accessible");
            }
            _ => {
                warn!(%socket, error = %error, "unknown error opening host channel");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use busbridge_core::testing::{RecordingEngine, StaticTokens};
    use busbridge_core::TokenExchange;
    use busbridge_host::protocol::Response;
    use busbridge_host::registry::OnboardingRegistry;
    use busbridge_host::server::Listener;
    use busbridge_host::store::PersistentStore;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    fn fast_config(socket_path: &Path) -> SupervisorConfig {
        let mut config = SupervisorConfig::new(socket_path);
        config.poll_interval = Duration::from_millis(20);
        config.health_timeout = Duration::from_millis(200);
        config
    }

    async fn start_host(tmp: &TempDir) -> PathBuf {
        let socket_path = tmp.path().join("host.sock");
        let tokens: Arc<dyn TokenExchange> = Arc::new(StaticTokens::new());
        let registry = Arc::new(OnboardingRegistry::new(
            PersistentStore::new(tmp.path().join("store")),
            tokens,
            Arc::new(RecordingEngine::new()),
            PathBuf::from("."),
        ));
        let listener = Listener::bind(&socket_path, registry).await.unwrap();
        tokio::spawn(async move {
            let _ = listener.run().await;
        });
        socket_path
    }

    async fn wait_for_state(
        rx: &mut watch::Receiver<ConnectionState>,
        wanted: ConnectionState,
    ) {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if *rx.borrow() == wanted {
                    return;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap_or_else(|_| panic!("never reached state {:?}", wanted));
    }

    #[tokio::test]
    async fn connects_to_a_live_host() {
        let tmp = TempDir::new().unwrap();
        let socket_path = start_host(&tmp).await;

        let supervisor = Supervisor::new(fast_config(&socket_path));
        let mut state = supervisor.state();
        let cancel = supervisor.cancellation_token();
        let handle = tokio::spawn(supervisor.run());

        wait_for_state(&mut state, ConnectionState::Connected).await;

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn stays_disconnected_while_host_is_absent_then_recovers() {
        let tmp = TempDir::new().unwrap();
        let socket_path = tmp.path().join("late.sock");

        let supervisor = Supervisor::new(fast_config(&socket_path));
        let mut state = supervisor.state();
        let cancel = supervisor.cancellation_token();
        let handle = tokio::spawn(supervisor.run());

        // Give it a few failed attempts.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*state.borrow(), ConnectionState::Disconnected);

        // Host appears; the supervisor finds it on a later iteration.
        let tokens: Arc<dyn TokenExchange> = Arc::new(StaticTokens::new());
        let registry = Arc::new(OnboardingRegistry::new(
            PersistentStore::new(tmp.path().join("store")),
            tokens,
            Arc::new(RecordingEngine::new()),
            PathBuf::from("."),
        ));
        let listener = Listener::bind(&socket_path, registry).await.unwrap();
        tokio::spawn(async move {
            let _ = listener.run().await;
        });

        wait_for_state(&mut state, ConnectionState::Connected).await;

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn close_notification_disconnects_immediately() {
        let tmp = TempDir::new().unwrap();
        let socket_path = tmp.path().join("drop.sock");

        // Accept one connection, answer nothing, then drop it shortly after.
        let listener = tokio::net::UnixListener::bind(&socket_path).unwrap();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                tokio::time::sleep(Duration::from_millis(50)).await;
                drop(stream);
            }
        });

        let supervisor = Supervisor::new(fast_config(&socket_path));
        let mut state = supervisor.state();
        let cancel = supervisor.cancellation_token();
        let handle = tokio::spawn(supervisor.run());

        wait_for_state(&mut state, ConnectionState::Connected).await;
        wait_for_state(&mut state, ConnectionState::Disconnected).await;

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn unhealthy_answers_breach_threshold_and_force_reconnect() {
        let tmp = TempDir::new().unwrap();
        let socket_path = tmp.path().join("sick.sock");

        // A host that is reachable but never healthy.
        let listener = tokio::net::UnixListener::bind(&socket_path).unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let (reader, mut writer) = stream.into_split();
                    let mut reader = BufReader::new(reader);
                    let mut line = String::new();
                    while let Ok(n) = reader.read_line(&mut line).await {
                        if n == 0 {
                            break;
                        }
                        let reply = Response::message("sick").to_json_line().unwrap();
                        if writer.write_all(reply.as_bytes()).await.is_err() {
                            break;
                        }
                        line.clear();
                    }
                });
            }
        });

        let mut config = fast_config(&socket_path);
        config.max_failures = 3;
        let supervisor = Supervisor::new(config);
        let mut state = supervisor.state();
        let cancel = supervisor.cancellation_token();
        let handle = tokio::spawn(supervisor.run());

        // Three consecutive non-healthy results force Disconnected, then the
        // loop tries Connecting again.
        wait_for_state(&mut state, ConnectionState::Connected).await;
        wait_for_state(&mut state, ConnectionState::Disconnected).await;
        wait_for_state(&mut state, ConnectionState::Connected).await;

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let tmp = TempDir::new().unwrap();
        let socket_path = start_host(&tmp).await;

        let supervisor = Supervisor::new(fast_config(&socket_path));
        let cancel = supervisor.cancellation_token();
        let handle = tokio::spawn(supervisor.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("supervisor should stop promptly")
            .unwrap();
    }
}
