//! Host channel client.
//!
//! One `HostClient` owns one Unix socket connection. A spawned reader task
//! owns the read half and forwards response lines; channel closure is
//! delivered as a `ConnectionEvent` instead of an in-callback notification,
//! so callers consume it from their own loop.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use busbridge_host::protocol::{Request, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// Events delivered by the connection reader task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The host closed the channel, or the transport failed.
    Closed,
}

struct ClientInner {
    writer: OwnedWriteHalf,
    responses: mpsc::UnboundedReceiver<Response>,
    /// Set while a request is in flight. A call abandoned mid-flight (for
    /// example by a timeout) leaves this set, and the connection is then
    /// unusable: its next inbound line would answer the abandoned request,
    /// not the new one.
    in_flight: bool,
}

pub struct HostClient {
    // Held across write + response read: the protocol is strict
    // request/response per connection.
    inner: Mutex<ClientInner>,
}

impl HostClient {
    /// Connect at the default host socket path.
    pub async fn connect() -> Result<(Self, mpsc::UnboundedReceiver<ConnectionEvent>)> {
        Self::connect_to(&busbridge_host::socket_path()).await
    }

    /// Connect to a host at a specific socket path.
    ///
    /// Returns the client plus a receiver that yields `Closed` when the
    /// host drops the channel.
    pub async fn connect_to(
        path: &Path,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ConnectionEvent>)> {
        let stream = UnixStream::connect(path).await?;
        let (read, write) = stream.into_split();

        let (response_tx, responses) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut reader = BufReader::new(read);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => match serde_json::from_str::<Response>(line.trim_end()) {
                        Ok(response) => {
                            if response_tx.send(response).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "unparseable response line from host");
                        }
                    },
                    Err(e) => {
                        debug!(error = %e, "host channel read failed");
                        break;
                    }
                }
            }
            // Receiver may already be gone; closure is best-effort info.
            let _ = event_tx.send(ConnectionEvent::Closed);
        });

        Ok((
            Self {
                inner: Mutex::new(ClientInner {
                    writer: write,
                    responses,
                    in_flight: false,
                }),
            },
            events,
        ))
    }

    /// Send one request and await its response.
    ///
    /// A call dropped between the write and the response (a timeout wrapper,
    /// a cancelled task) leaves its reply in flight; pairing that reply with
    /// the next request would shift every later exchange by one. Such a
    /// connection refuses further calls, and the caller must reconnect.
    pub async fn call(&self, request: &Request) -> Result<Response> {
        let mut inner = self.inner.lock().await;
        if inner.in_flight {
            anyhow::bail!("channel out of sync after an abandoned request; reconnect");
        }
        inner.in_flight = true;
        inner
            .writer
            .write_all(request.to_json_line()?.as_bytes())
            .await?;
        let response = inner
            .responses
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("channel closed by host"))?;
        inner.in_flight = false;
        Ok(response)
    }

    /// Onboard a device. The returned response is either `succeeded` or the
    /// host's verbatim failure text.
    pub async fn add_device(
        &self,
        name: &str,
        props: &str,
        translator_js_token: &str,
        schema_token: &str,
        category: &str,
    ) -> Result<Response> {
        self.call(&Request::add_device(
            name,
            props,
            translator_js_token,
            schema_token,
            category,
        ))
        .await
    }

    /// Bounded health check: `Ok(true)` only for a `"healthy"` reply within
    /// the timeout. A hung host must not wedge the caller. After a timeout
    /// the channel refuses further calls; reconnect instead.
    pub async fn healthcheck(&self, timeout: Duration) -> Result<bool> {
        match tokio::time::timeout(timeout, self.call(&Request::healthcheck())).await {
            Ok(Ok(response)) => Ok(response.is_healthy()),
            Ok(Err(e)) => Err(e),
            Err(_) => anyhow::bail!("health check timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use busbridge_core::testing::{RecordingEngine, StaticTokens};
    use busbridge_core::TokenExchange;
    use busbridge_host::registry::OnboardingRegistry;
    use busbridge_host::server::Listener;
    use busbridge_host::store::PersistentStore;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn start_host(tmp: &TempDir) -> (PathBuf, Arc<RecordingEngine>) {
        let socket_path = tmp.path().join("host.sock");
        let engine = Arc::new(RecordingEngine::new());
        let tokens: Arc<dyn TokenExchange> = Arc::new(
            StaticTokens::new()
                .with("tok-js", "script")
                .with("tok-xml", "schema"),
        );
        let registry = Arc::new(OnboardingRegistry::new(
            PersistentStore::new(tmp.path().join("store")),
            tokens,
            engine.clone(),
            PathBuf::from("."),
        ));
        let listener = Listener::bind(&socket_path, registry).await.unwrap();
        tokio::spawn(async move {
            let _ = listener.run().await;
        });
        (socket_path, engine)
    }

    #[tokio::test]
    async fn healthcheck_against_live_host() {
        let tmp = TempDir::new().unwrap();
        let (socket_path, _) = start_host(&tmp).await;

        let (client, _events) = HostClient::connect_to(&socket_path).await.unwrap();
        assert!(client.healthcheck(Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn add_device_against_live_host() {
        let tmp = TempDir::new().unwrap();
        let (socket_path, engine) = start_host(&tmp).await;

        let (client, _events) = HostClient::connect_to(&socket_path).await.unwrap();
        let response = client
            .add_device("Lamp", r#"{"id":"1"}"#, "tok-js", "tok-xml", "lamps")
            .await
            .unwrap();
        assert!(response.is_succeeded());
        assert_eq!(engine.invocations(), 1);
    }

    #[tokio::test]
    async fn connect_fails_without_host() {
        let tmp = TempDir::new().unwrap();
        let result = HostClient::connect_to(&tmp.path().join("absent.sock")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn close_is_delivered_as_an_event() {
        let tmp = TempDir::new().unwrap();
        let socket_path = tmp.path().join("drop.sock");

        // A server that accepts and immediately drops the connection.
        let listener = tokio::net::UnixListener::bind(&socket_path).unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let (_client, mut events) = HostClient::connect_to(&socket_path).await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("expected close notification");
        assert_eq!(event, Some(ConnectionEvent::Closed));
    }

    #[tokio::test]
    async fn timed_out_call_does_not_desync_later_calls() {
        let tmp = TempDir::new().unwrap();
        let socket_path = tmp.path().join("slow.sock");

        // A host that answers every request, but far too late for the
        // health-check timeout below.
        let listener = tokio::net::UnixListener::bind(&socket_path).unwrap();
        tokio::spawn(async move {
            use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let (reader, mut writer) = stream.into_split();
            let mut reader = BufReader::new(reader);
            let mut line = String::new();
            while let Ok(n) = reader.read_line(&mut line).await {
                if n == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
                let reply = Response::healthy().to_json_line().unwrap();
                if writer.write_all(reply.as_bytes()).await.is_err() {
                    break;
                }
                line.clear();
            }
        });

        let (client, _events) = HostClient::connect_to(&socket_path).await.unwrap();
        assert!(client.healthcheck(Duration::from_millis(50)).await.is_err());

        // The abandoned health check's "healthy" reply is still in flight;
        // it must never be handed to this request as its answer.
        let result = client
            .add_device("Lamp", r#"{"id":"1"}"#, "tok-js", "tok-xml", "lamps")
            .await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("out of sync"), "got: {err}");
    }

    #[tokio::test]
    async fn call_on_closed_channel_errors() {
        let tmp = TempDir::new().unwrap();
        let socket_path = tmp.path().join("drop.sock");
        let listener = tokio::net::UnixListener::bind(&socket_path).unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let (client, mut events) = HostClient::connect_to(&socket_path).await.unwrap();
        events.recv().await; // wait until the reader task observed EOF
        assert!(client.call(&Request::healthcheck()).await.is_err());
    }
}
