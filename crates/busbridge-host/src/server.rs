//! Unix socket service listener.
//!
//! Accepts concurrent client connections; each connection is served by its
//! own task reading line-delimited JSON requests. Every inbound request
//! yields exactly one response line, even if a handler panics: the
//! dispatch future is wrapped in `catch_unwind` and a panic degrades to
//! the generic `"failed"` response.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use busbridge_core::OnboardingRecord;
use futures::FutureExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::protocol::{Request, Response, CMD_ADD_DEVICE, CMD_HEALTHCHECK};
use crate::registry::OnboardingRegistry;

/// Service listener bound to a Unix socket, holding the one registry
/// instance shared by all connections.
pub struct Listener {
    listener: UnixListener,
    path: PathBuf,
    registry: Arc<OnboardingRegistry>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Listener {
    /// Bind to a Unix socket path, replacing a stale socket file.
    pub async fn bind(path: &Path, registry: Arc<OnboardingRegistry>) -> Result<Self> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(path)?;
        let (shutdown_tx, _) = broadcast::channel(1);

        info!(socket = %path.display(), "listener bound");
        Ok(Self {
            listener,
            path: path.to_path_buf(),
            registry,
            shutdown_tx,
        })
    }

    /// Sender for external shutdown triggers.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Accept connections until a shutdown signal arrives.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, _)) => {
                            let registry = self.registry.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_client(stream, registry).await {
                                    debug!(error = %e, "client connection ended with error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "accept failed");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        let _ = std::fs::remove_file(&self.path);
        Ok(())
    }
}

async fn handle_client(stream: UnixStream, registry: Arc<OnboardingRegistry>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            break;
        }

        let response = respond(&line, &registry).await;
        writer.write_all(response.to_json_line()?.as_bytes()).await?;
    }

    Ok(())
}

/// Produce exactly one response for one request line.
async fn respond(line: &str, registry: &Arc<OnboardingRegistry>) -> Response {
    let request = match serde_json::from_str::<Request>(line) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "unparseable request");
            return Response::failed();
        }
    };

    match std::panic::AssertUnwindSafe(dispatch(request, registry))
        .catch_unwind()
        .await
    {
        Ok(response) => response,
        Err(_) => {
            error!("request handler panicked");
            Response::failed()
        }
    }
}

async fn dispatch(request: Request, registry: &Arc<OnboardingRegistry>) -> Response {
    match request.command.as_deref() {
        Some(CMD_ADD_DEVICE) => handle_add_device(request, registry).await,
        // A reachable listener is by definition healthy; no deeper probe.
        Some(CMD_HEALTHCHECK) => Response::healthy(),
        Some(other) => {
            warn!(command = other, "unknown command");
            Response::failed()
        }
        None => Response::failed(),
    }
}

async fn handle_add_device(request: Request, registry: &Arc<OnboardingRegistry>) -> Response {
    let record = match build_record(request) {
        Ok(record) => record,
        Err(message) => return Response::message(message),
    };

    match registry.try_onboard(record).await {
        Ok(()) => Response::succeeded(),
        // Failure text goes back to the caller unmodified.
        Err(e) => Response::message(e.to_string()),
    }
}

fn build_record(request: Request) -> Result<OnboardingRecord, String> {
    let name = require(request.name, "name")?;
    let props = require(request.props, "props")?;
    let translator_js = require(request.translator_js, "translatorJs")?;
    let schema = require(request.schema, "schema")?;
    let category = require(request.category, "category")?;

    OnboardingRecord::from_request(&category, name, props, translator_js, schema)
        .map_err(|e| e.to_string())
}

fn require(field: Option<String>, name: &str) -> Result<String, String> {
    field.ok_or_else(|| format!("missing required field '{}'", name))
}
