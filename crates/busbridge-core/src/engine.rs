//! Seam to the external bus engine.
//!
//! The engine is an opaque collaborator: it takes a device descriptor plus
//! the resolved schema and script bodies and either exposes the device on
//! the bus or fails. Nothing in this workspace interprets those payloads.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::record::DeviceDescriptor;

/// Failure reported by the bus engine. The message is surfaced verbatim to
/// the onboarding caller.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct EngineError(pub String);

#[async_trait]
pub trait BridgeEngine: Send + Sync {
    /// Activate a device on the bus. `schema` and `script` are opaque
    /// payloads; `modules_path` is the script module search root.
    async fn add_device(
        &self,
        device: &DeviceDescriptor,
        schema: &str,
        script: &str,
        modules_path: &Path,
    ) -> Result<(), EngineError>;
}
