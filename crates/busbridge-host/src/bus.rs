//! Engine wiring for the host binary.

use std::path::Path;

use async_trait::async_trait;
use busbridge_core::{BridgeEngine, DeviceDescriptor, EngineError};
use tracing::info;

/// Accept-and-log engine used until a real bus engine is linked in.
///
/// The registry, listener, and replay paths are engine-agnostic; this
/// implementation exists so the host binary runs end to end on machines
/// without a bus stack.
pub struct LogOnlyEngine;

#[async_trait]
impl BridgeEngine for LogOnlyEngine {
    async fn add_device(
        &self,
        device: &DeviceDescriptor,
        schema: &str,
        script: &str,
        modules_path: &Path,
    ) -> Result<(), EngineError> {
        info!(
            name = %device.name,
            schema_bytes = schema.len(),
            script_bytes = script.len(),
            modules_path = %modules_path.display(),
            "bus engine accepted device"
        );
        Ok(())
    }
}
