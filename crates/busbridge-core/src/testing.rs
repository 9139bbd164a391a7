//! Test doubles for the engine and token-exchange seams.
//!
//! Gated behind the `test-utils` feature so dependent crates can share them
//! in integration tests without shipping them in release builds.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::engine::{BridgeEngine, EngineError};
use crate::error::OnboardError;
use crate::record::DeviceDescriptor;
use crate::token::TokenExchange;

/// One recorded `add_device` invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AddDeviceCall {
    pub name: String,
    pub props: String,
    pub schema: String,
    pub script: String,
}

/// Engine double that records every invocation and can be told to reject
/// devices whose name contains a given substring.
#[derive(Default)]
pub struct RecordingEngine {
    calls: Mutex<Vec<AddDeviceCall>>,
    reject_matching: Mutex<Option<(String, String)>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any device whose name contains `needle`, failing with
    /// `message`.
    pub fn reject_names_containing(&self, needle: &str, message: &str) {
        *self.reject_matching.lock().unwrap() = Some((needle.to_string(), message.to_string()));
    }

    pub fn invocations(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<AddDeviceCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BridgeEngine for RecordingEngine {
    async fn add_device(
        &self,
        device: &DeviceDescriptor,
        schema: &str,
        script: &str,
        _modules_path: &Path,
    ) -> Result<(), EngineError> {
        if let Some((needle, message)) = self.reject_matching.lock().unwrap().clone() {
            if device.name.contains(&needle) {
                return Err(EngineError(message));
            }
        }
        self.calls.lock().unwrap().push(AddDeviceCall {
            name: device.name.clone(),
            props: device.props.clone(),
            schema: schema.to_string(),
            script: script.to_string(),
        });
        Ok(())
    }
}

/// In-memory token exchange: token -> content, no filesystem involved.
#[derive(Default)]
pub struct StaticTokens {
    entries: HashMap<String, String>,
}

impl StaticTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, token: &str, content: &str) -> Self {
        self.entries.insert(token.to_string(), content.to_string());
        self
    }
}

#[async_trait]
impl TokenExchange for StaticTokens {
    async fn resolve(&self, token: &str) -> Result<String, OnboardError> {
        self.entries
            .get(token)
            .cloned()
            .ok_or_else(|| OnboardError::TokenInvalid(token.to_string()))
    }
}
