//! Core types for the device onboarding bridge.
//!
//! This crate carries the pieces shared between the host process and its
//! clients: onboarding records and keys, the error taxonomy, the seam to the
//! external bus engine, and the sharing-token exchange used to move file
//! content across process boundaries.

pub mod engine;
pub mod error;
pub mod record;
pub mod token;

#[cfg(feature = "test-utils")]
pub mod testing;

pub use engine::{BridgeEngine, EngineError};
pub use error::OnboardError;
pub use record::{extract_id, DeviceDescriptor, OnboardingKey, OnboardingRecord};
pub use token::{FileTokenVault, TokenExchange};
