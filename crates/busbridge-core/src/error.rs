//! Error taxonomy for device onboarding.
//!
//! The listener surfaces these messages verbatim to onboarding clients, so
//! every variant carries a human-readable description.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OnboardError {
    /// The props blob carries no usable device identifier. Rejected before
    /// any token resolution or engine work.
    #[error("device properties are missing a usable 'id' field")]
    MissingIdentifier,

    #[error("invalid onboarding category: '{0}'")]
    InvalidCategory(String),

    #[error("sharing token could not be redeemed: {0}")]
    TokenInvalid(String),

    #[error("shared file content could not be read: {0}")]
    ReadFailed(String),

    /// The bus engine rejected the device. The engine's failure text is
    /// passed through unmodified.
    #[error("{0}")]
    MaterializationFailed(String),

    #[error("onboarding store error: {0}")]
    Store(String),
}
