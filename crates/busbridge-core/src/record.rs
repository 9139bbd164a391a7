//! Onboarding records and their de-duplication keys.

use serde::{Deserialize, Serialize};

use crate::error::OnboardError;

/// Unique identity of an onboarded device, formatted as `category:id`.
///
/// The category is a namespace assigned by the onboarding client (a device
/// family); the id is extracted from the device's properties blob. The pair
/// is the sole de-duplication key in the registry: two records differing
/// only in category never collide.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OnboardingKey(String);

impl OnboardingKey {
    pub fn new(category: &str, id: &str) -> Self {
        Self(format!("{}:{}", category, id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The category portion of the key. Categories are validated to contain
    /// no `:`, so splitting on the first colon is unambiguous.
    pub fn category(&self) -> &str {
        self.0.split_once(':').map(|(c, _)| c).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for OnboardingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One onboarded device as the registry persists it.
///
/// Immutable once persisted: re-adding the same key is a no-op, never an
/// update. `props` is an opaque JSON blob owned by the device family; only
/// the `id` field is contractually extracted, everything else passes
/// through unvalidated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnboardingRecord {
    pub key: OnboardingKey,
    pub name: String,
    pub props: String,
    pub script_token: String,
    pub schema_token: String,
}

impl OnboardingRecord {
    /// Build a record from raw request fields, validating the category and
    /// extracting the mandatory device id from the props blob.
    pub fn from_request(
        category: &str,
        name: impl Into<String>,
        props: impl Into<String>,
        script_token: impl Into<String>,
        schema_token: impl Into<String>,
    ) -> Result<Self, OnboardError> {
        validate_category(category)?;
        let props = props.into();
        let id = extract_id(&props)?;
        Ok(Self {
            key: OnboardingKey::new(category, &id),
            name: name.into(),
            props,
            script_token: script_token.into(),
            schema_token: schema_token.into(),
        })
    }

    /// The device view handed to the bus engine.
    pub fn descriptor(&self) -> DeviceDescriptor {
        DeviceDescriptor {
            name: self.name.clone(),
            props: self.props.clone(),
        }
    }
}

/// Engine-facing device descriptor: display name plus the opaque props blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub name: String,
    pub props: String,
}

/// Extract the mandatory `id` field from a props blob.
///
/// Absence, emptiness, or a non-string value is a rejected request; the id
/// is never silently substituted.
pub fn extract_id(props: &str) -> Result<String, OnboardError> {
    let value: serde_json::Value =
        serde_json::from_str(props).map_err(|_| OnboardError::MissingIdentifier)?;
    match value.get("id").and_then(|v| v.as_str()) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(OnboardError::MissingIdentifier),
    }
}

/// Categories become durable container names, so they must be non-empty,
/// path-safe, and must never collide with the reserved active-set container
/// (which is distinguished by a leading dot).
pub fn validate_category(category: &str) -> Result<(), OnboardError> {
    if category.is_empty()
        || category.starts_with('.')
        || category.contains([':', '/', '\\'])
    {
        return Err(OnboardError::InvalidCategory(category.to_string()));
    }
    Ok(())
}
