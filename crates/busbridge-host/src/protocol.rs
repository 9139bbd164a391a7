//! Wire protocol for the host service channel.
//!
//! Line-delimited JSON: one request or response object per `\n`-terminated
//! line. The field set is deliberately flat; the response is a single
//! string that is either a well-known status or a verbatim error message.

use serde::{Deserialize, Serialize};

pub const CMD_ADD_DEVICE: &str = "AddDevice";
pub const CMD_HEALTHCHECK: &str = "healthcheck";

pub const RESP_SUCCEEDED: &str = "succeeded";
pub const RESP_HEALTHY: &str = "healthy";
pub const RESP_FAILED: &str = "failed";

/// Client-to-host command message. All fields beyond `command` are only
/// required for `AddDevice`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Opaque device properties blob; must contain an extractable `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<String>,
    /// Sharing token resolving to the translator script text.
    #[serde(rename = "translatorJs", default, skip_serializing_if = "Option::is_none")]
    pub translator_js: Option<String>,
    /// Sharing token resolving to the schema text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Request {
    pub fn healthcheck() -> Self {
        Self {
            command: Some(CMD_HEALTHCHECK.to_string()),
            ..Self::default()
        }
    }

    pub fn add_device(
        name: impl Into<String>,
        props: impl Into<String>,
        translator_js: impl Into<String>,
        schema: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            command: Some(CMD_ADD_DEVICE.to_string()),
            name: Some(name.into()),
            props: Some(props.into()),
            translator_js: Some(translator_js.into()),
            schema: Some(schema.into()),
            category: Some(category.into()),
        }
    }

    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let mut json = serde_json::to_string(self)?;
        json.push('\n');
        Ok(json)
    }
}

/// Host-to-client reply: a single status or error-message string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub response: String,
}

impl Response {
    pub fn succeeded() -> Self {
        Self {
            response: RESP_SUCCEEDED.to_string(),
        }
    }

    pub fn healthy() -> Self {
        Self {
            response: RESP_HEALTHY.to_string(),
        }
    }

    pub fn failed() -> Self {
        Self {
            response: RESP_FAILED.to_string(),
        }
    }

    /// An error surfaced verbatim to the caller.
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            response: text.into(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.response == RESP_HEALTHY
    }

    pub fn is_succeeded(&self) -> bool {
        self.response == RESP_SUCCEEDED
    }

    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let mut json = serde_json::to_string(self)?;
        json.push('\n');
        Ok(json)
    }
}
