//! Live sync: the thin pass-through to the engine's continuous-sync
//! primitive.
//!
//! The adapter only validates the shape of the options and hands them to the
//! engine. Connection management, retry and authentication are engine
//! responsibilities; once applied remote changes produce table-change
//! callbacks, the change router treats them exactly like local mutations.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Options for the engine's continuous live-sync channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Websocket endpoint, `ws://` or `wss://`.
    pub endpoint: String,
    /// Logical database name shared by all peers of this sync group.
    pub db_name: String,
    /// Optional bearer token forwarded by the engine during the websocket
    /// upgrade.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl SyncOptions {
    pub fn new(endpoint: impl Into<String>, db_name: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            db_name: db_name.into(),
            auth_token: None,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !(self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://")) {
            return Err(Error::Usage(format!(
                "sync endpoint must be a ws:// or wss:// url, got '{}'",
                self.endpoint
            )));
        }
        if self.db_name.is_empty() {
            return Err(Error::Usage("sync db_name must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_websocket_endpoints() {
        assert!(SyncOptions::new("ws://localhost:8080/sync", "app").validate().is_ok());
        assert!(SyncOptions::new("wss://sync.example.com", "app")
            .with_auth_token("token")
            .validate()
            .is_ok());
    }

    #[test]
    fn rejects_http_endpoints() {
        let err = SyncOptions::new("https://example.com", "app")
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }

    #[test]
    fn rejects_empty_db_name() {
        assert!(SyncOptions::new("ws://localhost", "").validate().is_err());
    }

    #[test]
    fn auth_token_is_omitted_from_json_when_absent() {
        let options = SyncOptions::new("ws://localhost", "app");
        let json = serde_json::to_string(&options).unwrap();
        assert!(!json.contains("auth_token"));
    }
}
