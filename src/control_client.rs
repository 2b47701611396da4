use reqwest::Client;
use serde_json::{json, Value};
use std::fmt;

use crate::models::ThrowKind;

#[derive(Debug)]
pub enum ControlClientError {
    Http(reqwest::Error),
    ServerError { status: u16, body: String },
}

impl fmt::Display for ControlClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlClientError::Http(e) => write!(f, "HTTP error: {e}"),
            ControlClientError::ServerError { status, body } => {
                write!(f, "server returned {status}: {body}")
            }
        }
    }
}

impl std::error::Error for ControlClientError {}

impl From<reqwest::Error> for ControlClientError {
    fn from(e: reqwest::Error) -> Self {
        ControlClientError::Http(e)
    }
}

/// Talks to the control API of a running `kickbonk serve`.
pub struct ControlClient {
    client: Client,
    base_url: String,
}

impl ControlClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn data(resp: reqwest::Response) -> Result<Value, ControlClientError> {
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ControlClientError::ServerError { status, body });
        }
        let body: Value = resp.json().await?;
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }

    /// Fires a throw with the server's default physics and items. Returns
    /// how many display surfaces it was queued for.
    pub async fn throw(
        &self,
        kind: ThrowKind,
        count: Option<u32>,
    ) -> Result<u64, ControlClientError> {
        let url = format!("{}/api/v1/throws", self.base_url);
        let mut body = json!({ "type": kind });
        if let Some(count) = count {
            body["count"] = json!(count);
        }
        let resp = self.client.post(&url).json(&body).send().await?;
        let data = Self::data(resp).await?;
        Ok(data["delivered_to"].as_u64().unwrap_or(0))
    }

    pub async fn status(&self) -> Result<(Value, Value), ControlClientError> {
        let relay = self
            .client
            .get(format!("{}/api/v1/relay", self.base_url))
            .send()
            .await?;
        let relay = Self::data(relay).await?;
        let session = self
            .client
            .get(format!("{}/api/v1/session", self.base_url))
            .send()
            .await?;
        let session = Self::data(session).await?;
        Ok((relay, session))
    }

    pub async fn set_relay_port(&self, port: u16) -> Result<Value, ControlClientError> {
        let url = format!("{}/api/v1/relay", self.base_url);
        let resp = self
            .client
            .put(&url)
            .json(&json!({ "port": port }))
            .send()
            .await?;
        Self::data(resp).await
    }
}
