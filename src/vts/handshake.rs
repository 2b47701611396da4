//! The token-issuance-then-authentication exchange, free of any I/O other
//! than the token store.
//!
//! Responses are dispatched on `messageType` and checked against what we
//! are currently waiting for. The avatar API does not promise to echo
//! `requestID`, so the outstanding request id is kept for diagnostics only.

use std::sync::Arc;

use super::messages::{error_id, ApiMessage, ApiRequest, ApiResponse, PluginInfo};
use crate::error::AppError;
use crate::token_store::TokenStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expecting {
    /// Sent `AuthenticationTokenRequest`.
    Token,
    /// Sent `AuthenticationRequest`.
    AuthResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub request_id: String,
    pub expecting: Expecting,
}

/// What the link should do after a message has been handled.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Send(ApiRequest),
    Authenticated,
    /// The credential was refused and has already been erased.
    Rejected(String),
    Ignore,
}

pub struct Handshake {
    plugin: PluginInfo,
    store: Arc<dyn TokenStore>,
    pending: Option<PendingRequest>,
}

impl Handshake {
    pub fn new(plugin: PluginInfo, store: Arc<dyn TokenStore>) -> Self {
        Self {
            plugin,
            store,
            pending: None,
        }
    }

    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    /// First request once the link is up: authenticate with the stored
    /// token, or ask for a new one.
    pub async fn start(&mut self) -> Result<ApiRequest, AppError> {
        self.pending = None;
        let request = match self.store.get().await? {
            Some(token) => self.authentication(&token),
            None => self.token_request(),
        };
        Ok(request)
    }

    pub async fn handle(&mut self, message: ApiMessage) -> Result<Step, AppError> {
        let request_id = message.request_id.clone();
        match message.decode()? {
            ApiResponse::TokenIssued { token } => {
                if !self.is_expecting(Expecting::Token) {
                    tracing::warn!(?request_id, "unexpected token response, ignoring");
                    return Ok(Step::Ignore);
                }
                // Persist before use so a crash here keeps the credential.
                self.store.set(&token).await?;
                tracing::info!("received VTube Studio token");
                Ok(Step::Send(self.authentication(&token)))
            }
            ApiResponse::AuthResult {
                authenticated,
                reason,
            } => {
                if !self.is_expecting(Expecting::AuthResult) {
                    tracing::warn!(?request_id, "unexpected authentication response, ignoring");
                    return Ok(Step::Ignore);
                }
                self.pending = None;
                if authenticated {
                    Ok(Step::Authenticated)
                } else {
                    self.reject(reason).await
                }
            }
            ApiResponse::ApiError { error_id, message } => {
                tracing::warn!(?request_id, error_id, "VTube Studio API error: {message}");
                if error_id::is_credential_error(error_id) {
                    self.pending = None;
                    self.reject(message).await
                } else {
                    Ok(Step::Ignore)
                }
            }
            ApiResponse::Other(message_type) => {
                tracing::debug!(?request_id, "ignoring {message_type}");
                Ok(Step::Ignore)
            }
        }
    }

    fn is_expecting(&self, expecting: Expecting) -> bool {
        self.pending.as_ref().map(|p| p.expecting) == Some(expecting)
    }

    async fn reject(&mut self, reason: String) -> Result<Step, AppError> {
        self.store.clear().await?;
        Ok(Step::Rejected(reason))
    }

    fn token_request(&mut self) -> ApiRequest {
        let request = ApiRequest::token_request(&self.plugin);
        self.track(&request, Expecting::Token);
        request
    }

    fn authentication(&mut self, token: &str) -> ApiRequest {
        let request = ApiRequest::authentication(&self.plugin, token);
        self.track(&request, Expecting::AuthResult);
        request
    }

    fn track(&mut self, request: &ApiRequest, expecting: Expecting) {
        self.pending = Some(PendingRequest {
            request_id: request.request_id.clone(),
            expecting,
        });
    }
}
