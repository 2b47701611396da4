use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::request_id;

pub const API_NAME: &str = "VTubeStudioPublicAPI";
pub const API_VERSION: &str = "1.0";

/// Message types of the authentication exchange.
pub mod message_type {
    pub const AUTHENTICATION_TOKEN_REQUEST: &str = "AuthenticationTokenRequest";
    pub const AUTHENTICATION_TOKEN_RESPONSE: &str = "AuthenticationTokenResponse";
    pub const AUTHENTICATION_REQUEST: &str = "AuthenticationRequest";
    pub const AUTHENTICATION_RESPONSE: &str = "AuthenticationResponse";
    pub const API_ERROR: &str = "APIError";
}

/// `errorID` values that mean our credential is missing or no good.
pub mod error_id {
    pub const REQUEST_REQUIRES_AUTHENTICATION: i64 = 8;
    pub const TOKEN_REQUEST_DENIED: i64 = 50;
    pub const AUTHENTICATION_TOKEN_MISSING: i64 = 100;

    pub fn is_credential_error(id: i64) -> bool {
        matches!(
            id,
            REQUEST_REQUIRES_AUTHENTICATION | TOKEN_REQUEST_DENIED | AUTHENTICATION_TOKEN_MISSING
        )
    }
}

/// How this plugin introduces itself to the avatar application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    pub name: String,
    pub developer: String,
    /// Base64 PNG, 128x128.
    pub icon: Option<String>,
}

impl Default for PluginInfo {
    fn default() -> Self {
        Self {
            name: "KickBonk".to_string(),
            developer: "KickBonkDev".to_string(),
            icon: None,
        }
    }
}

/// Outbound request envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRequest {
    pub api_name: &'static str,
    pub api_version: &'static str,
    #[serde(rename = "requestID")]
    pub request_id: String,
    pub message_type: &'static str,
    pub data: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequestData<'a> {
    plugin_name: &'a str,
    plugin_developer: &'a str,
    plugin_icon: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthRequestData<'a> {
    plugin_name: &'a str,
    plugin_developer: &'a str,
    authentication_token: &'a str,
}

impl ApiRequest {
    fn new(message_type: &'static str, data: Value) -> Self {
        Self {
            api_name: API_NAME,
            api_version: API_VERSION,
            request_id: request_id::generate(),
            message_type,
            data,
        }
    }

    pub fn token_request(plugin: &PluginInfo) -> Self {
        let data = TokenRequestData {
            plugin_name: &plugin.name,
            plugin_developer: &plugin.developer,
            plugin_icon: plugin.icon.as_deref(),
        };
        Self::new(
            message_type::AUTHENTICATION_TOKEN_REQUEST,
            serde_json::to_value(data).unwrap_or_default(),
        )
    }

    pub fn authentication(plugin: &PluginInfo, token: &str) -> Self {
        let data = AuthRequestData {
            plugin_name: &plugin.name,
            plugin_developer: &plugin.developer,
            authentication_token: token,
        };
        Self::new(
            message_type::AUTHENTICATION_REQUEST,
            serde_json::to_value(data).unwrap_or_default(),
        )
    }
}

/// Inbound envelope. Only `messageType` is relied on; `requestID` is kept
/// for logging since the peer is not required to echo it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMessage {
    #[serde(rename = "requestID", default)]
    pub request_id: Option<String>,
    pub message_type: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponseData {
    authentication_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponseData {
    authenticated: bool,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorData {
    #[serde(rename = "errorID")]
    error_id: i64,
    #[serde(default)]
    message: String,
}

/// A decoded inbound message, dispatched on `messageType`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiResponse {
    TokenIssued { token: String },
    AuthResult { authenticated: bool, reason: String },
    ApiError { error_id: i64, message: String },
    Other(String),
}

impl ApiMessage {
    pub fn parse(text: &str) -> Result<Self, AppError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn decode(self) -> Result<ApiResponse, AppError> {
        let response = match self.message_type.as_str() {
            message_type::AUTHENTICATION_TOKEN_RESPONSE => {
                let data: TokenResponseData = serde_json::from_value(self.data)?;
                ApiResponse::TokenIssued {
                    token: data.authentication_token,
                }
            }
            message_type::AUTHENTICATION_RESPONSE => {
                let data: AuthResponseData = serde_json::from_value(self.data)?;
                ApiResponse::AuthResult {
                    authenticated: data.authenticated,
                    reason: data.reason,
                }
            }
            message_type::API_ERROR => {
                let data: ApiErrorData = serde_json::from_value(self.data)?;
                ApiResponse::ApiError {
                    error_id: data.error_id,
                    message: data.message,
                }
            }
            _ => ApiResponse::Other(self.message_type),
        };
        Ok(response)
    }
}
