use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateRelay {
    pub port: u16,
}

pub async fn get_relay(State(state): State<AppState>) -> Json<serde_json::Value> {
    let port = state.relay.local_addr().await.map(|addr| addr.port());
    Json(json!({
        "data": {
            "port": port,
            "subscribers": state.relay.relay().subscriber_count(),
        }
    }))
}

pub async fn update_relay(
    State(state): State<AppState>,
    Json(input): Json<UpdateRelay>,
) -> Result<Json<serde_json::Value>, AppError> {
    if input.port == 0 {
        return Err(AppError::Configuration(
            "port must be between 1 and 65535".to_string(),
        ));
    }
    let addr = state.relay.reconfigure(input.port).await?;
    Ok(Json(json!({
        "data": {
            "port": addr.port(),
            "subscribers": state.relay.relay().subscriber_count(),
        }
    })))
}
