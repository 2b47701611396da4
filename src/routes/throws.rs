use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::models::{default_items, PhysicsParameters, ThrowEvent, ThrowItem, ThrowKind};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateThrow {
    #[serde(rename = "type")]
    pub kind: ThrowKind,
    pub count: Option<u32>,
    pub config: Option<PhysicsParameters>,
    pub items: Option<Vec<ThrowItem>>,
}

impl CreateThrow {
    fn into_event(self) -> Result<ThrowEvent, AppError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let items = self.items.unwrap_or_else(default_items);
        if items.is_empty() {
            return Err(AppError::BadRequest("items must not be empty".to_string()));
        }

        let mut event = ThrowEvent::new(self.kind, config, items);
        if let Some(count) = self.count {
            if count == 0 {
                return Err(AppError::BadRequest("count must be at least 1".to_string()));
            }
            event = event.with_count(count);
        }
        Ok(event)
    }
}

pub async fn create_throw(
    State(state): State<AppState>,
    Json(input): Json<CreateThrow>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let event = input.into_event()?;
    let kind = event.kind;
    let delivered_to = state.relay.relay().publish(event);
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "data": { "type": kind, "delivered_to": delivered_to } })),
    ))
}
