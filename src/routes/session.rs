use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::error::AppError;
use crate::state::AppState;
use crate::vts::{Expecting, SessionClient};

fn session_json(session: &SessionClient) -> serde_json::Value {
    let pending = session.pending_request().map(|p| {
        let expecting = match p.expecting {
            Expecting::Token => "AuthenticationTokenResponse",
            Expecting::AuthResult => "AuthenticationResponse",
        };
        json!({ "request_id": p.request_id, "expecting": expecting })
    });
    json!({
        "data": {
            "state": session.state(),
            "url": session.url(),
            "pending": pending,
        }
    })
}

pub async fn get_session(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(session_json(&state.session))
}

pub async fn connect(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    state.session.connect()?;
    state.reconnect.resume();
    Ok(Json(session_json(&state.session)))
}

pub async fn disconnect(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.reconnect.pause();
    state.session.disconnect();
    Json(session_json(&state.session))
}
