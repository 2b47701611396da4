mod common;

use std::sync::Arc;

use common::{states_until, FakeVts, VtsPeer};
use kickbonk::token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
use kickbonk::vts::{Expecting, PluginInfo, SessionClient, SessionState};
use serde_json::Value;

fn client(vts: &FakeVts, store: &Arc<MemoryTokenStore>) -> SessionClient {
    SessionClient::new(
        vts.url.clone(),
        PluginInfo::default(),
        Arc::clone(store) as Arc<dyn TokenStore>,
    )
}

/// Drives a fresh session through the token path up to Authenticated.
async fn authenticate_fresh(
    vts: &mut FakeVts,
    session: &SessionClient,
    token: &str,
) -> VtsPeer {
    let mut states = session.subscribe();
    session.connect().unwrap();
    let mut peer = vts.accept().await;

    let req = peer.next_request().await;
    assert_eq!(req["messageType"], "AuthenticationTokenRequest");
    peer.issue_token(token).await;
    let req = peer.next_request().await;
    assert_eq!(req["messageType"], "AuthenticationRequest");
    peer.answer_auth(true).await;

    states_until(&mut states, SessionState::Authenticated).await;
    peer
}

#[tokio::test]
async fn test_fresh_session_requests_token_then_authenticates() {
    let mut vts = FakeVts::start().await;
    let store = Arc::new(MemoryTokenStore::default());
    let session = client(&vts, &store);
    let mut states = session.subscribe();

    session.connect().unwrap();
    let mut peer = vts.accept().await;

    let req = peer.next_request().await;
    assert_eq!(req["apiName"], "VTubeStudioPublicAPI");
    assert_eq!(req["apiVersion"], "1.0");
    assert_eq!(req["messageType"], "AuthenticationTokenRequest");
    assert_eq!(req["data"]["pluginName"], "KickBonk");
    assert_eq!(req["data"]["pluginDeveloper"], "KickBonkDev");
    assert!(req["data"]["pluginIcon"].is_null());
    let token_request_id = req["requestID"].as_str().unwrap().to_string();
    assert!(token_request_id.starts_with("KickBonk-"));

    assert_eq!(
        states_until(&mut states, SessionState::Authenticating).await,
        vec![
            SessionState::Connecting,
            SessionState::Connected,
            SessionState::Authenticating,
        ]
    );
    let pending = session.pending_request().unwrap();
    assert_eq!(pending.expecting, Expecting::Token);
    assert_eq!(pending.request_id, token_request_id);

    peer.issue_token("tok-1").await;
    let req = peer.next_request().await;
    assert_eq!(req["messageType"], "AuthenticationRequest");
    assert_eq!(req["data"]["authenticationToken"], "tok-1");
    assert_eq!(req["data"]["pluginName"], "KickBonk");
    assert_ne!(req["requestID"], Value::String(token_request_id));
    // Persisted before the authentication request went out.
    assert_eq!(store.get().await.unwrap().as_deref(), Some("tok-1"));
    assert_eq!(
        session.pending_request().unwrap().expecting,
        Expecting::AuthResult
    );

    peer.answer_auth(true).await;
    assert_eq!(
        states_until(&mut states, SessionState::Authenticated).await,
        vec![SessionState::Authenticated]
    );
    assert!(session.pending_request().is_none());
    assert_eq!(session.state(), SessionState::Authenticated);

    session.disconnect();
}

#[tokio::test]
async fn test_stored_token_skips_token_request() {
    let mut vts = FakeVts::start().await;
    let store = Arc::new(MemoryTokenStore::with_token("saved"));
    let session = client(&vts, &store);
    let mut states = session.subscribe();

    session.connect().unwrap();
    let mut peer = vts.accept().await;

    let req = peer.next_request().await;
    assert_eq!(req["messageType"], "AuthenticationRequest");
    assert_eq!(req["data"]["authenticationToken"], "saved");

    peer.answer_auth(true).await;
    assert_eq!(
        states_until(&mut states, SessionState::Authenticated).await,
        vec![
            SessionState::Connecting,
            SessionState::Connected,
            SessionState::Authenticating,
            SessionState::Authenticated,
        ]
    );
    assert_eq!(store.get().await.unwrap().as_deref(), Some("saved"));

    session.disconnect();
}

#[tokio::test]
async fn test_rejected_token_is_erased_and_next_connect_requests_new_one() {
    let mut vts = FakeVts::start().await;
    let store = Arc::new(MemoryTokenStore::with_token("stale"));
    let session = client(&vts, &store);
    let mut states = session.subscribe();

    session.connect().unwrap();
    let mut peer = vts.accept().await;
    let req = peer.next_request().await;
    assert_eq!(req["messageType"], "AuthenticationRequest");

    peer.answer_auth(false).await;
    states_until(&mut states, SessionState::Error).await;
    assert_eq!(store.get().await.unwrap(), None);
    assert!(session.pending_request().is_none());
    peer.expect_closed().await;

    // Error stays put until someone connects again.
    assert_eq!(session.state(), SessionState::Error);

    session.connect().unwrap();
    let mut peer = vts.accept().await;
    let req = peer.next_request().await;
    assert_eq!(req["messageType"], "AuthenticationTokenRequest");

    session.disconnect();
}

#[tokio::test]
async fn test_denied_token_request_moves_to_error() {
    let mut vts = FakeVts::start().await;
    let store = Arc::new(MemoryTokenStore::default());
    let session = client(&vts, &store);
    let mut states = session.subscribe();

    session.connect().unwrap();
    let mut peer = vts.accept().await;
    peer.next_request().await;

    peer.api_error(50, "User has denied API access for your plugin.")
        .await;
    states_until(&mut states, SessionState::Error).await;
    assert_eq!(store.get().await.unwrap(), None);
    peer.expect_closed().await;
}

#[tokio::test]
async fn test_unrelated_messages_are_ignored_during_handshake() {
    let mut vts = FakeVts::start().await;
    let store = Arc::new(MemoryTokenStore::default());
    let session = client(&vts, &store);
    let mut states = session.subscribe();

    session.connect().unwrap();
    let mut peer = vts.accept().await;
    peer.next_request().await;
    states_until(&mut states, SessionState::Authenticating).await;

    peer.send_raw("definitely not json").await;
    peer.reply(None, "VTubeStudioAPIStateBroadcast", serde_json::json!({}))
        .await;
    // Not a credential error.
    peer.api_error(1, "Internal server error.").await;
    // Out of place: we asked for a token, not for authentication.
    peer.answer_auth(true).await;

    peer.issue_token("tok-2").await;
    let req = peer.next_request().await;
    assert_eq!(req["messageType"], "AuthenticationRequest");
    assert_eq!(req["data"]["authenticationToken"], "tok-2");

    peer.answer_auth(true).await;
    assert_eq!(
        states_until(&mut states, SessionState::Authenticated).await,
        vec![SessionState::Authenticated]
    );

    session.disconnect();
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let mut vts = FakeVts::start().await;
    let store = Arc::new(MemoryTokenStore::default());
    let session = client(&vts, &store);
    let mut peer = authenticate_fresh(&mut vts, &session, "tok-3").await;

    let mut states = session.subscribe();
    session.disconnect();
    session.disconnect();

    assert_eq!(states.recv().await.unwrap(), SessionState::Disconnected);
    assert!(states.try_recv().is_err());
    assert_eq!(session.state(), SessionState::Disconnected);
    peer.expect_closed().await;

    // The token survives a manual disconnect.
    assert_eq!(store.get().await.unwrap().as_deref(), Some("tok-3"));
}

#[tokio::test]
async fn test_lost_link_moves_to_disconnected() {
    let mut vts = FakeVts::start().await;
    let store = Arc::new(MemoryTokenStore::default());
    let session = client(&vts, &store);
    let peer = authenticate_fresh(&mut vts, &session, "tok-4").await;

    let mut states = session.subscribe();
    peer.drop_link();
    assert_eq!(
        states_until(&mut states, SessionState::Disconnected).await,
        vec![SessionState::Disconnected]
    );
    assert_eq!(store.get().await.unwrap().as_deref(), Some("tok-4"));
}

#[tokio::test]
async fn test_reconnect_after_link_loss_reuses_token() {
    let mut vts = FakeVts::start().await;
    let store = Arc::new(MemoryTokenStore::default());
    let session = client(&vts, &store);
    let peer = authenticate_fresh(&mut vts, &session, "tok-5").await;

    let mut states = session.subscribe();
    peer.drop_link();
    states_until(&mut states, SessionState::Disconnected).await;

    session.connect().unwrap();
    let mut peer = vts.accept().await;
    let req = peer.next_request().await;
    assert_eq!(req["messageType"], "AuthenticationRequest");
    assert_eq!(req["data"]["authenticationToken"], "tok-5");

    session.disconnect();
}

#[tokio::test]
async fn test_connect_while_authenticated_is_noop() {
    let mut vts = FakeVts::start().await;
    let store = Arc::new(MemoryTokenStore::default());
    let session = client(&vts, &store);
    let _peer = authenticate_fresh(&mut vts, &session, "tok-6").await;

    let mut states = session.subscribe();
    session.connect().unwrap();
    assert_eq!(session.state(), SessionState::Authenticated);
    assert!(states.try_recv().is_err());

    session.disconnect();
}

#[tokio::test]
async fn test_file_backed_token_is_written_before_authentication() {
    let mut vts = FakeVts::start().await;
    let path = std::env::temp_dir()
        .join(format!("kickbonk-session-{}", uuid::Uuid::new_v4()))
        .join("vts_token.json");
    let store = Arc::new(FileTokenStore::new(&path));
    let session = SessionClient::new(
        vts.url.clone(),
        PluginInfo::default(),
        Arc::clone(&store) as Arc<dyn TokenStore>,
    );
    let mut states = session.subscribe();

    session.connect().unwrap();
    let mut peer = vts.accept().await;
    let req = peer.next_request().await;
    assert_eq!(req["messageType"], "AuthenticationTokenRequest");

    peer.issue_token("on-disk").await;
    let req = peer.next_request().await;
    assert_eq!(req["data"]["authenticationToken"], "on-disk");
    // A fresh store reading the same file sees the token already.
    let reopened = FileTokenStore::new(&path);
    assert_eq!(reopened.get().await.unwrap().as_deref(), Some("on-disk"));

    peer.answer_auth(false).await;
    states_until(&mut states, SessionState::Error).await;
    assert!(!path.exists());
}
