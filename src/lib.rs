pub mod config;
pub mod control_client;
pub mod error;
pub mod models;
pub mod reconnect;
pub mod relay;
pub mod request_id;
pub mod routes;
pub mod state;
pub mod token_store;
pub mod vts;
