use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_RELAY_PORT: u16 = 8080;
pub const DEFAULT_CONTROL_PORT: u16 = 8081;
pub const DEFAULT_VTS_PORT: u16 = 8001;

#[derive(Debug, Clone)]
pub struct VtsConfig {
    pub host: String,
    pub port: u16,
    pub token_path: PathBuf,
    /// Delay between reconnect attempts made by the serve loop.
    pub retry_interval: Duration,
    pub autoconnect: bool,
}

impl VtsConfig {
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Address both listeners bind to.
    pub bind_address: IpAddr,
    pub relay_port: u16,
    pub control_port: u16,
    pub vts: VtsConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let token_path = std::env::var("KICKBONK_TOKEN_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_token_path());

        let retry_secs: u64 = std::env::var("KICKBONK_VTS_RETRY_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(3);

        let vts = VtsConfig {
            host: std::env::var("VTS_HOST")
                .ok()
                .filter(|h| !h.trim().is_empty())
                .unwrap_or_else(|| "localhost".to_string()),
            port: port_from_env("VTS_PORT", DEFAULT_VTS_PORT),
            token_path,
            retry_interval: Duration::from_secs(retry_secs),
            autoconnect: std::env::var("KICKBONK_VTS_AUTOCONNECT")
                .map(|v| !(v == "0" || v.eq_ignore_ascii_case("false")))
                .unwrap_or(true),
        };

        Self {
            bind_address: std::env::var("KICKBONK_BIND")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            relay_port: port_from_env("KICKBONK_RELAY_PORT", DEFAULT_RELAY_PORT),
            control_port: port_from_env("KICKBONK_CONTROL_PORT", DEFAULT_CONTROL_PORT),
            vts,
        }
    }
}

fn port_from_env(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|p| p.parse().ok())
        .filter(|p| *p != 0)
        .unwrap_or(default)
}

/// Platform data directory, falling back to the working directory when the
/// platform has no notion of one.
pub fn default_token_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "kickbonk")
        .map(|dirs| dirs.data_dir().join("vts_token.json"))
        .unwrap_or_else(|| PathBuf::from("vts_token.json"))
}
