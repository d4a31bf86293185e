//! Room Controller configuration.
//!
//! Configuration is loaded from environment variables. The Redis URL may
//! carry credentials and is redacted in Debug output.

use crate::engine::{default_media_codecs, CodecCapability, NetworkConfig};
use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default controller instance id prefix.
pub const DEFAULT_CONTROLLER_ID_PREFIX: &str = "rc";

/// Default room limit per controller instance (0 = unlimited).
pub const DEFAULT_MAX_ROOMS: usize = 0;

/// Default peer limit per room (0 = unlimited).
pub const DEFAULT_MAX_PEERS_PER_ROOM: usize = 0;

/// Room Controller configuration.
///
/// Loaded from environment variables with sensible defaults. The Redis URL
/// is optional: without it, embedders run on the in-process session store.
#[derive(Clone)]
pub struct Config {
    /// Redis connection URL for the shared session store, when this
    /// controller runs alongside other instances.
    /// Protected by `SecretString` to prevent accidental logging.
    pub redis_url: Option<SecretString>,

    /// Unique identifier for this controller instance. Rooms created here
    /// are pinned to it.
    pub controller_id: String,

    /// Maximum rooms hosted by this instance (0 = unlimited).
    pub max_rooms: usize,

    /// Maximum peers per room (0 = unlimited).
    pub max_peers_per_room: usize,

    /// Codec set negotiated by every new routing context.
    pub media_codecs: Vec<CodecCapability>,

    /// Network settings applied to every transport.
    pub network: NetworkConfig,
}

/// Custom Debug implementation that redacts the Redis URL.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field(
                "redis_url",
                &self.redis_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("controller_id", &self.controller_id)
            .field("max_rooms", &self.max_rooms)
            .field("max_peers_per_room", &self.max_peers_per_room)
            .field("media_codecs", &self.media_codecs)
            .field("network", &self.network)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: None,
            controller_id: generate_controller_id(),
            max_rooms: DEFAULT_MAX_ROOMS,
            max_peers_per_room: DEFAULT_MAX_PEERS_PER_ROOM,
            media_codecs: default_media_codecs(),
            network: NetworkConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let redis_url = vars.get("REDIS_URL").cloned().map(SecretString::from);

        let controller_id = vars
            .get("RC_CONTROLLER_ID")
            .cloned()
            .unwrap_or_else(generate_controller_id);

        let max_rooms = vars
            .get("RC_MAX_ROOMS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_ROOMS);

        let max_peers_per_room = vars
            .get("RC_MAX_PEERS_PER_ROOM")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_PEERS_PER_ROOM);

        let mut network = NetworkConfig::default();
        if let Some(ip) = vars.get("RC_LISTEN_IP") {
            network.listen_ip = ip.clone();
        }
        network.announced_ip = vars.get("RC_ANNOUNCED_IP").cloned();
        if let Some(port) = vars.get("RC_RTC_MIN_PORT").and_then(|s| s.parse().ok()) {
            network.rtc_min_port = port;
        }
        if let Some(port) = vars.get("RC_RTC_MAX_PORT").and_then(|s| s.parse().ok()) {
            network.rtc_max_port = port;
        }

        if network.rtc_min_port > network.rtc_max_port {
            return Err(ConfigError::InvalidValue(format!(
                "RTC port range is inverted: {}-{}",
                network.rtc_min_port, network.rtc_max_port
            )));
        }

        Ok(Config {
            redis_url,
            controller_id,
            max_rooms,
            max_peers_per_room,
            media_codecs: default_media_codecs(),
            network,
        })
    }
}

/// Generate a controller instance id: `rc-{hostname}-{uuid8}`.
fn generate_controller_id() -> String {
    let hostname = env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
    let uuid_suffix = uuid::Uuid::new_v4().to_string();
    let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
    format!("{DEFAULT_CONTROLLER_ID_PREFIX}-{hostname}-{short_suffix}")
}
