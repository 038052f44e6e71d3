use std::path::Path;
use std::time::Duration;

use poker_room_core::TableConfig;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable naming an optional JSON config file.
pub const CONFIG_ENV: &str = "POKER_ROOM_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Inbound frames above this size drop the connection.
    pub max_conn_bytes: usize,
    pub max_chat_len: usize,
    pub keepalive_secs: u64,
    /// How long a disconnected player keeps the seat.
    pub reconnect_grace_ms: u64,
    /// Outbound messages buffered per connection.
    pub channel_capacity: usize,
    pub room: RoomConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: "0.0.0.0:25917".to_string(),
            max_conn_bytes: 10 * 1024,
            max_chat_len: 256,
            keepalive_secs: 10,
            reconnect_grace_ms: 60_000,
            channel_capacity: 32,
            room: RoomConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads the file named by `POKER_ROOM_CONFIG`, or the defaults when unset.
    pub fn load() -> Result<ServerConfig, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => ServerConfig::from_file(Path::new(&path)),
            None => Ok(ServerConfig::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<ServerConfig, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        ServerConfig::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<ServerConfig, ConfigError> {
        let config: ServerConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(2..=7).contains(&self.room.table.num_seats) {
            return Err(ConfigError::Invalid(format!("num_seats {} is not between 2 and 7", self.room.table.num_seats)));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid("channel_capacity must be positive".to_string()));
        }
        Ok(())
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    pub fn reconnect_grace(&self) -> Duration {
        Duration::from_millis(self.reconnect_grace_ms)
    }
}

/// Per-room table settings and pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    pub table: TableConfig,
    /// Pause after a player's action is broadcast.
    pub action_delay_ms: u64,
    /// Pause after each community card revealed with no betting left.
    pub reveal_delay_ms: u64,
    /// Pause between the round-over summary and the next deal.
    pub round_over_delay_ms: u64,
}

impl Default for RoomConfig {
    fn default() -> Self {
        RoomConfig {
            table: TableConfig::default(),
            action_delay_ms: 2000,
            reveal_delay_ms: 2500,
            round_over_delay_ms: 5000,
        }
    }
}

impl RoomConfig {
    /// No pauses at all, for tests.
    pub fn unpaced() -> RoomConfig {
        RoomConfig { action_delay_ms: 0, reveal_delay_ms: 0, round_over_delay_ms: 0, ..RoomConfig::default() }
    }

    pub fn action_delay(&self) -> Duration {
        Duration::from_millis(self.action_delay_ms)
    }

    pub fn reveal_delay(&self) -> Duration {
        Duration::from_millis(self.reveal_delay_ms)
    }

    pub fn round_over_delay(&self) -> Duration {
        Duration::from_millis(self.round_over_delay_ms)
    }
}
