use serde::Deserialize;

/// Top-level configuration.
///
/// Holds the messenger (`client`), the development relay (`relay`) and
/// logging (`log`) sections.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub client: ClientSettings,
    pub relay: RelaySettings,
    pub log: LogSettings,
}

/// Messenger connection settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ClientSettings {
    /// Broker endpoint, `scheme://host:port`.
    pub endpoint: String,
    pub connect_timeout_ms: u64,
    pub send_timeout_ms: u64,
    /// Frames above this size are refused by the TCP transport.
    pub max_frame_bytes: usize,
}

/// Development relay settings.
#[derive(Debug, Deserialize, Clone)]
pub struct RelaySettings {
    pub host: String,
    pub port: u16,
    /// How long a delivery may stay unaccepted before it is sent again.
    pub ack_timeout_ms: u64,
    pub max_retries: u8,
    pub history_path: String,
    pub history_ttl_secs: i64,
    pub history_max_per_address: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Settings as found in files or the environment, every value optional.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub client: Option<PartialClientSettings>,
    pub relay: Option<PartialRelaySettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialClientSettings {
    pub endpoint: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    pub send_timeout_ms: Option<u64>,
    pub max_frame_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialRelaySettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub ack_timeout_ms: Option<u64>,
    pub max_retries: Option<u8>,
    pub history_path: Option<String>,
    pub history_ttl_secs: Option<i64>,
    pub history_max_per_address: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            client: ClientSettings {
                endpoint: "amqp://127.0.0.1:5672".to_string(),
                connect_timeout_ms: 5000,
                send_timeout_ms: 5000,
                max_frame_bytes: 1024 * 1024,
            },
            relay: RelaySettings {
                host: "127.0.0.1".to_string(),
                port: 5672,
                ack_timeout_ms: 5000,
                max_retries: 5,
                history_path: "barker_db".to_string(),
                history_ttl_secs: 3600,
                history_max_per_address: 100,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Fill every missing value from `Settings::default()`.
    pub fn merge_with_defaults(self) -> Settings {
        let default = Settings::default();
        let client = self.client.unwrap_or_default();
        let relay = self.relay.unwrap_or_default();
        let log = self.log.unwrap_or_default();

        Settings {
            client: ClientSettings {
                endpoint: client.endpoint.unwrap_or(default.client.endpoint),
                connect_timeout_ms: client
                    .connect_timeout_ms
                    .unwrap_or(default.client.connect_timeout_ms),
                send_timeout_ms: client
                    .send_timeout_ms
                    .unwrap_or(default.client.send_timeout_ms),
                max_frame_bytes: client
                    .max_frame_bytes
                    .unwrap_or(default.client.max_frame_bytes),
            },
            relay: RelaySettings {
                host: relay.host.unwrap_or(default.relay.host),
                port: relay.port.unwrap_or(default.relay.port),
                ack_timeout_ms: relay.ack_timeout_ms.unwrap_or(default.relay.ack_timeout_ms),
                max_retries: relay.max_retries.unwrap_or(default.relay.max_retries),
                history_path: relay.history_path.unwrap_or(default.relay.history_path),
                history_ttl_secs: relay
                    .history_ttl_secs
                    .unwrap_or(default.relay.history_ttl_secs),
                history_max_per_address: relay
                    .history_max_per_address
                    .unwrap_or(default.relay.history_max_per_address),
            },
            log: LogSettings {
                level: log.level.unwrap_or(default.log.level),
            },
        }
    }
}
