//! Compiled-in terminal configuration.
//!
//! Credentials, backend host and token can be overridden at build time with
//! the `WIFI_SSID`, `WIFI_PASS`, `WS_HOST` and `DEVICE_TOKEN` environment
//! variables.

/// Device identifier reported in every outbound message.
pub const DEVICE_ID: &str = "ESP32-ROOM-01";

/// Classroom the terminal is installed in.
pub const CLASSROOM_ID: u32 = 1;

/// Static bearer token issued by the backend for this classroom.
pub const DEVICE_TOKEN: &str = match option_env!("DEVICE_TOKEN") {
    Some(token) => token,
    None => "ESP32-H3WV263437R",
};

/// Backend host.
pub const WS_HOST: &str = match option_env!("WS_HOST") {
    Some(host) => host,
    None => "192.168.1.18",
};

/// Backend port.
pub const WS_PORT: u16 = 8000;

/// Wi-Fi network name.
pub const WIFI_SSID: &str = match option_env!("WIFI_SSID") {
    Some(ssid) => ssid,
    None => "classroom-iot",
};

/// Wi-Fi passphrase.
pub const WIFI_PASS: &str = match option_env!("WIFI_PASS") {
    Some(pass) => pass,
    None => "",
};

/// NTP pool queried at startup.
pub const NTP_SERVER: &str = "pool.ntp.org";

/// Local time offset (UTC+8, no daylight saving).
pub const UTC_OFFSET_SECS: i32 = 8 * 3600;

/// Static identity of the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Device identifier.
    pub device_id: &'static str,

    /// Bearer token passed in the connection query string.
    pub token: &'static str,

    /// Classroom identifier embedded in the connection path.
    pub classroom_id: u32,
}

/// Backend WebSocket endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or address.
    pub host: &'static str,

    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Build the connection URI for a classroom session.
    ///
    /// # Arguments
    /// * `identity` - The identity supplying classroom id and token.
    ///
    /// # Returns
    /// * `String` - `ws://host:port/ws/iot/classroom/{id}/?token={token}`.
    pub fn uri(&self, identity: &DeviceIdentity) -> String {
        format!(
            "ws://{}:{}/ws/iot/classroom/{}/?token={}",
            self.host, self.port, identity.classroom_id, identity.token
        )
    }

    /// Origin header sent with the handshake.
    pub fn origin_header(&self) -> String {
        format!("Origin: http://{}:{}\r\n", self.host, self.port)
    }
}

/// Polling intervals and windows, all in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub badge_poll_ms: u64,
    pub power_sample_ms: u64,
    pub display_refresh_ms: u64,
    pub reconnect_ms: u64,
    pub heartbeat_ms: u64,

    /// How long a badge UID stays in the duplicate filter.
    pub badge_suppress_ms: u64,

    /// How long a transient centered message stays on screen.
    pub message_hold_ms: u64,

    /// Sleep between loop iterations.
    pub loop_tick_ms: u32,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            badge_poll_ms: 100,
            power_sample_ms: 60_000,
            display_refresh_ms: 1_000,
            reconnect_ms: 5_000,
            heartbeat_ms: 30_000,
            badge_suppress_ms: 2_000,
            message_hold_ms: 2_000,
            loop_tick_ms: 10,
        }
    }
}

/// Wi-Fi station credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: &'static str,
    pub password: &'static str,

    /// Join attempts before giving up at boot.
    pub max_attempts: u32,

    /// Delay between join status checks.
    pub attempt_delay_ms: u32,
}

/// Complete terminal configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalConfig {
    pub identity: DeviceIdentity,
    pub endpoint: Endpoint,
    pub timings: Timings,
    pub wifi: WifiCredentials,
    pub ntp_server: &'static str,
    pub utc_offset_secs: i32,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            identity: DeviceIdentity {
                device_id: DEVICE_ID,
                token: DEVICE_TOKEN,
                classroom_id: CLASSROOM_ID,
            },
            endpoint: Endpoint {
                host: WS_HOST,
                port: WS_PORT,
            },
            timings: Timings::default(),
            wifi: WifiCredentials {
                ssid: WIFI_SSID,
                password: WIFI_PASS,
                max_attempts: 30,
                attempt_delay_ms: 500,
            },
            ntp_server: NTP_SERVER,
            utc_offset_secs: UTC_OFFSET_SECS,
        }
    }
}

/// Tests.
#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            device_id: "ESP32-ROOM-01",
            token: "TOKEN-1",
            classroom_id: 7,
        }
    }

    #[test]
    fn uri_embeds_classroom_and_token() {
        let endpoint = Endpoint {
            host: "10.0.0.2",
            port: 8000,
        };

        assert_eq!(
            endpoint.uri(&identity()),
            "ws://10.0.0.2:8000/ws/iot/classroom/7/?token=TOKEN-1"
        );
    }

    #[test]
    fn origin_header_matches_endpoint() {
        let endpoint = Endpoint {
            host: "10.0.0.2",
            port: 8000,
        };

        assert_eq!(endpoint.origin_header(), "Origin: http://10.0.0.2:8000\r\n");
    }

    #[test]
    fn default_timings_match_terminal_intervals() {
        let timings = Timings::default();

        assert_eq!(timings.badge_poll_ms, 100);
        assert_eq!(timings.power_sample_ms, 60_000);
        assert_eq!(timings.display_refresh_ms, 1_000);
        assert_eq!(timings.reconnect_ms, 5_000);
        assert_eq!(timings.heartbeat_ms, 30_000);
    }
}
