use crate::error::AppError;
use attendance_core::config::{TerminalConfig, WifiCredentials};
use attendance_core::protocol::Outbound;
use attendance_core::terminal::LinkEvent;
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{delay::FreeRtos, modem::Modem},
    io::EspIOError,
    nvs::EspDefaultNvsPartition,
    wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi},
    ws::{
        client::{EspWebSocketClient, EspWebSocketClientConfig, WebSocketEvent, WebSocketEventType},
        FrameType,
    },
};
use log::{debug, info, warn};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

/// Timeout for WebSocket sends.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Stack of the WebSocket client task.
const WS_TASK_STACK: usize = 6 * 1024;

/// Wi-Fi station interface.
pub struct WifiStation {
    /// The Wi-Fi driver.
    wifi: BlockingWifi<EspWifi<'static>>,

    /// Join attempts at boot.
    max_attempts: u32,

    /// Delay between join status checks.
    attempt_delay_ms: u32,
}

impl WifiStation {
    /// Create the driver and start it in station mode.
    ///
    /// # Parameters
    /// - `modem`: The radio.
    /// - `sys_loop`: The system event loop.
    /// - `nvs`: The default NVS partition, used for RF calibration data.
    /// - `credentials`: The network to join.
    ///
    /// # Returns
    /// The started, not yet connected, station.
    pub fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        credentials: &WifiCredentials,
    ) -> Result<Self, AppError> {
        let driver = EspWifi::new(modem, sys_loop.clone(), Some(nvs))
            .map_err(|e| AppError::WifiError(format!("Failed to create Wi-Fi driver: {:?}", e)))?;
        let mut wifi = BlockingWifi::wrap(driver, sys_loop)?;

        let auth_method = if credentials.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: credentials
                .ssid
                .try_into()
                .map_err(|_| AppError::WifiError(format!("SSID too long: {}", credentials.ssid)))?,
            password: credentials
                .password
                .try_into()
                .map_err(|_| AppError::WifiError("Password too long".into()))?,
            auth_method,
            ..Default::default()
        }))?;

        wifi.start()?;

        Ok(Self {
            wifi,
            max_attempts: credentials.max_attempts,
            attempt_delay_ms: credentials.attempt_delay_ms,
        })
    }

    /// Join the network, polling the link for a bounded number of attempts.
    ///
    /// # Returns
    /// Whether the station is connected with an IP address.
    pub fn connect(&mut self) -> bool {
        if let Err(e) = self.wifi.wifi_mut().connect() {
            warn!("Wi-Fi connect request failed: {:?}", e);
        }

        for _ in 0..self.max_attempts {
            if self.is_connected() {
                break;
            }
            FreeRtos::delay_ms(self.attempt_delay_ms);
        }

        if !self.is_connected() {
            warn!("Wi-Fi connection failed");
            return false;
        }

        if let Err(e) = self.wifi.wait_netif_up() {
            warn!("Wi-Fi network interface did not come up: {:?}", e);
            return false;
        }

        info!("Wi-Fi connected, IP address {}", self.ip_address());
        true
    }

    /// Request a join without waiting, if the link is down.
    pub fn ensure_connected(&mut self) {
        if self.is_connected() {
            return;
        }

        info!("Wi-Fi down, requesting reconnect");
        if let Err(e) = self.wifi.wifi_mut().connect() {
            debug!("Wi-Fi reconnect request failed: {:?}", e);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    /// Station IP address as text, empty if unknown.
    pub fn ip_address(&self) -> String {
        self.wifi
            .wifi()
            .sta_netif()
            .get_ip_info()
            .map(|info| info.ip.to_string())
            .unwrap_or_default()
    }
}

/// Persistent WebSocket session to the classroom backend.
///
/// Client callbacks run on the client's own task; they only forward
/// [`LinkEvent`]s over a channel that the main loop drains.
pub struct Session {
    /// Connection URI, token included.
    uri: String,

    /// Extra handshake headers.
    headers: String,

    /// The active client, if any.
    client: Option<EspWebSocketClient<'static>>,

    /// Sender cloned into each client callback.
    events_tx: Sender<LinkEvent>,

    /// Events waiting for the main loop.
    events_rx: Receiver<LinkEvent>,
}

impl Session {
    /// Create a session without connecting.
    pub fn new(config: &TerminalConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel();

        Self {
            uri: config.endpoint.uri(&config.identity),
            headers: config.endpoint.origin_header(),
            client: None,
            events_tx,
            events_rx,
        }
    }

    /// Tear down any existing client and start a new connection.
    ///
    /// The handshake completes asynchronously and is reported as
    /// [`LinkEvent::Connected`].
    ///
    /// # Returns
    /// The result of the operation.
    pub fn connect(&mut self) -> Result<(), AppError> {
        if self.client.take().is_some() {
            // Events of the old client must not leak into the new session.
            let stale = self.events_rx.try_iter().count();
            debug!("Dropped previous client ({} stale events)", stale);
        }

        info!("Connecting to WebSocket: {}", self.uri);

        let config = EspWebSocketClientConfig {
            headers: Some(self.headers.as_str()),
            disable_auto_reconnect: true,
            task_stack: WS_TASK_STACK,
            ..Default::default()
        };

        let tx = self.events_tx.clone();
        let client = EspWebSocketClient::new(&self.uri, &config, SEND_TIMEOUT, move |event| {
            forward_event(&tx, event)
        })
        .map_err(|e| AppError::NetworkError(format!("Failed to start WebSocket client: {:?}", e)))?;

        self.client = Some(client);

        Ok(())
    }

    /// Events received since the last call.
    pub fn drain(&self) -> Vec<LinkEvent> {
        self.events_rx.try_iter().collect()
    }

    /// Send a message as a text frame.
    ///
    /// # Parameters
    /// - `message`: The message.
    ///
    /// # Returns
    /// The result of the operation.
    pub fn send(&mut self, message: &Outbound) -> Result<(), AppError> {
        let text = message
            .encode()
            .map_err(|e| AppError::NetworkError(e.to_string()))?;

        let client = self
            .client
            .as_mut()
            .ok_or_else(|| AppError::NetworkError("No WebSocket client".into()))?;

        info!("Sending: {}", text);

        client
            .send(FrameType::Text(false), text.as_bytes())
            .map_err(|e| AppError::NetworkError(format!("Failed to send message: {:?}", e)))
    }
}

/// Translate a client callback into a [`LinkEvent`] for the main loop.
fn forward_event(tx: &Sender<LinkEvent>, event: &Result<WebSocketEvent, EspIOError>) {
    let link_event = match event {
        Ok(event) => match event.event_type {
            WebSocketEventType::Connected => LinkEvent::Connected,
            WebSocketEventType::Disconnected
            | WebSocketEventType::Close(_)
            | WebSocketEventType::Closed => LinkEvent::Disconnected,
            WebSocketEventType::Text(text) => LinkEvent::Text(text.to_owned()),
            WebSocketEventType::Binary(data) => LinkEvent::Binary(data.len()),
            WebSocketEventType::Ping => LinkEvent::Ping,
            WebSocketEventType::Pong => LinkEvent::Pong,
            _ => return,
        },
        Err(e) => LinkEvent::Error(format!("{:?}", e)),
    };

    // The receiver only goes away with the session.
    let _ = tx.send(link_event);
}
