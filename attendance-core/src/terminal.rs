//! Terminal session state and the handlers the main loop drives.
//!
//! The terminal never touches hardware. Peripheral readings and network
//! events come in through the `on_*` handlers; what should happen in
//! response goes out as a list of [`Effect`]s.

use crate::config::{DeviceIdentity, TerminalConfig, Timings};
use crate::protocol::{parse_inbound, Inbound, Outbound};
use crate::schedule::{Concern, Schedule};
use crate::screen::Frame;
use enumset::EnumSet;
use log::{debug, info, warn};

/// Events reported by the network session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Handshake completed.
    Connected,

    /// Connection closed by either side.
    Disconnected,

    /// Transport error; the connection is considered lost.
    Error(String),

    /// Text frame received.
    Text(String),

    /// Binary frame received (length only).
    Binary(usize),

    Ping,
    Pong,
}

/// Work the firmware must carry out on behalf of the terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send a message over the open connection.
    Send(Outbound),

    /// Replace the screen contents.
    Show(Frame),

    /// Tear down the current connection and start a new one.
    Reconnect,
}

/// Connection status text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ready,
    Connected,
    Disconnected,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ready => "Ready",
            Status::Connected => "Connected",
            Status::Disconnected => "Disconnected",
        }
    }
}

/// Session state of the terminal.
#[derive(Debug, Clone)]
pub struct Terminal {
    identity: DeviceIdentity,
    timings: Timings,
    schedule: Schedule,
    connected: bool,
    status: Status,
    last_uid: Option<String>,
    suppress_until_ms: u64,
    power_w: f32,
    teacher: Option<String>,
    last_error: Option<String>,
    parse_errors: u32,
    hold_until_ms: u64,
}

impl Terminal {
    /// Create a disconnected terminal.
    ///
    /// # Arguments
    /// * `config` - Identity and timings.
    /// * `boot_ms` - Loop clock at boot; every timer starts here.
    ///
    /// # Returns
    /// * `Terminal` - The initial state.
    pub fn new(config: &TerminalConfig, boot_ms: u64) -> Self {
        Self {
            identity: config.identity.clone(),
            timings: config.timings,
            schedule: Schedule::new(&config.timings, boot_ms),
            connected: false,
            status: Status::Ready,
            last_uid: None,
            suppress_until_ms: boot_ms,
            power_w: 0.0,
            teacher: None,
            last_error: None,
            parse_errors: 0,
            hold_until_ms: boot_ms,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn power_w(&self) -> f32 {
        self.power_w
    }

    pub fn teacher(&self) -> Option<&str> {
        self.teacher.as_deref()
    }

    pub fn last_uid(&self) -> Option<&str> {
        self.last_uid.as_deref()
    }

    /// Last error text pushed by the backend.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Inbound payloads that were not valid JSON.
    pub fn parse_errors(&self) -> u32 {
        self.parse_errors
    }

    /// Concerns to service in this loop iteration.
    ///
    /// # Arguments
    /// * `now_ms` - Current loop clock.
    ///
    /// # Returns
    /// * `EnumSet<Concern>` - Due concerns, already marked as serviced.
    pub fn due(&mut self, now_ms: u64) -> EnumSet<Concern> {
        self.expire_suppression(now_ms);

        let mut eligible = Concern::Badge | Concern::Power;

        if now_ms >= self.hold_until_ms {
            eligible.insert(Concern::Display);
        }

        if self.connected {
            eligible.insert(Concern::Heartbeat);
        } else {
            eligible.insert(Concern::Reconnect);
        }

        self.schedule.take_due(now_ms, eligible)
    }

    /// Apply a network session event.
    pub fn on_link(&mut self, event: LinkEvent, now_ms: u64) -> Vec<Effect> {
        match event {
            LinkEvent::Connected => {
                self.connected = true;
                self.status = Status::Connected;
                info!("WebSocket {}", self.status.as_str());
                // Report a fresh reading right away.
                self.schedule.force(Concern::Power);
                vec![self.show(Frame::centered("WS Connected!", "Ready to scan"), now_ms)]
            }
            LinkEvent::Disconnected => {
                let was_connected = self.connected;
                self.connected = false;
                self.status = Status::Disconnected;
                if was_connected {
                    info!("WebSocket {}", self.status.as_str());
                }
                Vec::new()
            }
            LinkEvent::Error(reason) => {
                self.connected = false;
                self.status = Status::Disconnected;
                warn!("WebSocket error: {reason} ({})", self.status.as_str());
                Vec::new()
            }
            LinkEvent::Text(text) => self.on_text(&text, now_ms),
            LinkEvent::Binary(len) => {
                info!("Binary frame of {len} bytes ignored");
                Vec::new()
            }
            LinkEvent::Ping => {
                debug!("Ping received");
                Vec::new()
            }
            LinkEvent::Pong => {
                debug!("Pong received");
                Vec::new()
            }
        }
    }

    fn on_text(&mut self, text: &str, now_ms: u64) -> Vec<Effect> {
        info!("Received: {text}");

        let inbound = match parse_inbound(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                self.parse_errors = self.parse_errors.saturating_add(1);
                warn!("{e} ({} parse errors so far)", self.parse_errors);
                return Vec::new();
            }
        };

        match inbound {
            Inbound::Ack => {
                info!("Server acknowledged");
                Vec::new()
            }
            Inbound::Rejected { message } => {
                warn!(
                    "Server rejected message: {}",
                    message.as_deref().unwrap_or("no reason given")
                );
                Vec::new()
            }
            Inbound::AttendanceIn { teacher } => {
                info!("Attendance recorded for {teacher}");
                let frame = Frame::centered("Welcome!", &teacher);
                self.teacher = Some(teacher);
                vec![self.show(frame, now_ms)]
            }
            Inbound::AttendanceError { message } => {
                let message = message.unwrap_or_else(|| "Unknown".to_owned());
                warn!("Attendance error: {message}");
                let frame = Frame::centered("Error!", &message);
                self.last_error = Some(message);
                vec![self.show(frame, now_ms)]
            }
            Inbound::Unrecognized => {
                debug!("Unrecognized message ignored");
                Vec::new()
            }
        }
    }

    /// Handle the result of a badge poll.
    ///
    /// A UID equal to the last one seen within the suppression window is
    /// dropped; any other UID is reported and restarts the window.
    ///
    /// # Arguments
    /// * `uid` - The badge identifier, or `None` if no new card was read.
    /// * `now_ms` - Current loop clock.
    ///
    /// # Returns
    /// * `Vec<Effect>` - Screen updates and, when connected, the scan message.
    pub fn on_badge(&mut self, uid: Option<&str>, now_ms: u64) -> Vec<Effect> {
        self.expire_suppression(now_ms);

        let Some(uid) = uid.filter(|uid| !uid.is_empty()) else {
            return Vec::new();
        };

        if self.last_uid.as_deref() == Some(uid) {
            debug!("Badge {uid} suppressed");
            return Vec::new();
        }

        info!("RFID detected: {uid}");
        self.last_uid = Some(uid.to_owned());
        self.suppress_until_ms = now_ms + self.timings.badge_suppress_ms;

        let mut effects = vec![self.show(Frame::centered("Card Detected!", uid), now_ms)];

        if self.connected {
            info!("Sending RFID data for {uid}");
            effects.push(Effect::Send(Outbound::Scan {
                device_id: self.identity.device_id,
                rfid_uid: uid.to_owned(),
                power: self.power_w,
            }));
            effects.push(self.show(Frame::centered("Card Sent!", uid), now_ms));
        } else {
            warn!("No connection, badge {uid} not sent");
            effects.push(self.show(
                Frame::centered("No Connection!", &format!("Card: {uid}")),
                now_ms,
            ));
        }

        effects
    }

    /// Record a new power sample and report it when connected.
    pub fn on_power_sample(&mut self, watts: f32) -> Vec<Effect> {
        info!("Power reading: {watts:.1} W");
        self.power_w = watts;

        if self.connected {
            vec![Effect::Send(Outbound::Power {
                device_id: self.identity.device_id,
                power: watts,
            })]
        } else {
            Vec::new()
        }
    }

    /// Status layout for the periodic display refresh.
    ///
    /// # Arguments
    /// * `clock` - `HH:MM` or the unsynchronized placeholder.
    ///
    /// # Returns
    /// * `Effect` - The screen update.
    pub fn refresh_display(&self, clock: &str) -> Effect {
        Effect::Show(Frame::status(
            clock,
            self.connected,
            self.power_w,
            self.teacher(),
        ))
    }

    pub fn heartbeat(&self) -> Vec<Effect> {
        debug!("Sending heartbeat");
        vec![Effect::Send(Outbound::heartbeat(self.identity.device_id))]
    }

    pub fn reconnect(&self) -> Vec<Effect> {
        info!("Attempting to reconnect WebSocket...");
        vec![Effect::Reconnect]
    }

    /// Run every due concern that needs no peripheral reading.
    ///
    /// Badge and power concerns are left to the caller, which owns the
    /// reader and the ranging sensor.
    pub fn service(&mut self, concern: Concern, clock: &str) -> Vec<Effect> {
        match concern {
            Concern::Display => vec![self.refresh_display(clock)],
            Concern::Heartbeat => self.heartbeat(),
            Concern::Reconnect => self.reconnect(),
            Concern::Badge | Concern::Power => Vec::new(),
        }
    }

    fn show(&mut self, frame: Frame, now_ms: u64) -> Effect {
        self.hold_until_ms = now_ms + self.timings.message_hold_ms;
        Effect::Show(frame)
    }

    fn expire_suppression(&mut self, now_ms: u64) {
        if self.last_uid.is_some() && now_ms >= self.suppress_until_ms {
            self.last_uid = None;
        }
    }
}

/// Tests.
#[cfg(test)]
mod tests {
    use super::*;

    fn terminal() -> Terminal {
        Terminal::new(&TerminalConfig::default(), 0)
    }

    fn connected() -> Terminal {
        let mut terminal = terminal();
        terminal.on_link(LinkEvent::Connected, 0);
        terminal
    }

    fn sends(effects: &[Effect]) -> Vec<&Outbound> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Send(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    fn last_frame(effects: &[Effect]) -> Option<&Frame> {
        effects.iter().rev().find_map(|effect| match effect {
            Effect::Show(frame) => Some(frame),
            _ => None,
        })
    }

    #[test]
    fn badge_scan_while_connected_sends_once() {
        let mut terminal = connected();
        terminal.on_power_sample(437.0);

        let effects = terminal.on_badge(Some("04A1B2C3"), 100);

        assert_eq!(
            sends(&effects),
            vec![&Outbound::Scan {
                device_id: "ESP32-ROOM-01",
                rfid_uid: "04A1B2C3".into(),
                power: 437.0,
            }]
        );

        let frame = last_frame(&effects).unwrap();
        assert_eq!(frame.line(0).trim(), "Card Sent!");
        assert_eq!(frame.line(1).trim(), "04A1B2C3");
    }

    #[test]
    fn badge_scan_while_offline_shows_no_connection() {
        let mut terminal = terminal();

        let effects = terminal.on_badge(Some("04A1B2C3"), 100);

        assert!(sends(&effects).is_empty());
        let frame = last_frame(&effects).unwrap();
        assert_eq!(frame.line(0).trim(), "No Connection!");
        assert_eq!(frame.line(1).trim(), "Card: 04A1B2C3");
    }

    #[test]
    fn duplicate_badge_suppressed_until_window_expires() {
        let mut terminal = connected();

        assert_eq!(sends(&terminal.on_badge(Some("04A1B2C3"), 100)).len(), 1);
        assert!(terminal.on_badge(Some("04A1B2C3"), 200).is_empty());
        assert!(terminal.on_badge(Some("04A1B2C3"), 2_000).is_empty());
        assert_eq!(terminal.last_uid(), Some("04A1B2C3"));

        terminal.due(2_100);
        assert_eq!(terminal.last_uid(), None);
        assert_eq!(sends(&terminal.on_badge(Some("04A1B2C3"), 2_200)).len(), 1);
    }

    #[test]
    fn different_badge_accepted_within_window() {
        let mut terminal = connected();

        terminal.on_badge(Some("04A1B2C3"), 100);
        let effects = terminal.on_badge(Some("DEADBEEF"), 300);

        assert_eq!(sends(&effects).len(), 1);
        assert_eq!(terminal.last_uid(), Some("DEADBEEF"));
    }

    #[test]
    fn empty_badge_poll_is_noop() {
        let mut terminal = connected();

        assert!(terminal.on_badge(None, 100).is_empty());
        assert!(terminal.on_badge(Some(""), 200).is_empty());
        assert_eq!(terminal.last_uid(), None);
    }

    #[test]
    fn attendance_in_sets_teacher_on_status_line() {
        let mut terminal = connected();

        let effects = terminal.on_link(
            LinkEvent::Text(r#"{"event":"attendance_in","data":{"teacher":"Ms. Santos"}}"#.into()),
            500,
        );

        assert_eq!(last_frame(&effects).unwrap().line(1).trim(), "Ms. Santos");
        assert_eq!(terminal.teacher(), Some("Ms. Santos"));

        let Effect::Show(frame) = terminal.refresh_display("09:30") else {
            panic!("refresh must show a frame");
        };
        assert_eq!(frame.line(1), "Ms. Santos");

        // Persists across unrelated traffic.
        terminal.on_link(LinkEvent::Text(r#"{"status":"ok"}"#.into()), 600);
        terminal.on_link(LinkEvent::Disconnected, 700);
        assert_eq!(terminal.teacher(), Some("Ms. Santos"));
    }

    #[test]
    fn long_teacher_name_truncated_on_screen() {
        let mut terminal = connected();

        terminal.on_link(
            LinkEvent::Text(
                r#"{"event":"attendance_in","data":{"teacher":"Professor Maria Dela Cruz"}}"#.into(),
            ),
            500,
        );

        let Effect::Show(frame) = terminal.refresh_display("09:30") else {
            panic!("refresh must show a frame");
        };
        assert_eq!(frame.line(1), "Professor Maria ");
        assert_eq!(terminal.teacher(), Some("Professor Maria Dela Cruz"));
    }

    #[test]
    fn attendance_error_shows_message() {
        let mut terminal = connected();

        let effects = terminal.on_link(
            LinkEvent::Text(r#"{"event":"attendance_error","data":{"message":"Unknown RFID tag"}}"#.into()),
            500,
        );
        let frame = last_frame(&effects).unwrap();

        assert_eq!(frame.line(0).trim(), "Error!");
        assert_eq!(frame.line(1).trim(), "Unknown RFID tag");
        assert_eq!(terminal.last_error(), Some("Unknown RFID tag"));

        let effects = terminal.on_link(LinkEvent::Text(r#"{"event":"attendance_error"}"#.into()), 600);
        assert_eq!(last_frame(&effects).unwrap().line(1).trim(), "Unknown");
    }

    #[test]
    fn unrecognized_payloads_do_not_mutate_state() {
        let mut terminal = connected();
        terminal.on_power_sample(120.0);

        for text in [
            r#"{"type":"initial_data","data":{"teacher":"Someone"}}"#,
            r#"{"event":"attendance_duplicate","data":{"teacher":"Someone"}}"#,
            r#"{"data":{"teacher":"Someone"}}"#,
            r#"{"event":"attendance_in","data":{}}"#,
            "42",
        ] {
            let effects = terminal.on_link(LinkEvent::Text(text.into()), 500);
            assert!(effects.is_empty(), "{text}");
        }

        assert_eq!(terminal.teacher(), None);
        assert_eq!(terminal.last_error(), None);
        assert!(terminal.is_connected());
        assert_eq!(terminal.power_w(), 120.0);
        assert_eq!(terminal.parse_errors(), 0);
    }

    #[test]
    fn malformed_payloads_are_counted() {
        let mut terminal = connected();

        assert!(terminal.on_link(LinkEvent::Text("not json".into()), 500).is_empty());
        assert!(terminal.on_link(LinkEvent::Text("{\"event\":".into()), 600).is_empty());

        assert_eq!(terminal.parse_errors(), 2);
        assert_eq!(terminal.teacher(), None);
    }

    #[test]
    fn connect_triggers_immediate_power_report() {
        let mut terminal = terminal();

        let effects = terminal.on_link(LinkEvent::Connected, 1_000);
        assert_eq!(terminal.status(), Status::Connected);
        assert_eq!(terminal.status().as_str(), "Connected");
        assert_eq!(last_frame(&effects).unwrap().line(0).trim(), "WS Connected!");

        let due = terminal.due(1_010);
        assert!(due.contains(Concern::Power));

        let effects = terminal.on_power_sample(64.0);
        assert_eq!(
            sends(&effects),
            vec![&Outbound::Power {
                device_id: "ESP32-ROOM-01",
                power: 64.0
            }]
        );
    }

    #[test]
    fn power_sample_offline_is_kept_but_not_sent() {
        let mut terminal = terminal();

        assert!(terminal.on_power_sample(75.0).is_empty());
        assert_eq!(terminal.power_w(), 75.0);
    }

    #[test]
    fn disconnect_and_error_drop_connection() {
        let mut terminal = connected();
        terminal.on_link(LinkEvent::Disconnected, 10);
        assert!(!terminal.is_connected());
        assert_eq!(terminal.status(), Status::Disconnected);

        terminal.on_link(LinkEvent::Connected, 20);
        terminal.on_link(LinkEvent::Error("connection reset".into()), 30);
        assert!(!terminal.is_connected());
        assert_eq!(terminal.status().as_str(), "Disconnected");
    }

    #[test]
    fn reconnect_only_while_disconnected() {
        let mut terminal = terminal();

        assert!(!terminal.due(4_999).contains(Concern::Reconnect));
        assert!(terminal.due(5_000).contains(Concern::Reconnect));
        assert!(!terminal.due(9_999).contains(Concern::Reconnect));

        terminal.on_link(LinkEvent::Connected, 10_000);
        let due = terminal.due(10_000);
        assert!(!due.contains(Concern::Reconnect));
        assert!(!terminal.due(20_000).contains(Concern::Reconnect));
        assert_eq!(terminal.service(Concern::Reconnect, "--:--"), vec![Effect::Reconnect]);
    }

    #[test]
    fn heartbeat_only_while_connected() {
        let mut terminal = terminal();
        assert!(!terminal.due(30_000).contains(Concern::Heartbeat));

        terminal.on_link(LinkEvent::Connected, 30_000);
        assert!(terminal.due(30_010).contains(Concern::Heartbeat));
        assert!(!terminal.due(40_000).contains(Concern::Heartbeat));
        assert!(terminal.due(60_010).contains(Concern::Heartbeat));

        assert_eq!(
            sends(&terminal.heartbeat()),
            vec![&Outbound::heartbeat("ESP32-ROOM-01")]
        );
    }

    #[test]
    fn transient_message_holds_display() {
        let mut terminal = connected();
        terminal.due(1_000);

        terminal.on_badge(Some("04A1B2C3"), 1_500);
        assert!(!terminal.due(2_600).contains(Concern::Display));
        assert!(terminal.due(3_500).contains(Concern::Display));
    }

    #[test]
    fn service_display_uses_status_layout() {
        let mut terminal = terminal();
        terminal.on_power_sample(62.4);

        let effects = terminal.service(Concern::Display, "--:--");
        let frame = last_frame(&effects).unwrap();

        assert_eq!(frame.line(0), "--:-- OFF62W");
        assert_eq!(frame.line(1), "Scan RFID Card");
    }
}
