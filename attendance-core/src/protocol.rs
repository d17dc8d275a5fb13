//! JSON messages exchanged with the classroom backend.

use serde::Serialize;
use serde_json::{Map, Value};

/// Kind tag carried by keep-alive messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Heartbeat,
}

/// Message sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    /// A badge was scanned.
    Scan {
        device_id: &'static str,
        rfid_uid: String,
        power: f32,
    },

    /// Periodic or on-connect power sample.
    Power { device_id: &'static str, power: f32 },

    /// Keep-alive.
    Heartbeat {
        device_id: &'static str,
        #[serde(rename = "type")]
        kind: MessageKind,
    },
}

impl Outbound {
    /// Heartbeat for a device.
    pub fn heartbeat(device_id: &'static str) -> Self {
        Outbound::Heartbeat {
            device_id,
            kind: MessageKind::Heartbeat,
        }
    }

    /// Serialize to a JSON text frame.
    ///
    /// # Returns
    /// * `Result<String, ProtocolError>` - The encoded message.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

/// Reply or push received from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// `{"status": "ok"}`.
    Ack,

    /// `{"status": "error", "message": ...}`.
    Rejected { message: Option<String> },

    /// `{"event": "attendance_in", "data": {"teacher": ...}}`.
    AttendanceIn { teacher: String },

    /// `{"event": "attendance_error", "data": {"message": ...}}`.
    AttendanceError { message: Option<String> },

    /// Valid JSON in a shape the terminal does not act on.
    Unrecognized,
}

/// Event name that checks a teacher in.
pub const EVENT_ATTENDANCE_IN: &str = "attendance_in";

/// Event name that reports a failed scan.
pub const EVENT_ATTENDANCE_ERROR: &str = "attendance_error";

/// Classify an inbound text frame.
///
/// `event` takes precedence over `status` when both are present.
///
/// # Arguments
/// * `text` - The frame payload.
///
/// # Returns
/// * `Result<Inbound, ProtocolError>` - The classified message, or
///   [`ProtocolError::Malformed`] if the payload is not JSON.
pub fn parse_inbound(text: &str) -> Result<Inbound, ProtocolError> {
    let value: Value = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;

    let Some(object) = value.as_object() else {
        return Ok(Inbound::Unrecognized);
    };

    if let Some(event) = object.get("event").and_then(Value::as_str) {
        let data = object.get("data").and_then(Value::as_object);

        return Ok(match event {
            EVENT_ATTENDANCE_IN => match data_str(data, "teacher") {
                Some(teacher) => Inbound::AttendanceIn { teacher },
                None => Inbound::Unrecognized,
            },
            EVENT_ATTENDANCE_ERROR => Inbound::AttendanceError {
                message: data_str(data, "message"),
            },
            _ => Inbound::Unrecognized,
        });
    }

    Ok(match object.get("status").and_then(Value::as_str) {
        Some("ok") => Inbound::Ack,
        Some("error") => Inbound::Rejected {
            message: object
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned),
        },
        _ => Inbound::Unrecognized,
    })
}

fn data_str(data: Option<&Map<String, Value>>, key: &str) -> Option<String> {
    data?.get(key)?.as_str().map(str::to_owned)
}

/// Protocol error.
#[derive(Debug)]
pub enum ProtocolError {
    /// Inbound payload is not valid JSON.
    Malformed(serde_json::Error),

    /// Outbound message could not be serialized.
    Encode(serde_json::Error),
}

impl core::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ProtocolError::Malformed(e) => write!(f, "Malformed inbound message: {e}"),
            ProtocolError::Encode(e) => write!(f, "Failed to encode message: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProtocolError::Malformed(e) | ProtocolError::Encode(e) => Some(e),
        }
    }
}

/// Tests.
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encoded(message: &Outbound) -> Value {
        serde_json::from_str(&message.encode().unwrap()).unwrap()
    }

    #[test]
    fn scan_message_shape() {
        let message = Outbound::Scan {
            device_id: "ESP32-ROOM-01",
            rfid_uid: "04A1B2C3".into(),
            power: 437.0,
        };

        assert_eq!(
            encoded(&message),
            json!({"device_id": "ESP32-ROOM-01", "rfid_uid": "04A1B2C3", "power": 437.0})
        );
    }

    #[test]
    fn power_message_shape() {
        let message = Outbound::Power {
            device_id: "ESP32-ROOM-01",
            power: 62.0,
        };

        assert_eq!(
            encoded(&message),
            json!({"device_id": "ESP32-ROOM-01", "power": 62.0})
        );
    }

    #[test]
    fn heartbeat_message_shape() {
        assert_eq!(
            encoded(&Outbound::heartbeat("ESP32-ROOM-01")),
            json!({"device_id": "ESP32-ROOM-01", "type": "heartbeat"})
        );
    }

    #[test]
    fn parses_ack() {
        let parsed = parse_inbound(r#"{"status":"ok","timestamp":"2026-01-11T09:30:00+08:00"}"#);
        assert_eq!(parsed.unwrap(), Inbound::Ack);
    }

    #[test]
    fn parses_rejection() {
        let parsed = parse_inbound(r#"{"status":"error","message":"Invalid JSON"}"#).unwrap();
        assert_eq!(
            parsed,
            Inbound::Rejected {
                message: Some("Invalid JSON".into())
            }
        );
    }

    #[test]
    fn parses_attendance_in() {
        let parsed =
            parse_inbound(r#"{"event":"attendance_in","data":{"teacher":"Ms. Santos","time":"09:30"}}"#)
                .unwrap();

        assert_eq!(
            parsed,
            Inbound::AttendanceIn {
                teacher: "Ms. Santos".into()
            }
        );
    }

    #[test]
    fn attendance_in_without_teacher_is_unrecognized() {
        let parsed = parse_inbound(r#"{"event":"attendance_in","data":{}}"#).unwrap();
        assert_eq!(parsed, Inbound::Unrecognized);
    }

    #[test]
    fn parses_attendance_error_with_and_without_message() {
        let with = parse_inbound(
            r#"{"event":"attendance_error","data":{"message":"Unknown RFID tag","rfid_uid":"DEADBEEF"}}"#,
        )
        .unwrap();
        let without = parse_inbound(r#"{"event":"attendance_error"}"#).unwrap();

        assert_eq!(
            with,
            Inbound::AttendanceError {
                message: Some("Unknown RFID tag".into())
            }
        );
        assert_eq!(without, Inbound::AttendanceError { message: None });
    }

    #[test]
    fn other_shapes_are_unrecognized() {
        for text in [
            r#"{"event":"attendance_duplicate","data":{"teacher":"Ms. Santos"}}"#,
            r#"{"type":"initial_data"}"#,
            r#"{"status":"pending"}"#,
            r#"[1,2,3]"#,
            r#""ok""#,
        ] {
            assert_eq!(parse_inbound(text).unwrap(), Inbound::Unrecognized, "{text}");
        }
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = parse_inbound("{\"status\":").unwrap_err();

        assert!(matches!(err, ProtocolError::Malformed(_)));
        assert!(err.to_string().starts_with("Malformed inbound message"));
    }
}
