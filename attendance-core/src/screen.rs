//! Two-line character screen layouts and the HD44780/PCF8574 byte encoding.

use core::fmt::Write;
use heapless::String;

/// Characters per line.
pub const COLUMNS: usize = 16;

/// Lines on the screen.
pub const ROWS: usize = 2;

/// Prompt shown on line 2 while no teacher is checked in.
pub const IDLE_PROMPT: &str = "Scan RFID Card";

/// One screen line, at most [`COLUMNS`] ASCII characters.
pub type Line = String<COLUMNS>;

/// A full screen of text, ready to be written row by row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    lines: [Line; ROWS],
}

impl Frame {
    /// Both lines centered.
    ///
    /// # Arguments
    /// * `top` - Line 1 text.
    /// * `bottom` - Line 2 text.
    ///
    /// # Returns
    /// * `Frame` - Lines padded left by `(16 - len) / 2` and truncated.
    pub fn centered(top: &str, bottom: &str) -> Self {
        Self {
            lines: [center(top), center(bottom)],
        }
    }

    /// Left-aligned status layout.
    ///
    /// Line 1 is `HH:MM ON 437W` or `HH:MM OFF437W`; line 2 is the teacher
    /// name or [`IDLE_PROMPT`].
    pub fn status(clock: &str, connected: bool, power_w: f32, teacher: Option<&str>) -> Self {
        let mut top = std::string::String::with_capacity(COLUMNS);
        let _ = write!(
            top,
            "{clock}{}{:.0}W",
            if connected { " ON " } else { " OFF" },
            power_w.round()
        );

        let bottom = match teacher {
            Some(name) if !name.is_empty() => name,
            _ => IDLE_PROMPT,
        };

        Self {
            lines: [fit(&top), fit(bottom)],
        }
    }

    /// Text of a row; rows past the screen are empty.
    pub fn line(&self, row: usize) -> &str {
        self.lines.get(row).map(Line::as_str).unwrap_or("")
    }

    /// All rows in order.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(Line::as_str)
    }
}

/// Truncate to the column width. Characters the LCD ROM cannot show become `?`.
fn fit(text: &str) -> Line {
    let mut line = Line::new();

    for c in text.chars().take(COLUMNS) {
        let c = if c.is_ascii() && !c.is_ascii_control() { c } else { '?' };
        if line.push(c).is_err() {
            break;
        }
    }

    line
}

fn center(text: &str) -> Line {
    if text.is_empty() {
        return Line::new();
    }

    let len = text.chars().count();
    let pad = COLUMNS.saturating_sub(len) / 2;

    let mut padded = std::string::String::with_capacity(COLUMNS);
    padded.extend(core::iter::repeat(' ').take(pad));
    padded.push_str(text);

    fit(&padded)
}

/// PCF8574 pin carrying the HD44780 register select line.
pub const PIN_RS: u8 = 0x01;

/// PCF8574 pin carrying the HD44780 enable strobe.
pub const PIN_EN: u8 = 0x04;

/// PCF8574 pin driving the backlight transistor.
pub const PIN_BACKLIGHT: u8 = 0x08;

/// HD44780 instructions used by the driver.
pub mod cmd {
    pub const CLEAR: u8 = 0x01;
    pub const ENTRY_MODE_INCREMENT: u8 = 0x06;
    pub const DISPLAY_ON: u8 = 0x0c;
    pub const FUNCTION_4BIT_2LINE: u8 = 0x28;
    pub const SET_DDRAM: u8 = 0x80;
}

/// Register a byte is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Instruction,
    Data,
}

/// Expander writes that clock one nibble (upper four bits of `nibble`).
pub fn nibble_frames(nibble: u8, register: Register, backlight: bool) -> [u8; 2] {
    let mut bits = nibble & 0xf0;

    if register == Register::Data {
        bits |= PIN_RS;
    }

    if backlight {
        bits |= PIN_BACKLIGHT;
    }

    [bits | PIN_EN, bits]
}

/// Expander writes that clock a full byte in 4-bit mode, high nibble first.
pub fn byte_frames(value: u8, register: Register, backlight: bool) -> [u8; 4] {
    let [a, b] = nibble_frames(value & 0xf0, register, backlight);
    let [c, d] = nibble_frames(value << 4, register, backlight);

    [a, b, c, d]
}

/// DDRAM address instruction for a cursor position.
pub fn cursor_command(row: usize, col: usize) -> u8 {
    const ROW_OFFSETS: [u8; ROWS] = [0x00, 0x40];

    let row = row.min(ROWS - 1);
    let col = col.min(COLUMNS - 1) as u8;

    cmd::SET_DDRAM | (ROW_OFFSETS[row] + col)
}

/// Tests.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_pads_left() {
        let frame = Frame::centered("Card Sent!", "04A1B2C3");

        assert_eq!(frame.line(0), "   Card Sent!");
        assert_eq!(frame.line(1), "    04A1B2C3");
    }

    #[test]
    fn centered_truncates_overlong_text() {
        let frame = Frame::centered("Professor Maria Dela Cruz", "");

        assert_eq!(frame.line(0), "Professor Maria ");
        assert_eq!(frame.line(1), "");
    }

    #[test]
    fn status_layout_connected() {
        let frame = Frame::status("14:05", true, 437.2, Some("Ms. Santos"));

        assert_eq!(frame.line(0), "14:05 ON 437W");
        assert_eq!(frame.line(1), "Ms. Santos");
    }

    #[test]
    fn status_layout_offline_and_idle() {
        let frame = Frame::status("--:--", false, 62.0, None);

        assert_eq!(frame.line(0), "--:-- OFF62W");
        assert_eq!(frame.line(1), IDLE_PROMPT);
    }

    #[test]
    fn status_power_rounds_half_away_from_zero() {
        assert_eq!(Frame::status("--:--", false, 62.5, None).line(0), "--:-- OFF63W");
        assert_eq!(Frame::status("--:--", false, 63.5, None).line(0), "--:-- OFF64W");
        assert_eq!(Frame::status("--:--", true, 62.4, None).line(0), "--:-- ON 62W");
    }

    #[test]
    fn status_truncates_long_teacher_name() {
        let frame = Frame::status("09:00", true, 0.0, Some("Dr. Bartholomew Reyes-Villanueva"));

        assert_eq!(frame.line(1), "Dr. Bartholomew ");
        assert_eq!(frame.line(1).len(), COLUMNS);
    }

    #[test]
    fn non_ascii_is_replaced() {
        let frame = Frame::status("09:00", true, 0.0, Some("Peña"));

        assert_eq!(frame.line(1), "Pe?a");
    }

    #[test]
    fn byte_frames_strobe_enable() {
        // 'A' = 0x41 as data with backlight.
        assert_eq!(
            byte_frames(0x41, Register::Data, true),
            [0x4d, 0x49, 0x1d, 0x19]
        );
    }

    #[test]
    fn instruction_frames_without_backlight() {
        assert_eq!(
            byte_frames(cmd::CLEAR, Register::Instruction, false),
            [0x04, 0x00, 0x14, 0x10]
        );
    }

    #[test]
    fn cursor_addresses() {
        assert_eq!(cursor_command(0, 0), 0x80);
        assert_eq!(cursor_command(1, 3), 0xc3);
        assert_eq!(cursor_command(5, 40), 0xcf);
    }
}
