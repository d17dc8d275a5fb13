//! Badge UID assembly and formatting for ISO/IEC 14443-3 type A cards.

use core::fmt::{self, Write};
use heapless::Vec;

/// Longest UID a PICC can report (triple size).
pub const MAX_UID_LEN: usize = 10;

/// Format badge UID bytes as uppercase hex, two characters per byte.
///
/// # Arguments
/// * `bytes` - The UID bytes as read from the card; anything past
///   [`MAX_UID_LEN`] is ignored.
///
/// # Returns
/// * `String` - The identifier, e.g. `04A1B2C3`.
pub fn format_uid(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().min(MAX_UID_LEN) * 2);

    for byte in bytes.iter().take(MAX_UID_LEN) {
        let _ = write!(out, "{byte:02X}");
    }

    out
}

/// First byte of a cascade level response when the UID continues on the next level.
pub const CASCADE_TAG: u8 = 0x88;

/// Block check character of a cascade level: XOR of the UID bytes.
pub fn bcc(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, byte| acc ^ byte)
}

/// ISO/IEC 14443-3 type A CRC, low byte first.
pub fn crc_a(data: &[u8]) -> [u8; 2] {
    let mut crc: u16 = 0x6363;

    for &byte in data {
        let mut b = byte ^ (crc & 0xff) as u8;
        b ^= b << 4;
        crc = (crc >> 8) ^ ((b as u16) << 8) ^ ((b as u16) << 3) ^ ((b as u16) >> 4);
    }

    crc.to_le_bytes()
}

/// Validate an anticollision response: four UID bytes followed by their BCC.
///
/// # Arguments
/// * `response` - The bytes received for one cascade level.
///
/// # Returns
/// * `Option<[u8; 4]>` - The four bytes, or `None` on a length or BCC mismatch.
pub fn cascade_bytes(response: &[u8]) -> Option<[u8; 4]> {
    let &[a, b, c, d, check] = response else {
        return None;
    };

    (bcc(&[a, b, c, d]) == check).then_some([a, b, c, d])
}

/// SAK bit set while the UID continues on the next cascade level.
pub const SAK_CASCADE: u8 = 0x04;

/// Why a cascade level could not be added to a UID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UidError {
    /// The SAK announced another level but the bytes did not start with [`CASCADE_TAG`].
    MissingCascadeTag,

    /// The levels add up to more than [`MAX_UID_LEN`] bytes.
    TooLong,
}

impl fmt::Display for UidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UidError::MissingCascadeTag => write!(f, "cascade level without cascade tag"),
            UidError::TooLong => write!(f, "UID longer than {} bytes", MAX_UID_LEN),
        }
    }
}

impl std::error::Error for UidError {}

/// Accumulates the UID bytes of successive cascade levels.
#[derive(Debug, Clone, Default)]
pub struct UidBuilder {
    bytes: Vec<u8, MAX_UID_LEN>,
}

impl UidBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the result of one select round.
    ///
    /// # Arguments
    /// * `sak` - The select acknowledge byte.
    /// * `level` - The four bytes of this cascade level, BCC already checked.
    ///
    /// # Returns
    /// * `Result<Option<String>, UidError>` - The formatted UID once the SAK
    ///   reports it complete, `None` while more levels follow.
    pub fn push(&mut self, sak: u8, level: [u8; 4]) -> Result<Option<String>, UidError> {
        let cascades = sak & SAK_CASCADE != 0;

        let part: &[u8] = if !cascades {
            &level
        } else if level[0] == CASCADE_TAG {
            &level[1..]
        } else {
            return Err(UidError::MissingCascadeTag);
        };

        self.bytes
            .extend_from_slice(part)
            .map_err(|_| UidError::TooLong)?;

        Ok((!cascades).then(|| format_uid(&self.bytes)))
    }
}
