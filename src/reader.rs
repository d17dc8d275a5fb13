use crate::error::AppError;
use attendance_core::uid::{cascade_bytes, crc_a, UidBuilder, UidError};
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_svc::hal::spi::{SpiDeviceDriver, SpiDriver};
use esp_idf_svc::sys::EspError;
use std::fmt;

/// MFRC522 registers.
mod reg {
  pub const COMMAND: u8 = 0x01;
  pub const COM_IRQ: u8 = 0x04;
  pub const ERROR: u8 = 0x06;
  pub const STATUS2: u8 = 0x08;
  pub const FIFO_DATA: u8 = 0x09;
  pub const FIFO_LEVEL: u8 = 0x0a;
  pub const CONTROL: u8 = 0x0c;
  pub const BIT_FRAMING: u8 = 0x0d;
  pub const COLL: u8 = 0x0e;
  pub const MODE: u8 = 0x11;
  pub const TX_MODE: u8 = 0x12;
  pub const RX_MODE: u8 = 0x13;
  pub const TX_CONTROL: u8 = 0x14;
  pub const TX_ASK: u8 = 0x15;
  pub const MOD_WIDTH: u8 = 0x24;
  pub const T_MODE: u8 = 0x2a;
  pub const T_PRESCALER: u8 = 0x2b;
  pub const T_RELOAD_H: u8 = 0x2c;
  pub const T_RELOAD_L: u8 = 0x2d;
  pub const VERSION: u8 = 0x37;
}

/// MFRC522 commands.
const PCD_IDLE: u8 = 0x00;
const PCD_TRANSCEIVE: u8 = 0x0c;
const PCD_SOFT_RESET: u8 = 0x0f;

/// PICC commands.
const PICC_REQA: u8 = 0x26;
const PICC_HLTA: u8 = 0x50;
const PICC_SEL_CL: [u8; 3] = [0x93, 0x95, 0x97];

/// Anticollision NVB: two valid bytes (SEL + NVB).
const NVB_ANTICOLL: u8 = 0x20;

/// Select NVB: seven valid bytes.
const NVB_SELECT: u8 = 0x70;

/// Polls of `ComIrqReg` before giving up; the chip timer fires first.
const MAX_IRQ_POLLS: u32 = 2000;

/// Why a card exchange stopped. Only logged; callers see an empty read.
#[derive(Debug)]
enum PiccError {
  /// No answer before the chip timer expired.
  Timeout,

  /// `ErrorReg` reported a buffer, parity or protocol error.
  Protocol(u8),

  /// Answer had the wrong length or a bad check byte.
  Integrity,

  /// Cascade levels did not form a valid UID.
  Uid(UidError),

  /// SPI transfer failed.
  Spi(EspError),
}

impl fmt::Display for PiccError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PiccError::Timeout => write!(f, "no answer"),
      PiccError::Protocol(bits) => write!(f, "error register 0x{:02x}", bits),
      PiccError::Integrity => write!(f, "integrity check failed"),
      PiccError::Uid(e) => write!(f, "invalid UID: {}", e),
      PiccError::Spi(e) => write!(f, "SPI transfer failed: {:?}", e),
    }
  }
}

impl From<EspError> for PiccError {
  fn from(error: EspError) -> Self {
    PiccError::Spi(error)
  }
}

/// MFRC522 contactless reader interface.
pub struct Mfrc522Reader<'a> {
  /// The SPI device.
  spi: SpiDeviceDriver<'a, SpiDriver<'a>>,

  /// The reset (NRSTPD) pin.
  reset: PinDriver<'a, AnyOutputPin, Output>,
}

/// The MFRC522 reader implementation.
impl<'a> Mfrc522Reader<'a> {
  /// Create a new reader.
  ///
  /// # Parameters
  /// - `spi`: The SPI device, chip select included.
  /// - `reset`: The reset pin.
  ///
  /// # Returns
  /// The reader.
  pub fn new(
    spi: SpiDeviceDriver<'a, SpiDriver<'a>>,
    reset: PinDriver<'a, AnyOutputPin, Output>
  ) -> Self {
    Self { spi, reset }
  }

  /// Reset the chip, configure its timer and turn the antenna on.
  ///
  /// # Returns
  /// The result of the operation.
  pub fn init(&mut self) -> Result<(), AppError> {
    self.reset.set_low()?;
    FreeRtos::delay_ms(1);
    self.reset.set_high()?;
    FreeRtos::delay_ms(50);

    self.configure()
      .map_err(|e| AppError::ReaderError(format!("Failed to initialize MFRC522: {}", e)))?;

    let version = self.read_reg(reg::VERSION)
      .map_err(|e| AppError::ReaderError(format!("Failed to read MFRC522 version: {}", e)))?;

    match version {
      0x00 | 0xff => log::warn!("MFRC522 not responding (version 0x{:02x}), check wiring", version),
      _ => log::info!("MFRC522 firmware version 0x{:02x}", version),
    }

    Ok(())
  }

  /// Poll for a new card.
  ///
  /// Runs detect, read serial, halt and stop crypto as one exchange.
  ///
  /// # Returns
  /// The badge identifier, or `None` when no new card was read.
  pub fn poll(&mut self) -> Option<String> {
    if let Err(e) = self.request_a() {
      if !matches!(e, PiccError::Timeout) {
        log::debug!("Card request failed: {}", e);
      }
      return None;
    }

    let uid = match self.read_serial() {
      Ok(uid) => uid,
      Err(e) => {
        log::debug!("Failed to read card serial: {}", e);
        return None;
      }
    };

    if let Err(e) = self.halt() {
      log::debug!("Failed to halt card: {}", e);
    }

    Some(uid)
  }

  fn configure(&mut self) -> Result<(), PiccError> {
    self.write_reg(reg::COMMAND, PCD_SOFT_RESET)?;
    FreeRtos::delay_ms(50);

    self.write_reg(reg::TX_MODE, 0x00)?;
    self.write_reg(reg::RX_MODE, 0x00)?;
    self.write_reg(reg::MOD_WIDTH, 0x26)?;

    // Timer: auto start, 40 kHz tick, 25 ms timeout.
    self.write_reg(reg::T_MODE, 0x80)?;
    self.write_reg(reg::T_PRESCALER, 0xa9)?;
    self.write_reg(reg::T_RELOAD_H, 0x03)?;
    self.write_reg(reg::T_RELOAD_L, 0xe8)?;

    // 100% ASK, CRC preset 0x6363.
    self.write_reg(reg::TX_ASK, 0x40)?;
    self.write_reg(reg::MODE, 0x3d)?;

    self.set_bits(reg::TX_CONTROL, 0x03)
  }

  /// Send REQA and expect a two-byte ATQA.
  fn request_a(&mut self) -> Result<(), PiccError> {
    self.clear_bits(reg::COLL, 0x80)?;

    let mut atqa = [0u8; 2];
    let (len, _) = self.transceive(&[PICC_REQA], 7, &mut atqa)?;

    if len != 2 {
      return Err(PiccError::Integrity);
    }

    Ok(())
  }

  /// Run the anticollision/select cascade and format the UID.
  fn read_serial(&mut self) -> Result<String, PiccError> {
    let mut builder = UidBuilder::new();

    for sel in PICC_SEL_CL {
      let mut response = [0u8; 5];
      let (len, _) = self.transceive(&[sel, NVB_ANTICOLL], 0, &mut response)?;
      let bytes = cascade_bytes(&response[..len]).ok_or(PiccError::Integrity)?;

      let mut frame = [0u8; 9];
      frame[0] = sel;
      frame[1] = NVB_SELECT;
      frame[2..7].copy_from_slice(&response);
      let crc = crc_a(&frame[..7]);
      frame[7..9].copy_from_slice(&crc);

      let mut sak = [0u8; 3];
      let (len, _) = self.transceive(&frame, 0, &mut sak)?;
      if len != 3 || crc_a(&sak[..1]) != [sak[1], sak[2]] {
        return Err(PiccError::Integrity);
      }

      if let Some(uid) = builder.push(sak[0], bytes).map_err(PiccError::Uid)? {
        return Ok(uid);
      }
    }

    Err(PiccError::Integrity)
  }

  /// Send HLTA and stop crypto. A halted card does not answer.
  fn halt(&mut self) -> Result<(), PiccError> {
    let mut frame = [PICC_HLTA, 0x00, 0x00, 0x00];
    let crc = crc_a(&frame[..2]);
    frame[2..].copy_from_slice(&crc);

    let result = match self.transceive(&frame, 0, &mut []) {
      Err(PiccError::Timeout) => Ok(()),
      Ok(_) => Err(PiccError::Integrity),
      Err(e) => Err(e),
    };

    self.clear_bits(reg::STATUS2, 0x08)?;

    result
  }

  /// Exchange a frame with the card.
  ///
  /// # Parameters
  /// - `data`: Bytes to send.
  /// - `tx_last_bits`: Valid bits in the last byte (0 means all eight).
  /// - `back`: Buffer for the answer.
  ///
  /// # Returns
  /// Received byte count and valid bits in the last byte.
  fn transceive(&mut self, data: &[u8], tx_last_bits: u8, back: &mut [u8]) -> Result<(usize, u8), PiccError> {
    self.write_reg(reg::COMMAND, PCD_IDLE)?;
    self.write_reg(reg::COM_IRQ, 0x7f)?;
    self.write_reg(reg::FIFO_LEVEL, 0x80)?;

    for &byte in data {
      self.write_reg(reg::FIFO_DATA, byte)?;
    }

    self.write_reg(reg::BIT_FRAMING, tx_last_bits)?;
    self.write_reg(reg::COMMAND, PCD_TRANSCEIVE)?;
    self.set_bits(reg::BIT_FRAMING, 0x80)?;

    let mut done = false;
    for _ in 0..MAX_IRQ_POLLS {
      let irq = self.read_reg(reg::COM_IRQ)?;

      // RxIRq or IdleIRq
      if irq & 0x30 != 0 {
        done = true;
        break;
      }

      // TimerIRq
      if irq & 0x01 != 0 {
        break;
      }
    }

    self.clear_bits(reg::BIT_FRAMING, 0x80)?;

    if !done {
      return Err(PiccError::Timeout);
    }

    // BufferOvfl, ParityErr, ProtocolErr
    let error = self.read_reg(reg::ERROR)?;
    if error & 0x13 != 0 {
      return Err(PiccError::Protocol(error));
    }

    let level = self.read_reg(reg::FIFO_LEVEL)? as usize;
    if level > back.len() {
      return Err(PiccError::Integrity);
    }

    for slot in back.iter_mut().take(level) {
      *slot = self.read_reg(reg::FIFO_DATA)?;
    }

    let rx_last_bits = self.read_reg(reg::CONTROL)? & 0x07;

    Ok((level, rx_last_bits))
  }

  fn read_reg(&mut self, register: u8) -> Result<u8, PiccError> {
    let write = [0x80 | (register << 1), 0x00];
    let mut read = [0u8; 2];
    self.spi.transfer(&mut read, &write)?;

    Ok(read[1])
  }

  fn write_reg(&mut self, register: u8, value: u8) -> Result<(), PiccError> {
    self.spi.write(&[(register << 1) & 0x7e, value])?;

    Ok(())
  }

  fn set_bits(&mut self, register: u8, mask: u8) -> Result<(), PiccError> {
    let value = self.read_reg(register)?;
    self.write_reg(register, value | mask)
  }

  fn clear_bits(&mut self, register: u8, mask: u8) -> Result<(), PiccError> {
    let value = self.read_reg(register)?;
    self.write_reg(register, value & !mask)
  }
}
