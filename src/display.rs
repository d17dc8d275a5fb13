use crate::error::AppError;
use attendance_core::screen::{byte_frames, cmd, cursor_command, nibble_frames, Frame, Register, COLUMNS, PIN_BACKLIGHT};
use esp_idf_svc::hal::delay::{Ets, FreeRtos};
use esp_idf_svc::hal::i2c::I2cDriver;

/// PCF8574 backpack I2C address (0x3f on some boards).
pub const LCD_ADDRESS: u8 = 0x27;

/// I2C timeout in ticks.
const I2C_TIMEOUT: u32 = 100;

/// 16x2 HD44780 character LCD behind a PCF8574 I2C expander.
pub struct Lcd1602<'a> {
  /// The I2C driver.
  i2c: I2cDriver<'a>,

  /// Backlight state, carried on every expander write.
  backlight: bool,
}

/// The LCD implementation.
impl<'a> Lcd1602<'a> {
  /// Create a new LCD.
  ///
  /// # Parameters
  /// - `i2c`: The I2C driver.
  ///
  /// # Returns
  /// The LCD.
  pub fn new(i2c: I2cDriver<'a>) -> Self {
    Self { i2c, backlight: true }
  }

  /// Initialize the controller in 4-bit, two-line mode with the backlight on.
  ///
  /// # Returns
  /// The result of the operation.
  pub fn init(&mut self) -> Result<(), AppError> {
    // Wait for the controller's own power-on reset.
    FreeRtos::delay_ms(50);
    self.write_expander(&[PIN_BACKLIGHT])?;
    FreeRtos::delay_ms(100);

    // Reset by instruction: three times 8-bit mode, then switch to 4-bit.
    for delay_us in [4500, 4500, 150] {
      self.write_expander(&nibble_frames(0x30, Register::Instruction, self.backlight))?;
      Ets::delay_us(delay_us);
    }
    self.write_expander(&nibble_frames(0x20, Register::Instruction, self.backlight))?;
    Ets::delay_us(150);

    self.command(cmd::FUNCTION_4BIT_2LINE)?;
    self.command(cmd::DISPLAY_ON)?;
    self.clear()?;
    self.command(cmd::ENTRY_MODE_INCREMENT)?;

    log::info!("LCD initialized");

    Ok(())
  }

  /// Clear the display.
  ///
  /// # Returns
  /// The result of the operation.
  pub fn clear(&mut self) -> Result<(), AppError> {
    self.command(cmd::CLEAR)?;
    FreeRtos::delay_ms(2);

    Ok(())
  }

  /// Show a frame.
  ///
  /// Every row is written in full, padded with spaces, so no clear is needed
  /// between frames.
  ///
  /// # Parameters
  /// - `frame`: The frame to show.
  ///
  /// # Returns
  /// The result of the operation.
  pub fn show(&mut self, frame: &Frame) -> Result<(), AppError> {
    for (row, text) in frame.lines().enumerate() {
      self.command(cursor_command(row, 0))?;

      let padding = COLUMNS.saturating_sub(text.len());
      for byte in text.bytes().chain(std::iter::repeat(b' ').take(padding)) {
        self.write_byte(byte, Register::Data)?;
      }
    }

    Ok(())
  }

  /// Show two centered lines.
  pub fn message(&mut self, top: &str, bottom: &str) -> Result<(), AppError> {
    self.show(&Frame::centered(top, bottom))
  }

  fn command(&mut self, value: u8) -> Result<(), AppError> {
    self.write_byte(value, Register::Instruction)?;
    Ets::delay_us(50);

    Ok(())
  }

  fn write_byte(&mut self, value: u8, register: Register) -> Result<(), AppError> {
    let frames = byte_frames(value, register, self.backlight);
    self.write_expander(&frames)
  }

  /// Write raw expander states.
  ///
  /// # Parameters
  /// - `bytes`: Output port values, latched in order.
  ///
  /// # Returns
  /// The result of the operation.
  fn write_expander(&mut self, bytes: &[u8]) -> Result<(), AppError> {
    self.i2c.write(LCD_ADDRESS, bytes, I2C_TIMEOUT)
      .map_err(|e| AppError::DisplayError(format!(
        "Failed to write {} byte(s) to LCD at address 0x{:02x}: {:?}",
        bytes.len(), LCD_ADDRESS, e
      )))
  }
}
