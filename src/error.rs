use esp_idf_svc::sys::EspError;
use std::fmt;

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// Display error.
    DisplayError(String),

    /// WebSocket session error.
    NetworkError(String),

    /// Peripherals error.
    PeripheralsError(String),

    /// RFID reader error.
    ReaderError(String),

    /// Time synchronization error.
    TimeError(String),

    /// Wi-Fi error.
    WifiError(String),
}

/// Implement the conversion from `EspError` to `AppError`.
impl From<EspError> for AppError {
    /// Convert an `EspError` to an `AppError`.
    ///
    /// # Parameters
    /// - `error`: The ESP-IDF error.
    ///
    /// # Returns
    /// The application error.
    fn from(error: EspError) -> Self {
        AppError::PeripheralsError(format!("ESP-IDF error: {:?}", error))
    }
}

/// Implement the `Display` trait for `AppError`.
impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DisplayError(msg) => write!(f, "Display error: {}", msg),
            AppError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            AppError::PeripheralsError(msg) => write!(f, "Peripherals error: {}", msg),
            AppError::ReaderError(msg) => write!(f, "RFID reader error: {}", msg),
            AppError::TimeError(msg) => write!(f, "Time error: {}", msg),
            AppError::WifiError(msg) => write!(f, "Wi-Fi error: {}", msg),
        }
    }
}

/// Implement the `Error` trait for `AppError`.
impl std::error::Error for AppError {}
