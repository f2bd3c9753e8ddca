//! BLE advertising service abstraction.
//!
//! An [`AdvertisingService`] accepts a start or stop request and reports its
//! outcome later through a one-shot completion channel. Backends wrap the
//! BlueZ daemon ([`bluer`]) or a raw HCI socket ([`hci`]).

#[cfg(feature = "bluer")]
pub mod bluer;

#[cfg(feature = "hci")]
pub mod hci;

use crate::payload::ManufacturerData;
use std::fmt;
use thiserror::Error;
use tokio::sync::oneshot;

/// Why the radio refused to start advertising.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartFailure {
    #[error("data too large")]
    DataTooLarge,
    #[error("too many advertisers")]
    TooManyAdvertisers,
    #[error("already started")]
    AlreadyStarted,
    #[error("internal error")]
    InternalError,
    #[error("feature unsupported")]
    FeatureUnsupported,
    #[error("unknown error: {0}")]
    Unknown(i32),
}

impl StartFailure {
    /// Map a numeric advertise failure code (1..=5) to a reason.
    ///
    /// Unrecognized codes are carried through as [`StartFailure::Unknown`].
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => StartFailure::DataTooLarge,
            2 => StartFailure::TooManyAdvertisers,
            3 => StartFailure::AlreadyStarted,
            4 => StartFailure::InternalError,
            5 => StartFailure::FeatureUnsupported,
            other => StartFailure::Unknown(other),
        }
    }
}

/// A failed start as reported by the service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceFailure {
    #[error("Bluetooth permission denied: {0}")]
    PermissionDenied(String),
    #[error("advertising failed: {0}")]
    Start(#[from] StartFailure),
}

/// Completion of a start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartCompletion {
    Success,
    Failure(ServiceFailure),
}

/// Advertising interval policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiseMode {
    LowPower,
    Balanced,
    LowLatency,
}

impl AdvertiseMode {
    /// Advertising interval in milliseconds.
    pub fn interval_ms(self) -> u64 {
        match self {
            AdvertiseMode::LowPower => 1000,
            AdvertiseMode::Balanced => 250,
            AdvertiseMode::LowLatency => 100,
        }
    }
}

/// Transmit power level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPowerLevel {
    UltraLow,
    Low,
    Medium,
    High,
}

impl TxPowerLevel {
    pub fn dbm(self) -> i16 {
        match self {
            TxPowerLevel::UltraLow => -21,
            TxPowerLevel::Low => -15,
            TxPowerLevel::Medium => -7,
            TxPowerLevel::High => 1,
        }
    }
}

/// Settings passed with every start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertiseSettings {
    pub mode: AdvertiseMode,
    pub tx_power: TxPowerLevel,
    pub connectable: bool,
    pub include_device_name: bool,
    pub include_tx_power_level: bool,
}

impl AdvertiseSettings {
    /// Fast, full-power, non-connectable broadcast with no extra fields.
    pub const BEACON: AdvertiseSettings = AdvertiseSettings {
        mode: AdvertiseMode::LowLatency,
        tx_power: TxPowerLevel::High,
        connectable: false,
        include_device_name: false,
        include_tx_power_level: false,
    };
}

impl Default for AdvertiseSettings {
    fn default() -> Self {
        Self::BEACON
    }
}

/// An asynchronous BLE advertiser.
///
/// Both calls return immediately; the outcome arrives on the returned
/// receiver. A service may never complete, and callers do not time out.
pub trait AdvertisingService: Send + Sync {
    fn start(
        &self,
        settings: AdvertiseSettings,
        data: ManufacturerData,
    ) -> oneshot::Receiver<StartCompletion>;

    fn stop(&self) -> oneshot::Receiver<()>;
}

impl<T: AdvertisingService + ?Sized> AdvertisingService for Box<T> {
    fn start(
        &self,
        settings: AdvertiseSettings,
        data: ManufacturerData,
    ) -> oneshot::Receiver<StartCompletion> {
        (**self).start(settings, data)
    }

    fn stop(&self) -> oneshot::Receiver<()> {
        (**self).stop()
    }
}

/// Available advertising backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// BlueZ D-Bus backend (requires bluetoothd daemon)
    #[cfg(feature = "bluer")]
    Bluer,
    /// Raw HCI socket backend (direct kernel access, no daemon required)
    #[cfg(feature = "hci")]
    Hci,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Bluer;
        #[cfg(all(feature = "hci", not(feature = "bluer")))]
        return Backend::Hci;
        #[cfg(not(any(feature = "bluer", feature = "hci")))]
        compile_error!("At least one backend feature must be enabled");
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Bluer => write!(f, "bluer"),
            #[cfg(feature = "hci")]
            Backend::Hci => write!(f, "hci"),
            #[cfg(not(any(feature = "bluer", feature = "hci")))]
            _ => unreachable!("Backend enum has no variants when no backend features are enabled"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            #[cfg(feature = "bluer")]
            "bluer" | "bluez" => Ok(Backend::Bluer),
            #[cfg(feature = "hci")]
            "hci" | "raw" => Ok(Backend::Hci),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// Create the advertising service for `backend`.
pub fn service_for(backend: Backend) -> Box<dyn AdvertisingService> {
    match backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => Box::new(bluer::BluerAdvertiser::new()),
        #[cfg(feature = "hci")]
        Backend::Hci => Box::new(hci::HciAdvertiser::new(hci::DEFAULT_DEVICE)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_start_failure_from_code() {
        assert_eq!(StartFailure::from_code(1), StartFailure::DataTooLarge);
        assert_eq!(StartFailure::from_code(2), StartFailure::TooManyAdvertisers);
        assert_eq!(StartFailure::from_code(3), StartFailure::AlreadyStarted);
        assert_eq!(StartFailure::from_code(4), StartFailure::InternalError);
        assert_eq!(StartFailure::from_code(5), StartFailure::FeatureUnsupported);
        assert_eq!(StartFailure::from_code(42), StartFailure::Unknown(42));
        assert_eq!(StartFailure::from_code(0), StartFailure::Unknown(0));
    }

    #[test]
    fn test_failure_display() {
        let err = ServiceFailure::from(StartFailure::AlreadyStarted);
        assert_eq!(err.to_string(), "advertising failed: already started");

        let err = ServiceFailure::Start(StartFailure::Unknown(18));
        assert_eq!(err.to_string(), "advertising failed: unknown error: 18");

        let err = ServiceFailure::PermissionDenied("Operation not permitted".into());
        assert_eq!(
            err.to_string(),
            "Bluetooth permission denied: Operation not permitted"
        );
    }

    #[test]
    fn test_beacon_settings() {
        let settings = AdvertiseSettings::default();
        assert_eq!(settings.mode, AdvertiseMode::LowLatency);
        assert_eq!(settings.tx_power, TxPowerLevel::High);
        assert!(!settings.connectable);
        assert!(!settings.include_device_name);
        assert!(!settings.include_tx_power_level);
        assert_eq!(settings.mode.interval_ms(), 100);
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!(Backend::from_str("bluer").unwrap(), Backend::Bluer);
        assert_eq!(Backend::from_str("bluez").unwrap(), Backend::Bluer);
        assert_eq!(Backend::from_str("hci").unwrap(), Backend::Hci);
        assert_eq!(Backend::from_str("RAW").unwrap(), Backend::Hci);
        assert!(Backend::from_str("invalid").is_err());
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(format!("{}", Backend::Bluer), "bluer");
        assert_eq!(format!("{}", Backend::Hci), "hci");
    }
}
