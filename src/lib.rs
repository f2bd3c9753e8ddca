//! `beacon-advertiser` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, logging setup
//! and process exit codes. The advertising lifecycle lives in
//! [`crate::controller`], driven by [`crate::app`], where it can be tested
//! deterministically with an injected advertising service.

pub mod advertiser;
pub mod app;
pub mod beacon;
pub mod controller;
pub mod duration;
pub mod identity;
pub mod payload;
pub mod pseudo_id;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export commonly used types at the crate root
pub use advertiser::{
    AdvertiseSettings, AdvertisingService, Backend, ServiceFailure, StartCompletion, StartFailure,
};
pub use beacon::{AdvertisingConfiguration, BeaconRequest, ValidationError};
pub use controller::{AdvertiseError, AdvertisingController, AdvertisingState, StopOutcome};
pub use identity::DeviceIdentity;
pub use payload::{COMPANY_ID, EncodedPayload, ManufacturerData, PAYLOAD_LEN, encode};
pub use pseudo_id::PseudoId;
