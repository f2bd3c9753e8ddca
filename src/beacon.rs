//! Beacon advertising request validation and configuration.

use crate::payload::{self, EncodedPayload, ManufacturerData};
use crate::pseudo_id::PseudoId;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Length of a hyphenated 8-4-4-4-12 UUID string.
const HYPHENATED_UUID_LEN: usize = 36;

/// Input field of an advertising request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Uuid,
    Major,
    Minor,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Uuid => write!(f, "UUID"),
            Field::Major => write!(f, "major"),
            Field::Minor => write!(f, "minor"),
        }
    }
}

/// Malformed or missing request input. Always recoverable by re-submission.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    EmptyField(Field),
    #[error("invalid UUID '{0}': expected 8-4-4-4-12 hexadecimal form")]
    InvalidUuid(String),
    #[error("invalid {field} '{value}': expected a decimal integer in 0..=65535")]
    InvalidNumber { field: Field, value: String },
}

/// A validated advertising request, before the pseudo-MAC is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconRequest {
    pub uuid: Uuid,
    pub major: u16,
    pub minor: u16,
}

impl BeaconRequest {
    /// Parse raw text fields into a request.
    ///
    /// Surrounding whitespace is ignored. Empty fields are reported before
    /// malformed ones, in UUID, major, minor order.
    pub fn parse(uuid: &str, major: &str, minor: &str) -> Result<Self, ValidationError> {
        let (uuid, major, minor) = (uuid.trim(), major.trim(), minor.trim());

        for (field, value) in [(Field::Uuid, uuid), (Field::Major, major), (Field::Minor, minor)] {
            if value.is_empty() {
                return Err(ValidationError::EmptyField(field));
            }
        }

        Ok(Self {
            uuid: parse_uuid(uuid)?,
            major: parse_u16(Field::Major, major)?,
            minor: parse_u16(Field::Minor, minor)?,
        })
    }
}

fn parse_uuid(src: &str) -> Result<Uuid, ValidationError> {
    if src.len() != HYPHENATED_UUID_LEN {
        return Err(ValidationError::InvalidUuid(src.to_string()));
    }
    Uuid::try_parse(src).map_err(|_| ValidationError::InvalidUuid(src.to_string()))
}

fn parse_u16(field: Field, src: &str) -> Result<u16, ValidationError> {
    if !src.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::InvalidNumber {
            field,
            value: src.to_string(),
        });
    }
    src.parse().map_err(|_| ValidationError::InvalidNumber {
        field,
        value: src.to_string(),
    })
}

/// Everything needed to advertise one beacon. Immutable; one per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingConfiguration {
    pub uuid: Uuid,
    pub major: u16,
    pub minor: u16,
    pub pseudo_id: PseudoId,
}

impl AdvertisingConfiguration {
    pub fn new(request: BeaconRequest, pseudo_id: PseudoId) -> Self {
        Self {
            uuid: request.uuid,
            major: request.major,
            minor: request.minor,
            pseudo_id,
        }
    }

    /// The encoded 26-byte payload for this configuration.
    pub fn payload(&self) -> EncodedPayload {
        payload::encode(self.uuid, self.major, self.minor, self.pseudo_id)
    }

    /// The payload tagged with the beacon company identifier.
    pub fn manufacturer_data(&self) -> ManufacturerData {
        ManufacturerData::beacon(&self.payload())
    }
}

impl fmt::Display for AdvertisingConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "uuid={} major={} minor={} mac={}",
            self.uuid.hyphenated().to_string().to_uppercase(),
            self.major,
            self.minor,
            self.pseudo_id
        )
    }
}
