//! Beacon manufacturer-data encoding.
//!
//! Layout of the 26-byte payload, big-endian throughout:
//!
//! | Offset | Length | Field                                   |
//! |--------|--------|-----------------------------------------|
//! | 0      | 16     | UUID (high 64 bits, then low 64 bits)   |
//! | 16     | 2      | major                                   |
//! | 18     | 2      | minor                                   |
//! | 20     | 6      | pseudo-MAC, verbatim                    |

use crate::pseudo_id::{PSEUDO_ID_LEN, PseudoId};
use uuid::Uuid;

/// Length of an encoded beacon payload.
pub const PAYLOAD_LEN: usize = 16 + 2 + 2 + PSEUDO_ID_LEN;

/// Company identifier the payload is tagged with (Apple, for receiver compatibility).
pub const COMPANY_ID: u16 = 0x004C;

/// Manufacturer-specific data AD type.
pub const AD_TYPE_MANUFACTURER_DATA: u8 = 0xFF;

/// Maximum size of a legacy advertising data block.
pub const MAX_ADV_DATA_LEN: usize = 31;

/// An encoded beacon payload.
pub type EncodedPayload = [u8; PAYLOAD_LEN];

/// Encode a beacon payload.
///
/// The result is always exactly [`PAYLOAD_LEN`] bytes; range validation of
/// `major`/`minor` happens before this point (see [`crate::beacon`]).
pub fn encode(uuid: Uuid, major: u16, minor: u16, pseudo_id: PseudoId) -> EncodedPayload {
    let (high, low) = uuid.as_u64_pair();

    let mut buf = [0u8; PAYLOAD_LEN];
    buf[0..8].copy_from_slice(&high.to_be_bytes());
    buf[8..16].copy_from_slice(&low.to_be_bytes());
    buf[16..18].copy_from_slice(&major.to_be_bytes());
    buf[18..20].copy_from_slice(&minor.to_be_bytes());
    buf[20..26].copy_from_slice(pseudo_id.as_bytes());
    buf
}

/// Manufacturer-specific data handed to an advertising backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManufacturerData {
    pub company_id: u16,
    pub data: Vec<u8>,
}

impl ManufacturerData {
    /// Tag an encoded payload with [`COMPANY_ID`].
    pub fn beacon(payload: &EncodedPayload) -> Self {
        Self {
            company_id: COMPANY_ID,
            data: payload.to_vec(),
        }
    }

    /// Serialize as a single AD structure: `[len][0xFF][company id LE][data...]`.
    ///
    /// Returns `None` when the structure would not fit in a legacy
    /// advertising packet.
    pub fn to_ad_structure(&self) -> Option<Vec<u8>> {
        // type + company id + data
        let len = 1 + 2 + self.data.len();
        if 1 + len > MAX_ADV_DATA_LEN {
            return None;
        }

        let mut ad = Vec::with_capacity(1 + len);
        ad.push(len as u8);
        ad.push(AD_TYPE_MANUFACTURER_DATA);
        ad.extend_from_slice(&self.company_id.to_le_bytes());
        ad.extend_from_slice(&self.data);
        Some(ad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TEST_PSEUDO_ID, TEST_UUID};

    #[test]
    fn test_encode_reference_beacon() {
        let uuid = Uuid::parse_str(TEST_UUID).unwrap();
        let payload = encode(uuid, 100, 200, TEST_PSEUDO_ID);

        assert_eq!(payload.len(), 26);
        assert_eq!(
            &payload[..16],
            &[
                0x2D, 0x7A, 0x9F, 0x0C, 0xE0, 0xE8, 0x4C, 0xC9, 0xA7, 0x1B, 0xA2, 0x1D, 0xB2, 0xD0,
                0x34, 0xA1
            ]
        );
        assert_eq!(&payload[16..18], &[0x00, 0x64]);
        assert_eq!(&payload[18..20], &[0x00, 0xC8]);
        assert_eq!(&payload[20..26], &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
    }

    #[test]
    fn test_encode_uuid_halves_are_big_endian() {
        let uuid = Uuid::from_u64_pair(0x0102_0304_0506_0708, 0x090A_0B0C_0D0E_0F10);
        let payload = encode(uuid, 0, 0, PseudoId::default());

        let high = u64::from_be_bytes(payload[0..8].try_into().unwrap());
        let low = u64::from_be_bytes(payload[8..16].try_into().unwrap());
        assert_eq!(Uuid::from_u64_pair(high, low), uuid);
    }

    #[test]
    fn test_encode_extreme_values() {
        let payload = encode(Uuid::from_u128(u128::MAX), u16::MAX, 0, PseudoId::default());
        assert_eq!(&payload[..16], &[0xFF; 16]);
        assert_eq!(&payload[16..18], &[0xFF, 0xFF]);
        assert_eq!(&payload[18..20], &[0x00, 0x00]);
        assert_eq!(&payload[20..], &[0x00; 6]);
    }

    #[test]
    fn test_beacon_ad_structure_fits() {
        let uuid = Uuid::parse_str(TEST_UUID).unwrap();
        let data = ManufacturerData::beacon(&encode(uuid, 1, 2, TEST_PSEUDO_ID));
        let ad = data.to_ad_structure().unwrap();

        assert_eq!(ad.len(), 30);
        assert_eq!(ad[0], 29);
        assert_eq!(ad[1], AD_TYPE_MANUFACTURER_DATA);
        assert_eq!(&ad[2..4], &[0x4C, 0x00]);
        assert_eq!(&ad[4..], &data.data[..]);
    }

    #[test]
    fn test_oversized_ad_structure_rejected() {
        let data = ManufacturerData {
            company_id: COMPANY_ID,
            data: vec![0; 28],
        };
        assert!(data.to_ad_structure().is_none());

        let data = ManufacturerData {
            company_id: COMPANY_ID,
            data: vec![0; 27],
        };
        assert_eq!(data.to_ad_structure().map(|ad| ad.len()), Some(31));
    }
}
