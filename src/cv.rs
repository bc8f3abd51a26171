//! Configuration-variable packet payloads and address encoding.
//!
//! Pure payload construction for both programming styles: the direct-mode
//! service instructions sent on the isolated programming track (S-9.2.3)
//! and the operations-mode ("programming on the main") instructions that
//! ride the live layout. The [`ServiceModeProgrammer`] and
//! [`OpsProgrammer`] drive these through a signal generator; everything
//! here is side-effect free and unit-testable.
//!
//! CV numbers are 1-based on the API and 0-based on the wire; the two
//! high bits of the zero-based index ride in the low bits of the opcode
//! byte.
//!
//! [`ServiceModeProgrammer`]: crate::prog::ServiceModeProgrammer
//! [`OpsProgrammer`]: crate::ops::OpsProgrammer

use crate::packet::EncodingError;

/// Highest configuration variable a decoder can expose.
pub const MAX_CV: u16 = 1024;

/// Highest locomotive address encodable in the two-byte long form.
pub const MAX_LOCO_ADDRESS: u16 = 10239;

/// Addresses at or below this use the one-byte short form.
pub const MAX_SHORT_ADDRESS: u16 = 127;

/// Error raised by the CV programming layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CvError {
    /// CV number outside `1..=1024`.
    CvOutOfRange(u16),
    /// Bit index outside `0..=7`.
    BitOutOfRange(u8),
    /// Locomotive address outside `1..=10239`.
    AddressOutOfRange(u16),
    /// The decoder never acknowledged the operation. For reads this means
    /// the final byte-verify failed; for writes, that all attempts were
    /// exhausted.
    VerificationFailed,
    /// A payload failed to frame. Cannot occur for payloads built by this
    /// module; present so callers can use `?` across both layers.
    Encoding(EncodingError),
}

impl core::fmt::Display for CvError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CvError::CvOutOfRange(cv) => write!(f, "CV {} outside 1..=1024", cv),
            CvError::BitOutOfRange(bit) => write!(f, "CV bit {} outside 0..=7", bit),
            CvError::AddressOutOfRange(addr) => {
                write!(f, "locomotive address {} outside 1..=10239", addr)
            }
            CvError::VerificationFailed => write!(f, "decoder did not acknowledge"),
            CvError::Encoding(err) => write!(f, "encoding failed: {}", err),
        }
    }
}

impl From<EncodingError> for CvError {
    fn from(err: EncodingError) -> Self {
        CvError::Encoding(err)
    }
}

/// Splits a 1-based CV number into its wire form: the two high bits of the
/// zero-based index and the low byte.
pub(crate) fn cv_address(cv: u16) -> Result<(u8, u8), CvError> {
    if cv == 0 || cv > MAX_CV {
        return Err(CvError::CvOutOfRange(cv));
    }
    let index = cv - 1;
    Ok((((index >> 8) & 0x03) as u8, (index & 0xFF) as u8))
}

pub(crate) fn check_bit(bit: u8) -> Result<(), CvError> {
    if bit > 7 {
        return Err(CvError::BitOutOfRange(bit));
    }
    Ok(())
}

// ============================================================================
// Service-mode direct instructions (programming track)
// ============================================================================

/// Verify-byte instruction: the decoder ACKs when the CV equals `value`.
pub(crate) fn verify_byte(cv: u16, value: u8) -> Result<[u8; 3], CvError> {
    let (hi, lo) = cv_address(cv)?;
    Ok([0x74 | hi, lo, value])
}

/// Write-byte instruction.
pub(crate) fn write_byte(cv: u16, value: u8) -> Result<[u8; 3], CvError> {
    let (hi, lo) = cv_address(cv)?;
    Ok([0x7C | hi, lo, value])
}

/// Verify-bit instruction in the "bit is one" form used while reading a
/// CV one bit at a time: the decoder only ACKs when the addressed bit
/// reads as one.
pub(crate) fn verify_bit_set(cv: u16, bit: u8) -> Result<[u8; 3], CvError> {
    check_bit(bit)?;
    let (hi, lo) = cv_address(cv)?;
    Ok([0x78 | hi, lo, 0xE8 | bit])
}

/// Write-bit instruction.
pub(crate) fn write_bit(cv: u16, bit: u8, value: bool) -> Result<[u8; 3], CvError> {
    check_bit(bit)?;
    let (hi, lo) = cv_address(cv)?;
    Ok([0x78 | hi, lo, 0xF0 | bit | (u8::from(value) << 3)])
}

/// Confirmation instruction sent after a bit write.
pub(crate) fn confirm_bit(cv: u16, bit: u8, value: bool) -> Result<[u8; 3], CvError> {
    check_bit(bit)?;
    let (hi, lo) = cv_address(cv)?;
    Ok([0x74 | hi, lo, 0xB0 | bit | (u8::from(value) << 3)])
}

// ============================================================================
// Operations-mode instructions (main track)
// ============================================================================

/// Payload buffer for an operations-mode instruction: up to two address
/// bytes plus the three-byte CV instruction.
pub(crate) type OpsPayload = heapless::Vec<u8, 5>;

fn push_address(payload: &mut OpsPayload, loco: u16) -> Result<(), CvError> {
    if loco == 0 || loco > MAX_LOCO_ADDRESS {
        return Err(CvError::AddressOutOfRange(loco));
    }
    if loco > MAX_SHORT_ADDRESS {
        let _ = payload.push(0xC0 | (loco >> 8) as u8);
    }
    let _ = payload.push((loco & 0xFF) as u8);
    Ok(())
}

/// Operations-mode write-byte instruction addressed to `loco`.
pub(crate) fn ops_write_byte(loco: u16, cv: u16, value: u8) -> Result<OpsPayload, CvError> {
    let (hi, lo) = cv_address(cv)?;
    let mut payload = OpsPayload::new();
    push_address(&mut payload, loco)?;
    let _ = payload.push(0xEC | hi);
    let _ = payload.push(lo);
    let _ = payload.push(value);
    Ok(payload)
}

/// Operations-mode write-bit instruction addressed to `loco`.
pub(crate) fn ops_write_bit(
    loco: u16,
    cv: u16,
    bit: u8,
    value: bool,
) -> Result<OpsPayload, CvError> {
    check_bit(bit)?;
    let (hi, lo) = cv_address(cv)?;
    let mut payload = OpsPayload::new();
    push_address(&mut payload, loco)?;
    let _ = payload.push(0xE8 | hi);
    let _ = payload.push(lo);
    let _ = payload.push(0xF0 | bit | (u8::from(value) << 3));
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cv_address_boundaries() {
        assert_eq!(cv_address(1), Ok((0b00, 0x00)));
        assert_eq!(cv_address(256), Ok((0b00, 0xFF)));
        assert_eq!(cv_address(257), Ok((0b01, 0x00)));
        assert_eq!(cv_address(1024), Ok((0b11, 0xFF)));
        assert_eq!(cv_address(0), Err(CvError::CvOutOfRange(0)));
        assert_eq!(cv_address(1025), Err(CvError::CvOutOfRange(1025)));
    }

    #[test]
    fn verify_bit_payload_for_cv29() {
        assert_eq!(verify_bit_set(29, 2), Ok([0x78, 0x1C, 0xEA]));
    }

    #[test]
    fn byte_write_and_verify_payloads_for_cv1() {
        assert_eq!(write_byte(1, 3), Ok([0x7C, 0x00, 0x03]));
        assert_eq!(verify_byte(1, 3), Ok([0x74, 0x00, 0x03]));
    }

    #[test]
    fn bit_write_and_confirm_payloads() {
        assert_eq!(write_bit(29, 5, true), Ok([0x78, 0x1C, 0xFD]));
        assert_eq!(write_bit(29, 5, false), Ok([0x78, 0x1C, 0xF5]));
        assert_eq!(confirm_bit(29, 5, true), Ok([0x74, 0x1C, 0xBD]));
        assert_eq!(confirm_bit(29, 5, false), Ok([0x74, 0x1C, 0xB5]));
    }

    #[test]
    fn bit_index_validated() {
        assert_eq!(verify_bit_set(1, 8), Err(CvError::BitOutOfRange(8)));
        assert_eq!(write_bit(1, 9, true), Err(CvError::BitOutOfRange(9)));
    }

    #[test]
    fn high_cv_bits_ride_in_the_opcode() {
        assert_eq!(write_byte(1024, 0xAA), Ok([0x7F, 0xFF, 0xAA]));
        assert_eq!(verify_byte(769, 0x01), Ok([0x77, 0x00, 0x01]));
    }

    #[test]
    fn short_address_write_byte() {
        let payload = ops_write_byte(3, 8, 8).unwrap();
        assert_eq!(payload.as_slice(), &[0x03, 0xEC, 0x07, 0x08]);
    }

    #[test]
    fn long_address_write_byte() {
        let payload = ops_write_byte(3000, 8, 8).unwrap();
        assert_eq!(payload.as_slice(), &[0xCB, 0xB8, 0xEC, 0x07, 0x08]);
    }

    #[test]
    fn address_form_boundary() {
        assert_eq!(ops_write_byte(127, 1, 0).unwrap().len(), 4);
        let long = ops_write_byte(128, 1, 0).unwrap();
        assert_eq!(long.len(), 5);
        assert_eq!(long[0], 0xC0);
        assert_eq!(long[1], 0x80);
    }

    #[test]
    fn ops_write_bit_payload() {
        let payload = ops_write_bit(3, 29, 2, true).unwrap();
        assert_eq!(payload.as_slice(), &[0x03, 0xE8, 0x1C, 0xFA]);
    }

    #[test]
    fn address_validated() {
        assert_eq!(
            ops_write_byte(0, 1, 0),
            Err(CvError::AddressOutOfRange(0))
        );
        assert_eq!(
            ops_write_byte(10240, 1, 0),
            Err(CvError::AddressOutOfRange(10240))
        );
        assert!(ops_write_byte(10239, 1, 0).is_ok());
    }
}
