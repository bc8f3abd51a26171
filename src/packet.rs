//! DCC packet bit buffer and frame encoder.
//!
//! A [`Packet`] holds one fully framed DCC packet as a packed bit buffer,
//! ready for the bitstream engine to shift out MSB-first, together with its
//! transmission cursor and repeat budget.
//!
//! # Frame layout
//!
//! The encoder appends an XOR checksum to the payload and packs the frame
//! as:
//!
//! - 22 preamble `1` bits
//! - a `0` packet-start bit
//! - each frame byte MSB-first, bytes separated by a `0` bit
//!
//! The mandatory packet-end `1` bit is not stored: it is supplied on the
//! wire by the preamble of whatever packet follows (the idle fallback
//! guarantees there always is one). Total bit counts are therefore
//! `22 + 9 * K` for `K` frame bytes: 49, 58, 67 and 76 bits for payloads of
//! 2 to 5 bytes.
//!
//! # Example
//!
//! ```rust
//! use rs_dcc::packet::Packet;
//!
//! // Speed-step packet to locomotive 3; the encoder appends 0x3C.
//! let packet = Packet::encode(&[0x03, 0x3F, 0x00], 0).unwrap();
//! assert_eq!(packet.len_bits(), 58);
//! assert!(packet.bit(0)); // preamble
//! assert!(!packet.bit(22)); // packet-start bit
//! ```

/// Longest payload accepted by the encoder, excluding the checksum.
pub const MAX_PAYLOAD_BYTES: usize = 5;

/// Size of the packed bit buffer. 10 bytes covers the longest frame
/// (76 bits).
pub const PACKET_BUFFER_BYTES: usize = 10;

/// Number of `1` bits emitted ahead of the packet-start bit.
///
/// NMRA S-9.2 requires at least 14 for operations mode and S-9.2.3 at
/// least 20 for service mode; 22 satisfies both tracks with one encoder.
pub const PREAMBLE_BITS: u16 = 22;

/// Error raised when a payload cannot be framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingError {
    /// Payload length was outside `1..=5` bytes.
    PayloadLength(usize),
}

impl core::fmt::Display for EncodingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EncodingError::PayloadLength(len) => {
                write!(f, "payload of {} bytes, expected 1..=5", len)
            }
        }
    }
}

/// One framed DCC packet with its transmission state.
///
/// Packets live in a fixed pool and are recycled for the lifetime of the
/// base station: the foreground fills one from the free list, the bit ISR
/// consumes it and returns it zeroed. While a packet sits in the to-send
/// queue or is the active one, only the ISR touches its cursor and repeat
/// count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    buffer: [u8; PACKET_BUFFER_BYTES],
    number_of_bits: u16,
    current_bit: u16,
    number_of_repeats: u8,
}

impl Packet {
    /// Frames `payload` into a ready-to-transmit packet.
    ///
    /// The XOR checksum is computed and appended here; callers pass only
    /// the semantic payload bytes. `repeats` is the number of *extra*
    /// transmissions after the first, so `repeats == 3` puts the packet on
    /// the wire four times.
    ///
    /// # Errors
    ///
    /// [`EncodingError::PayloadLength`] if `payload` is empty or longer
    /// than [`MAX_PAYLOAD_BYTES`].
    pub fn encode(payload: &[u8], repeats: u8) -> Result<Self, EncodingError> {
        Self::check_payload(payload)?;
        let mut packet = Self::default();
        packet.fill(payload, repeats);
        Ok(packet)
    }

    /// Validates a payload length without consuming a pool slot.
    pub(crate) fn check_payload(payload: &[u8]) -> Result<(), EncodingError> {
        if payload.is_empty() || payload.len() > MAX_PAYLOAD_BYTES {
            return Err(EncodingError::PayloadLength(payload.len()));
        }
        Ok(())
    }

    /// Packs `payload` plus checksum into the buffer and resets the
    /// transmission state. The payload must already be validated.
    pub(crate) fn fill(&mut self, payload: &[u8], repeats: u8) {
        debug_assert!(Self::check_payload(payload).is_ok());

        let mut checksum = 0u8;
        for byte in payload {
            checksum ^= byte;
        }

        self.buffer = [0; PACKET_BUFFER_BYTES];
        let mut cursor = 0u16;
        for _ in 0..PREAMBLE_BITS {
            self.set_bit(cursor, true);
            cursor += 1;
        }
        for &byte in payload.iter().chain(core::iter::once(&checksum)) {
            // packet-start bit for the first byte, separator for the rest
            self.set_bit(cursor, false);
            cursor += 1;
            for shift in (0..8).rev() {
                self.set_bit(cursor, byte & (1 << shift) != 0);
                cursor += 1;
            }
        }

        self.number_of_bits = cursor;
        self.current_bit = 0;
        self.number_of_repeats = repeats;
    }

    /// Zeroes the buffer and transmission state, restoring the free-list
    /// invariant before the slot is recycled.
    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }

    fn set_bit(&mut self, index: u16, value: bool) {
        let mask = 0x80 >> (index % 8);
        if value {
            self.buffer[usize::from(index / 8)] |= mask;
        } else {
            self.buffer[usize::from(index / 8)] &= !mask;
        }
    }

    /// Reads bit `index` of the packed frame, MSB-first within each byte.
    #[inline]
    pub fn bit(&self, index: u16) -> bool {
        self.buffer[usize::from(index / 8)] & (0x80 >> (index % 8)) != 0
    }

    /// Total number of bits in the frame.
    #[inline]
    pub fn len_bits(&self) -> u16 {
        self.number_of_bits
    }

    /// Remaining extra transmissions after the current one.
    #[inline]
    pub fn repeats_remaining(&self) -> u8 {
        self.number_of_repeats
    }

    /// Transmission cursor, `0..=len_bits()`.
    #[inline]
    pub fn cursor(&self) -> u16 {
        self.current_bit
    }

    /// True once every bit of the current transmission has been shifted
    /// out.
    #[inline]
    pub(crate) fn exhausted(&self) -> bool {
        self.current_bit == self.number_of_bits
    }

    /// Shifts out the next bit and advances the cursor.
    #[inline]
    pub(crate) fn next_bit(&mut self) -> bool {
        let bit = self.bit(self.current_bit);
        self.current_bit += 1;
        bit
    }

    /// Winds the cursor back for a retransmission, consuming one repeat.
    #[inline]
    pub(crate) fn consume_repeat(&mut self) {
        self.number_of_repeats -= 1;
        self.current_bit = 0;
    }

    /// Rewinds the cursor without touching the repeat budget. Used when
    /// the dedicated idle packet is reinstalled as the active one.
    #[inline]
    pub(crate) fn rewind(&mut self) {
        self.current_bit = 0;
    }

    /// First `n` bytes of the packed buffer, for diagnostics.
    pub fn raw_bytes(&self) -> &[u8; PACKET_BUFFER_BYTES] {
        &self.buffer
    }
}
