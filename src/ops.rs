//! Operations-mode CV programming on the main track.
//!
//! "Programming on the main" reconfigures a decoder while it sits on the
//! live layout, addressed by its locomotive number. There is no
//! acknowledgement channel on the operations track, so these writes are
//! fire-and-forget: the instruction goes on the wire with a handful of
//! repeats and the caller gets no confirmation beyond successful
//! enqueueing.
//!
//! Locomotives up to address 127 are addressed with the one-byte short
//! form; higher numbers use the two-byte long form with `0xC0` folded into
//! the high byte.
//!
//! # Example
//!
//! ```rust
//! use rs_dcc::config::TrackConfig;
//! use rs_dcc::generator::{PacketPool, SignalGenerator};
//! use rs_dcc::hal::MockDelay;
//! use rs_dcc::ops::OpsProgrammer;
//!
//! let mut pool: PacketPool<9> = PacketPool::new();
//! let (mut track, _stream) = SignalGenerator::configure(&mut pool, &TrackConfig::ops());
//!
//! let mut programmer = OpsProgrammer::new(&mut track, MockDelay::new());
//! programmer.write_cv_byte(3000, 8, 8).unwrap();
//! ```

use log::debug;

use crate::cv::{self, CvError};
use crate::generator::SignalGenerator;
use crate::traits::Delay;

/// Extra transmissions for every operations-mode programming packet.
pub const OPS_WRITE_REPEATS: u8 = 4;

/// Fire-and-forget CV writer bound to the operations-track generator.
pub struct OpsProgrammer<'a, 'q, D: Delay, const N: usize> {
    track: &'a mut SignalGenerator<'q, N>,
    delay: D,
}

impl<'a, 'q, D: Delay, const N: usize> OpsProgrammer<'a, 'q, D, N> {
    /// Creates a writer over the operations track.
    pub fn new(track: &'a mut SignalGenerator<'q, N>, delay: D) -> Self {
        Self { track, delay }
    }

    /// Queues a whole-byte CV write addressed to `loco`.
    ///
    /// # Errors
    ///
    /// [`CvError::AddressOutOfRange`] / [`CvError::CvOutOfRange`] for
    /// invalid arguments; nothing is queued in that case.
    pub fn write_cv_byte(&mut self, loco: u16, cv: u16, value: u8) -> Result<(), CvError> {
        let payload = cv::ops_write_byte(loco, cv, value)?;
        debug!(
            "[{}] updating CV {} to {} for loco {}",
            self.track.name(),
            cv,
            value,
            loco
        );
        self.track
            .load_packet(&mut self.delay, &payload, OPS_WRITE_REPEATS)?;
        Ok(())
    }

    /// Queues a single-bit CV write addressed to `loco`.
    ///
    /// # Errors
    ///
    /// [`CvError::AddressOutOfRange`] / [`CvError::CvOutOfRange`] /
    /// [`CvError::BitOutOfRange`] for invalid arguments; nothing is queued
    /// in that case.
    pub fn write_cv_bit(
        &mut self,
        loco: u16,
        cv: u16,
        bit: u8,
        value: bool,
    ) -> Result<(), CvError> {
        let payload = cv::ops_write_bit(loco, cv, bit, value)?;
        debug!(
            "[{}] updating CV {} bit {} to {} for loco {}",
            self.track.name(),
            cv,
            bit,
            value,
            loco
        );
        self.track
            .load_packet(&mut self.delay, &payload, OPS_WRITE_REPEATS)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackConfig;
    use crate::generator::PacketPool;
    use crate::hal::MockDelay;

    #[test]
    fn write_byte_queues_one_packet() {
        let mut pool: PacketPool<9> = PacketPool::new();
        let (mut track, _stream) = SignalGenerator::configure(&mut pool, &TrackConfig::ops());
        let mut programmer = OpsProgrammer::new(&mut track, MockDelay::new());

        programmer.write_cv_byte(3, 8, 8).unwrap();
        drop(programmer);
        assert_eq!(track.queue_len(), 1);
    }

    #[test]
    fn invalid_arguments_queue_nothing() {
        let mut pool: PacketPool<9> = PacketPool::new();
        let (mut track, _stream) = SignalGenerator::configure(&mut pool, &TrackConfig::ops());
        let mut programmer = OpsProgrammer::new(&mut track, MockDelay::new());

        assert_eq!(
            programmer.write_cv_byte(0, 8, 8),
            Err(CvError::AddressOutOfRange(0))
        );
        assert_eq!(
            programmer.write_cv_byte(3, 2000, 8),
            Err(CvError::CvOutOfRange(2000))
        );
        assert_eq!(
            programmer.write_cv_bit(3, 8, 8, true),
            Err(CvError::BitOutOfRange(8))
        );
        drop(programmer);
        assert!(track.queue_empty());
    }
}
