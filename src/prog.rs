//! Service-mode CV programming over the programming track.
//!
//! Service mode has no data channel back from the decoder; the only
//! feedback is a basic-acknowledgement pulse, a roughly 60 mA rise in
//! track current held for about 6 ms (S-9.2.3 section E). The programmer
//! therefore works in verify/sample rounds: queue reset packets and a
//! direct-mode instruction, drain the queue so the instruction has fully
//! left the wire, then average a burst of ADC samples and compare against
//! the board-specific ACK threshold.
//!
//! Reading a CV takes nine rounds: one verify-bit round per bit position,
//! then a verify-byte round to confirm the assembled value. Writes retry
//! up to five times, each attempt confirming the write with a verify
//! round before reporting success.
//!
//! The programmer assumes exclusive use of the programming track; it must
//! not run while any other producer is loading packets on the same
//! generator.
//!
//! # Example
//!
//! ```rust
//! use rs_dcc::config::{ServiceModeConfig, TrackConfig};
//! use rs_dcc::generator::{PacketPool, SignalGenerator};
//! use rs_dcc::hal::{DccDecoder, MockMotorBoard, MockSignalTimer, MockTrackPin, PumpDelay};
//! use rs_dcc::prog::ServiceModeProgrammer;
//! use rs_dcc::waveform::WaveformDriver;
//!
//! let mut pool: PacketPool<65> = PacketPool::new();
//! let (mut track, stream) = SignalGenerator::configure(&mut pool, &TrackConfig::prog());
//! let driver = WaveformDriver::new(
//!     stream,
//!     MockSignalTimer::new(),
//!     MockSignalTimer::new(),
//!     MockTrackPin::new(),
//! );
//!
//! // A simulated decoder with CV 1 preset, wired to the ADC mock.
//! let decoder = DccDecoder::shared();
//! decoder.borrow_mut().set_cv(1, 3);
//! let board = MockMotorBoard::new("PROG", 2000).with_decoder(decoder.clone());
//! let pump = PumpDelay::new(driver, decoder);
//!
//! let mut programmer =
//!     ServiceModeProgrammer::new(&mut track, board, pump, ServiceModeConfig::default());
//! assert_eq!(programmer.read_cv(1), Ok(3));
//! ```

use log::{debug, info, warn};

use crate::config::ServiceModeConfig;
use crate::cv::{self, CvError};
use crate::generator::SignalGenerator;
use crate::traits::{Delay, MotorBoard};
use crate::waveform::RESET_PAYLOAD;

/// Raw ADC full scale assumed by the ACK threshold arithmetic (12-bit).
pub const ADC_FULL_SCALE: u32 = 4096;

/// Current rise that constitutes a basic acknowledgement, in milliamps.
pub const ACK_DELTA_MILLIAMPS: u32 = 60;

/// ACK detection threshold in raw ADC counts for a board of the given
/// rating: the 60 mA acknowledgement rise expressed on a full-scale
/// current sense.
pub fn ack_threshold(max_milliamps: u32) -> u32 {
    ADC_FULL_SCALE * ACK_DELTA_MILLIAMPS / max_milliamps.max(1)
}

/// Service-mode programmer bound to the programming-track generator and
/// its motor board.
///
/// `B` supplies current samples and the rating for the ACK threshold; `D`
/// provides the blocking waits between samples and while the queue
/// drains.
pub struct ServiceModeProgrammer<'a, 'q, B, D, const N: usize>
where
    B: MotorBoard,
    D: Delay,
{
    track: &'a mut SignalGenerator<'q, N>,
    board: B,
    delay: D,
    config: ServiceModeConfig,
}

impl<'a, 'q, B, D, const N: usize> ServiceModeProgrammer<'a, 'q, B, D, N>
where
    B: MotorBoard,
    D: Delay,
{
    /// Creates a programmer over the programming track.
    pub fn new(
        track: &'a mut SignalGenerator<'q, N>,
        board: B,
        delay: D,
        config: ServiceModeConfig,
    ) -> Self {
        Self {
            track,
            board,
            delay,
            config,
        }
    }

    /// Averages a burst of raw current samples, spaced
    /// [`sample_interval_ms`](ServiceModeConfig::sample_interval_ms)
    /// apart. Zero readings are failed conversions and do not count
    /// toward the mean.
    fn sample_current(&mut self) -> u32 {
        let mut sum = 0u64;
        let mut successful = 0u32;
        for _ in 0..self.config.sample_count() {
            let reading = self.board.sample_current_raw();
            if reading > 0 {
                sum += u64::from(reading);
                successful += 1;
            }
            self.delay.delay_ms(self.config.sample_interval_ms());
        }
        if successful > 0 {
            (sum / u64::from(successful)) as u32
        } else {
            0
        }
    }

    /// Queues an instruction preceded by reset packets, drains the queue
    /// and reports whether the decoder pulled an acknowledgement.
    fn send_and_detect_ack(
        &mut self,
        reset_repeats: u8,
        payload: &[u8; 3],
        repeats: u8,
        threshold: u32,
    ) -> Result<bool, CvError> {
        self.track
            .load_packet(&mut self.delay, &RESET_PAYLOAD, reset_repeats)?;
        self.track.load_packet(&mut self.delay, payload, repeats)?;
        self.track.wait_queue_empty(&mut self.delay);
        Ok(self.sample_current() > threshold)
    }

    /// Reads a CV one bit at a time, then confirms the assembled byte
    /// with a verify round.
    ///
    /// # Errors
    ///
    /// [`CvError::CvOutOfRange`] for CVs outside `1..=1024`;
    /// [`CvError::VerificationFailed`] when the final byte-verify draws
    /// no acknowledgement (an absent or all-zero decoder is
    /// indistinguishable from a failed read until that confirmation).
    pub fn read_cv(&mut self, cv: u16) -> Result<u8, CvError> {
        cv::cv_address(cv)?;
        let threshold = ack_threshold(self.board.max_milliamps());
        debug!(
            "[{}] reading CV {}, {} samples, ack threshold {}",
            self.board.name(),
            cv,
            self.config.sample_count(),
            threshold
        );

        let mut value = 0u8;
        for bit in 0..8 {
            let payload = cv::verify_bit_set(cv, bit)?;
            if self.send_and_detect_ack(3, &payload, 5, threshold)? {
                debug!("[{}] CV {} bit {}/7 is one", self.board.name(), cv, bit);
                value |= 1 << bit;
            } else {
                debug!("[{}] CV {} bit {}/7 is zero", self.board.name(), cv, bit);
            }
        }

        debug!(
            "[{}] CV {} read as {}, verifying",
            self.board.name(),
            cv,
            value
        );
        let confirm = cv::verify_byte(cv, value)?;
        if self.send_and_detect_ack(3, &confirm, 5, threshold)? {
            info!("[{}] CV {} verified as {}", self.board.name(), cv, value);
            Ok(value)
        } else {
            warn!("[{}] CV {} could not be verified", self.board.name(), cv);
            Err(CvError::VerificationFailed)
        }
    }

    /// Writes a whole CV byte, confirming with a verify round. Retries
    /// the write up to the configured attempt budget and always leaves
    /// reset packets on the wire between attempts.
    ///
    /// # Errors
    ///
    /// [`CvError::CvOutOfRange`] for invalid CVs;
    /// [`CvError::VerificationFailed`] once all attempts are exhausted.
    pub fn write_cv_byte(&mut self, cv: u16, value: u8) -> Result<(), CvError> {
        let write = cv::write_byte(cv, value)?;
        let confirm = cv::verify_byte(cv, value)?;
        self.write_with_confirmation(&write, &confirm)
    }

    /// Writes a single CV bit, confirming with the matching verify form.
    ///
    /// # Errors
    ///
    /// [`CvError::CvOutOfRange`] / [`CvError::BitOutOfRange`] for invalid
    /// arguments; [`CvError::VerificationFailed`] once all attempts are
    /// exhausted.
    pub fn write_cv_bit(&mut self, cv: u16, bit: u8, value: bool) -> Result<(), CvError> {
        let write = cv::write_bit(cv, bit, value)?;
        let confirm = cv::confirm_bit(cv, bit, value)?;
        self.write_with_confirmation(&write, &confirm)
    }

    fn write_with_confirmation(
        &mut self,
        write: &[u8; 3],
        confirm: &[u8; 3],
    ) -> Result<(), CvError> {
        let threshold = ack_threshold(self.board.max_milliamps());
        let attempts = self.config.write_attempts();
        let mut verified = false;

        for attempt in 1..=attempts {
            debug!(
                "[{} {}/{}] writing {:02x?}",
                self.board.name(),
                attempt,
                attempts,
                write
            );
            if self.send_and_detect_ack(1, write, 4, threshold)? {
                // The decoder took the write; confirm it stuck.
                if self.send_and_detect_ack(3, confirm, 5, threshold)? {
                    verified = true;
                    debug!(
                        "[{} {}/{}] write verified",
                        self.board.name(),
                        attempt,
                        attempts
                    );
                }
            } else {
                warn!(
                    "[{} {}/{}] write drew no acknowledgement",
                    self.board.name(),
                    attempt,
                    attempts
                );
            }
            info!("[{}] sending decoder reset packets", self.board.name());
            self.track
                .load_packet(&mut self.delay, &RESET_PAYLOAD, 3)?;
            if verified {
                break;
            }
        }

        if verified {
            Ok(())
        } else {
            Err(CvError::VerificationFailed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_threshold_matches_board_rating() {
        // 60 mA on a 2 A board is about 3% of full scale.
        assert_eq!(ack_threshold(2000), 122);
        assert_eq!(ack_threshold(1000), 245);
        assert_eq!(ack_threshold(5000), 49);
    }

    #[test]
    fn ack_threshold_survives_zero_rating() {
        assert_eq!(ack_threshold(0), ADC_FULL_SCALE * ACK_DELTA_MILLIAMPS);
    }
}
