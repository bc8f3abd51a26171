//! Mock implementations for testing without hardware.
//!
//! This module provides test doubles for all hardware traits, plus a
//! bit-level DCC decoder simulator, enabling development and testing of
//! the whole signal path on desktop without a base station.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockSignalTimer`] | [`SignalTimer`] | Records alarms, arm state, restarts |
//! | [`MockTrackPin`] | [`TrackPin`] | Tracks pin level and edge counts |
//! | [`MockDelay`] | [`Delay`] | Records requested waits without sleeping |
//! | [`MockMotorBoard`] | [`MotorBoard`] | Scripted or simulator-driven ADC readings |
//! | [`PumpDelay`] | [`Delay`] | Advances a waveform driver in lieu of real time |
//! | [`DccDecoder`] | (none) | Frames and executes packets from the raw bitstream |
//!
//! # Example
//!
//! ```rust
//! use rs_dcc::config::TrackConfig;
//! use rs_dcc::generator::{PacketPool, SignalGenerator};
//! use rs_dcc::hal::{DccDecoder, MockDelay, MockSignalTimer, MockTrackPin};
//! use rs_dcc::waveform::{DccBit, WaveformDriver};
//!
//! let mut pool: PacketPool<9> = PacketPool::new();
//! let (mut track, stream) = SignalGenerator::configure(&mut pool, &TrackConfig::ops());
//! let mut driver = WaveformDriver::new(
//!     stream,
//!     MockSignalTimer::new(),
//!     MockSignalTimer::new(),
//!     MockTrackPin::new(),
//! );
//!
//! track
//!     .load_packet(&mut MockDelay::new(), &[0x03, 0x3F, 0x00], 0)
//!     .unwrap();
//!
//! // Pump the bitstream into a simulated decoder and watch it frame the
//! // packet, checksum included.
//! let mut decoder = DccDecoder::new();
//! for _ in 0..58 {
//!     let bit = driver.on_full_cycle();
//!     decoder.feed(bit == DccBit::One);
//! }
//! // A trailing one closes the frame (the next preamble supplies it on
//! // the wire).
//! decoder.feed(true);
//! assert_eq!(decoder.packets(), &[vec![0x03, 0x3F, 0x00]]);
//! ```
//!
//! [`SignalTimer`]: crate::traits::SignalTimer
//! [`TrackPin`]: crate::traits::TrackPin
//! [`Delay`]: crate::traits::Delay
//! [`MotorBoard`]: crate::traits::MotorBoard

extern crate alloc;

use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::traits::{Delay, MotorBoard, SignalTimer, TrackPin};
use crate::waveform::{DccBit, WaveformDriver};

// ============================================================================
// Hardware Mocks
// ============================================================================

/// Error type shared by the mock hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockHalError;

impl core::fmt::Display for MockHalError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "mock hardware failure")
    }
}

/// Mock alarm timer for testing.
///
/// Records every alarm duration written to it, the arm state and how
/// often the counter was restarted, so tests can reconstruct the exact
/// waveform timing the engine asked for.
///
/// # Example
///
/// ```rust
/// use rs_dcc::hal::MockSignalTimer;
/// use rs_dcc::traits::SignalTimer;
///
/// let mut timer = MockSignalTimer::new();
/// timer.set_alarm_us(116);
/// timer.arm().unwrap();
///
/// assert_eq!(timer.alarms(), &[116]);
/// assert!(timer.armed());
/// ```
#[derive(Debug, Default)]
pub struct MockSignalTimer {
    alarms: Vec<u64>,
    armed: bool,
    restarts: usize,
    fail_arm: bool,
}

impl MockSignalTimer {
    /// Creates a new mock timer, disarmed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a timer whose `arm` call fails, for exercising hardware
    /// bring-up error paths.
    pub fn failing() -> Self {
        Self {
            fail_arm: true,
            ..Self::default()
        }
    }

    /// Every alarm duration written, in order.
    pub fn alarms(&self) -> &[u64] {
        &self.alarms
    }

    /// The most recent alarm duration, if any.
    pub fn last_alarm(&self) -> Option<u64> {
        self.alarms.last().copied()
    }

    /// Whether the timer is currently armed.
    pub fn armed(&self) -> bool {
        self.armed
    }

    /// Number of counter restarts since creation.
    pub fn restart_count(&self) -> usize {
        self.restarts
    }
}

impl SignalTimer for MockSignalTimer {
    type Error = MockHalError;

    fn arm(&mut self) -> Result<(), MockHalError> {
        if self.fail_arm {
            return Err(MockHalError);
        }
        self.armed = true;
        Ok(())
    }

    fn disarm(&mut self) -> Result<(), MockHalError> {
        self.armed = false;
        Ok(())
    }

    fn set_alarm_us(&mut self, us: u64) {
        self.alarms.push(us);
    }

    fn restart(&mut self) {
        self.restarts += 1;
    }
}

/// Mock track direction pin.
///
/// # Example
///
/// ```rust
/// use rs_dcc::hal::MockTrackPin;
/// use rs_dcc::traits::TrackPin;
///
/// let mut pin = MockTrackPin::new();
/// pin.set_high();
/// pin.set_low();
/// assert!(!pin.is_high());
/// assert_eq!(pin.rise_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockTrackPin {
    high: bool,
    rises: usize,
    falls: usize,
}

impl MockTrackPin {
    /// Creates a new pin, driven low.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current pin level.
    pub fn is_high(&self) -> bool {
        self.high
    }

    /// Number of low-to-high transitions.
    pub fn rise_count(&self) -> usize {
        self.rises
    }

    /// Number of high-to-low transitions.
    pub fn fall_count(&self) -> usize {
        self.falls
    }
}

impl TrackPin for MockTrackPin {
    fn set_high(&mut self) {
        if !self.high {
            self.rises += 1;
        }
        self.high = true;
    }

    fn set_low(&mut self) {
        if self.high {
            self.falls += 1;
        }
        self.high = false;
    }
}

/// Mock delay that records requested waits without sleeping.
///
/// # Example
///
/// ```rust
/// use rs_dcc::hal::MockDelay;
/// use rs_dcc::traits::Delay;
///
/// let mut delay = MockDelay::new();
/// delay.delay_ms(2);
/// delay.delay_ms(10);
/// assert_eq!(delay.total_ms(), 12);
/// assert_eq!(delay.call_count(), 2);
/// ```
#[derive(Debug, Default)]
pub struct MockDelay {
    calls: Vec<u32>,
}

impl MockDelay {
    /// Creates a new mock delay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of all requested waits in milliseconds.
    pub fn total_ms(&self) -> u64 {
        self.calls.iter().map(|&ms| u64::from(ms)).sum()
    }

    /// Number of delay calls made.
    pub fn call_count(&self) -> usize {
        self.calls.len()
    }
}

impl Delay for MockDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.calls.push(ms);
    }
}

// ============================================================================
// Decoder simulator
// ============================================================================

/// Bit-level DCC decoder simulator.
///
/// Consumes the raw bitstream the way a decoder front end does: wait for
/// a preamble of at least ten ones, take the next zero as the packet
/// start, collect 9-bit groups (separator plus data byte) until a one
/// appears in a separator position, then check the XOR byte. Valid
/// packets are recorded and, for service-mode direct instructions,
/// executed against an internal 1024-entry CV store with an ACK flag
/// that reset packets clear.
///
/// Shared between a [`PumpDelay`] (which feeds bits) and a
/// [`MockMotorBoard`] (which translates the ACK flag into current
/// readings) via [`DccDecoder::shared`].
#[derive(Debug)]
pub struct DccDecoder {
    ones_run: u16,
    in_packet: bool,
    byte_acc: u8,
    bits_in_byte: u8,
    frame: Vec<u8>,
    packets: Vec<Vec<u8>>,
    cvs: [u8; 1024],
    ack: bool,
}

impl Default for DccDecoder {
    fn default() -> Self {
        Self {
            ones_run: 0,
            in_packet: false,
            byte_acc: 0,
            bits_in_byte: 0,
            frame: Vec::new(),
            packets: Vec::new(),
            cvs: [0; 1024],
            ack: false,
        }
    }
}

impl DccDecoder {
    /// Shortest run of ones accepted as a preamble.
    pub const MIN_PREAMBLE: u16 = 10;

    /// Creates a decoder with an all-zero CV store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a decoder behind an `Rc<RefCell<_>>` for sharing between
    /// the bit pump and the current-sense mock.
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Presets a CV value, 1-based.
    pub fn set_cv(&mut self, cv: u16, value: u8) {
        self.cvs[usize::from(cv - 1)] = value;
    }

    /// Reads back a CV value, 1-based.
    pub fn cv(&self, cv: u16) -> u8 {
        self.cvs[usize::from(cv - 1)]
    }

    /// Whether the decoder is currently pulling an acknowledgement.
    pub fn ack_active(&self) -> bool {
        self.ack
    }

    /// Every checksum-valid packet observed, payload bytes only.
    pub fn packets(&self) -> &[Vec<u8>] {
        &self.packets
    }

    /// Consumes one bit off the wire.
    pub fn feed(&mut self, bit: bool) {
        if !self.in_packet {
            if bit {
                self.ones_run = self.ones_run.saturating_add(1);
            } else if self.ones_run >= Self::MIN_PREAMBLE {
                self.in_packet = true;
                self.frame.clear();
                self.byte_acc = 0;
                self.bits_in_byte = 0;
                self.ones_run = 0;
            } else {
                self.ones_run = 0;
            }
            return;
        }

        if self.bits_in_byte == 8 {
            self.frame.push(self.byte_acc);
            self.byte_acc = 0;
            self.bits_in_byte = 0;
            if bit {
                // A one in a separator position ends the packet and opens
                // the next preamble.
                self.complete_frame();
                self.in_packet = false;
                self.ones_run = 1;
            }
        } else {
            self.byte_acc = (self.byte_acc << 1) | u8::from(bit);
            self.bits_in_byte += 1;
        }
    }

    fn complete_frame(&mut self) {
        if self.frame.len() < 2 {
            return;
        }
        let checksum = self.frame.iter().fold(0u8, |acc, b| acc ^ b);
        if checksum != 0 {
            return;
        }
        let payload = self.frame[..self.frame.len() - 1].to_vec();
        self.execute(&payload);
        self.packets.push(payload);
    }

    fn execute(&mut self, payload: &[u8]) {
        match payload {
            [0x00, 0x00] => self.ack = false,
            [op, lo, data] if op & 0xF0 == 0x70 => {
                let index = usize::from(*op & 0x03) << 8 | usize::from(*lo);
                match (op >> 2) & 0x03 {
                    // verify byte
                    0b01 => {
                        if self.cvs[index] == *data {
                            self.ack = true;
                        }
                    }
                    // write byte
                    0b11 => {
                        self.cvs[index] = *data;
                        self.ack = true;
                    }
                    // bit manipulation: 111KDBBB
                    0b10 => {
                        let write = (data >> 4) & 1 == 1;
                        let value = (data >> 3) & 1 == 1;
                        let bit = data & 0x07;
                        if write {
                            if value {
                                self.cvs[index] |= 1 << bit;
                            } else {
                                self.cvs[index] &= !(1 << bit);
                            }
                            self.ack = true;
                        } else if (self.cvs[index] >> bit) & 1 == u8::from(value) {
                            self.ack = true;
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
}

/// Delay implementation that advances a waveform driver instead of
/// sleeping.
///
/// Every requested millisecond is converted into bit time: the pump runs
/// the full-cycle and pulse interrupt bodies until the emitted bit
/// durations cover the wait, feeding each bit to the shared decoder. The
/// whole service-mode round trip then runs single-threaded and
/// deterministic, with simulated time standing in for the interrupt
/// scheduler.
pub struct PumpDelay<'a, T: SignalTimer, P: TrackPin, const N: usize> {
    driver: WaveformDriver<'a, T, P, N>,
    decoder: Rc<RefCell<DccDecoder>>,
    pending_us: u64,
    total_ms: u64,
}

impl<'a, T: SignalTimer, P: TrackPin, const N: usize> PumpDelay<'a, T, P, N> {
    /// Creates a pump over a driver and the decoder it should feed.
    pub fn new(driver: WaveformDriver<'a, T, P, N>, decoder: Rc<RefCell<DccDecoder>>) -> Self {
        Self {
            driver,
            decoder,
            pending_us: 0,
            total_ms: 0,
        }
    }

    /// Total simulated time in milliseconds.
    pub fn total_ms(&self) -> u64 {
        self.total_ms
    }

    /// The driven waveform driver, for inspection or teardown.
    pub fn driver_mut(&mut self) -> &mut WaveformDriver<'a, T, P, N> {
        &mut self.driver
    }
}

impl<T: SignalTimer, P: TrackPin, const N: usize> Delay for PumpDelay<'_, T, P, N> {
    fn delay_ms(&mut self, ms: u32) {
        self.total_ms += u64::from(ms);
        self.pending_us += u64::from(ms) * 1000;
        while self.pending_us > 0 {
            let bit = self.driver.on_full_cycle();
            self.driver.on_pulse();
            self.decoder.borrow_mut().feed(bit == DccBit::One);
            self.pending_us = self.pending_us.saturating_sub(bit.total_us());
        }
    }
}

// ============================================================================
// Motor board mock
// ============================================================================

/// Mock motor board with scripted or simulator-driven current readings.
///
/// Reading priority: scripted readings first (in order, once each), then
/// the attached decoder simulator (ACK active reads as the ACK level,
/// otherwise quiescent), then the quiescent level.
///
/// # Example
///
/// ```rust
/// use rs_dcc::hal::MockMotorBoard;
/// use rs_dcc::traits::MotorBoard;
///
/// let mut board = MockMotorBoard::new("PROG", 2000).with_readings(&[0, 300]);
/// assert_eq!(board.name(), "PROG");
/// assert_eq!(board.sample_current_raw(), 0); // failed conversion
/// assert_eq!(board.sample_current_raw(), 300);
/// assert_eq!(board.sample_current_raw(), 40); // quiescent fallback
/// ```
#[derive(Debug)]
pub struct MockMotorBoard {
    name: String,
    max_milliamps: u32,
    scripted: Vec<u16>,
    next_scripted: usize,
    quiescent: u16,
    ack_level: u16,
    decoder: Option<Rc<RefCell<DccDecoder>>>,
    samples_taken: usize,
}

impl MockMotorBoard {
    /// Default quiescent current reading in raw counts.
    pub const DEFAULT_QUIESCENT: u16 = 40;

    /// Default reading while the simulated decoder pulls an ACK.
    pub const DEFAULT_ACK_LEVEL: u16 = 800;

    /// Creates a board with the given name and rating.
    pub fn new(name: &str, max_milliamps: u32) -> Self {
        Self {
            name: String::from(name),
            max_milliamps,
            scripted: Vec::new(),
            next_scripted: 0,
            quiescent: Self::DEFAULT_QUIESCENT,
            ack_level: Self::DEFAULT_ACK_LEVEL,
            decoder: None,
            samples_taken: 0,
        }
    }

    /// Queues scripted readings returned ahead of any simulator state.
    pub fn with_readings(mut self, readings: &[u16]) -> Self {
        self.scripted.extend_from_slice(readings);
        self
    }

    /// Attaches a decoder simulator whose ACK flag drives the readings.
    pub fn with_decoder(mut self, decoder: Rc<RefCell<DccDecoder>>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Overrides the quiescent and ACK reading levels.
    pub fn with_levels(mut self, quiescent: u16, ack_level: u16) -> Self {
        self.quiescent = quiescent;
        self.ack_level = ack_level;
        self
    }

    /// Number of samples taken so far.
    pub fn samples_taken(&self) -> usize {
        self.samples_taken
    }
}

impl MotorBoard for MockMotorBoard {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_milliamps(&self) -> u32 {
        self.max_milliamps
    }

    fn sample_current_raw(&mut self) -> u16 {
        self.samples_taken += 1;
        if self.next_scripted < self.scripted.len() {
            let reading = self.scripted[self.next_scripted];
            self.next_scripted += 1;
            return reading;
        }
        match &self.decoder {
            Some(decoder) if decoder.borrow().ack_active() => self.ack_level,
            _ => self.quiescent,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
