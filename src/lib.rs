//! # rs-dcc
//!
//! The signal-generation and service-mode programming core of an NMRA DCC
//! base station, with support for an operations track and an isolated
//! programming track.
//!
//! ## Features
//!
//! - **Hardware abstraction**: Traits for the waveform timers, track GPIO,
//!   motor-board current sensing and blocking delays
//! - **Bit-exact waveform**: 58/58 µs one bits and 98/98 µs zero bits fed
//!   from per-track packet queues with an idle-packet fallback
//! - **Fixed packet pools**: Lock-free single-producer/single-consumer
//!   rings over preallocated slots; no allocation after configuration
//! - **Service-mode programming**: CV reads and verified writes with
//!   current-pulse acknowledgement detection
//! - **Operations-mode programming**: Fire-and-forget CV writes addressed
//!   to a locomotive on the main
//!
//! ## Architecture
//!
//! The crate is structured to allow testing on desktop without hardware:
//!
//! - `traits` - Hardware abstractions (timers, GPIO, ADC, delay)
//! - `packet` - The packed bit buffer and frame encoder
//! - `generator` - Packet pools and the foreground queueing handle
//! - `waveform` - The interrupt-side bitstream engine and timer driver
//! - `cv` - CV instruction payloads and address encoding
//! - `prog` / `ops` - Service-mode and operations-mode programmers
//! - `hal` - Concrete implementations (mock for testing, esp32 for
//!   hardware)
//!
//! ## Example
//!
//! ```rust
//! use rs_dcc::{
//!     config::TrackConfig,
//!     generator::{PacketPool, SignalGenerator},
//!     hal::{MockDelay, MockSignalTimer, MockTrackPin},
//!     waveform::WaveformDriver,
//! };
//!
//! // One track: a pool, the foreground handle and the interrupt engine.
//! let mut pool: PacketPool<65> = PacketPool::new();
//! let (mut track, stream) = SignalGenerator::configure(&mut pool, &TrackConfig::ops());
//! let mut driver = WaveformDriver::new(
//!     stream,
//!     MockSignalTimer::new(),
//!     MockSignalTimer::new(),
//!     MockTrackPin::new(),
//! );
//!
//! // Seed the power-up sequence and start the waveform.
//! let mut delay = MockDelay::new();
//! track.send_startup_sequence(&mut delay).unwrap();
//! driver.start().unwrap();
//!
//! // On hardware the timer interrupts call these; here we pump by hand.
//! for _ in 0..49 {
//!     driver.on_full_cycle();
//!     driver.on_pulse();
//! }
//! ```
//!
//! On the ESP32 the same engine is bound to hardware timer interrupts; see
//! the `hal::esp32` module and the `esp32_station` binary (feature
//! `esp32`).

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

extern crate alloc;

/// Shared configuration for tracks and the service-mode programmer.
pub mod config;
/// CV instruction payloads and address encoding.
pub mod cv;
/// Packet pools and the foreground queueing handle per track.
pub mod generator;
/// Hardware abstraction layer with mock implementations for testing.
pub mod hal;
/// Fire-and-forget operations-mode CV writes.
pub mod ops;
/// DCC packet bit buffer and frame encoder.
pub mod packet;
/// Service-mode CV programming with ACK detection.
pub mod prog;
/// Core traits for hardware abstraction.
pub mod traits;
/// The interrupt-side bitstream engine and waveform timing.
pub mod waveform;

// Re-exports for convenience
pub use config::{ServiceModeConfig, TrackConfig, TrackName};
pub use cv::CvError;
pub use generator::{
    OpsPacketPool, PacketPool, ProgPacketPool, SignalGenerator, OPS_POOL_SLOTS, PROG_POOL_SLOTS,
};
pub use ops::OpsProgrammer;
pub use packet::{EncodingError, Packet};
pub use prog::ServiceModeProgrammer;
pub use traits::{Delay, MotorBoard, SignalTimer, TrackPin};
pub use waveform::{Bitstream, DccBit, WaveformDriver, IDLE_PAYLOAD, RESET_PAYLOAD};

#[cfg(feature = "std")]
pub use traits::StdDelay;
