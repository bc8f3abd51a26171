//! ESP32 hardware abstraction layer for the DCC signal core.
//!
//! This module provides hardware implementations for an ESP32 base station
//! driving two motor shields, one per track. Each track consumes two of
//! the four general-purpose hardware timers plus one GPIO; the motor
//! shields' current-sense outputs feed ADC1.
//!
//! # Hardware Configuration
//!
//! - **MCU**: ESP32 (dual Xtensa LX6, 4 × 64-bit hardware timers)
//! - **Motor shields**: Dual H-bridge (L298/LMD18200 class) with
//!   current-sense outputs
//! - **Timers**: timer00/timer01 for OPS, timer10/timer11 for PROG
//!
//! # Pin Assignments
//!
//! See the [`pins`] module for the stock GPIO map.

mod board;
mod pin;
mod timer;

pub use board::Esp32MotorBoard;
pub use pin::Esp32TrackPin;
pub use timer::Esp32SignalTimer;

use crate::traits::Delay;

/// Pin assignments for the stock ESP32 base-station wiring.
pub mod pins {
    // =========================================================================
    // Track signal outputs
    // =========================================================================

    /// Operations-track direction signal to the motor shield.
    pub const OPS_SIGNAL: i32 = 19;

    /// Programming-track direction signal to the motor shield.
    pub const PROG_SIGNAL: i32 = 18;

    // =========================================================================
    // Current sense (ADC1)
    // =========================================================================

    /// Operations-shield current sense (GPIO36 / SENSOR_VP, ADC1 ch0).
    pub const OPS_CURRENT_SENSE: i32 = 36;

    /// Programming-shield current sense (GPIO39 / SENSOR_VN, ADC1 ch3).
    pub const PROG_CURRENT_SENSE: i32 = 39;
}

/// FreeRTOS-backed blocking delay.
///
/// Yields the calling task, so foreground polling waits do not starve the
/// rest of the system.
#[derive(Debug, Default, Clone, Copy)]
pub struct Esp32Delay;

impl Esp32Delay {
    /// Creates a new FreeRTOS delay.
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Delay for Esp32Delay {
    fn delay_ms(&mut self, ms: u32) {
        esp_idf_hal::delay::FreeRtos::delay_ms(ms);
    }
}
