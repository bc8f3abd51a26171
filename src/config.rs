//! Shared configuration for the signal generators and the programmer.
//!
//! Uses `heapless::String` for `no_std` compatibility while remaining
//! ergonomic to use on desktop with `std`.
//!
//! # Example
//!
//! ```rust
//! use rs_dcc::config::{ServiceModeConfig, TrackConfig};
//!
//! // Stock tracks
//! let ops = TrackConfig::ops();
//! assert_eq!(ops.name(), "OPS");
//!
//! // Or customize
//! let prog = TrackConfig::prog().with_direction_pin(21);
//! assert_eq!(prog.direction_pin(), 21);
//!
//! let service = ServiceModeConfig::default().with_write_attempts(3);
//! assert_eq!(service.write_attempts(), 3);
//! ```

use heapless::String as HString;

/// Maximum length of a track name.
pub const MAX_TRACK_NAME: usize = 16;

/// Type alias for track name strings.
pub type TrackName = HString<MAX_TRACK_NAME>;

/// Create a [`TrackName`] from a `&str`, truncating if too long.
pub fn track_name(s: &str) -> TrackName {
    let mut name = TrackName::new();
    let take = s.len().min(MAX_TRACK_NAME);
    // Find valid UTF-8 boundary
    let valid_end = s
        .char_indices()
        .take_while(|(i, _)| *i < take)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let _ = name.push_str(&s[..valid_end]);
    name
}

// ============================================================================
// Track configuration
// ============================================================================

/// Identity and wiring of one signal generator.
///
/// The stock wiring drives the operations track from GPIO 19 and the
/// programming track from GPIO 18; the pin number here is consumed by the
/// platform layer when it constructs the direction output.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackConfig {
    /// Track name used to tag every log line for this generator.
    pub name: TrackName,
    /// GPIO number of the direction output.
    pub direction_pin: u8,
}

impl TrackConfig {
    /// Default direction pin for the operations track.
    pub const OPS_DIRECTION_PIN: u8 = 19;

    /// Default direction pin for the programming track.
    pub const PROG_DIRECTION_PIN: u8 = 18;

    /// Stock operations-track configuration.
    pub fn ops() -> Self {
        Self {
            name: track_name("OPS"),
            direction_pin: Self::OPS_DIRECTION_PIN,
        }
    }

    /// Stock programming-track configuration.
    pub fn prog() -> Self {
        Self {
            name: track_name("PROG"),
            direction_pin: Self::PROG_DIRECTION_PIN,
        }
    }

    /// Sets the track name.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = track_name(name);
        self
    }

    /// Sets the direction GPIO number.
    pub fn with_direction_pin(mut self, pin: u8) -> Self {
        self.direction_pin = pin;
        self
    }

    /// Track name as a string slice.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Owned copy of the track name.
    pub(crate) fn name_owned(&self) -> TrackName {
        self.name.clone()
    }

    /// Direction GPIO number.
    pub fn direction_pin(&self) -> u8 {
        self.direction_pin
    }
}

// ============================================================================
// Service-mode configuration
// ============================================================================

/// Tuning of the service-mode ACK detection and retry behaviour.
///
/// The defaults reproduce the classic base-station behaviour: 250 raw ADC
/// samples per decision spaced about 2 ms apart, and up to 5 attempts per
/// write. A full read decision therefore takes roughly half a second per
/// verify round; tightening `sample_count` trades speed against ACK
/// detection margin.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServiceModeConfig {
    /// Raw ADC samples taken per ACK decision.
    pub sample_count: u16,
    /// Spacing between samples in milliseconds.
    pub sample_interval_ms: u32,
    /// Write attempts before giving up.
    pub write_attempts: u8,
}

impl Default for ServiceModeConfig {
    fn default() -> Self {
        Self {
            sample_count: 250,
            sample_interval_ms: 2,
            write_attempts: 5,
        }
    }
}

impl ServiceModeConfig {
    /// Sets the number of ADC samples per ACK decision.
    pub fn with_sample_count(mut self, count: u16) -> Self {
        self.sample_count = count;
        self
    }

    /// Sets the spacing between ADC samples.
    pub fn with_sample_interval_ms(mut self, ms: u32) -> Self {
        self.sample_interval_ms = ms;
        self
    }

    /// Sets the write attempt budget.
    pub fn with_write_attempts(mut self, attempts: u8) -> Self {
        self.write_attempts = attempts;
        self
    }

    /// Raw ADC samples taken per ACK decision.
    pub fn sample_count(&self) -> u16 {
        self.sample_count
    }

    /// Spacing between samples in milliseconds.
    pub fn sample_interval_ms(&self) -> u32 {
        self.sample_interval_ms
    }

    /// Write attempts before giving up.
    pub fn write_attempts(&self) -> u8 {
        self.write_attempts
    }
}
