//! Hardware abstraction traits for the DCC signal path.
//!
//! This module defines the seams between the platform-independent signal
//! core and the hardware it drives.
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`SignalTimer`] | Microsecond alarm timer behind the bit ISRs |
//! | [`TrackPin`] | Track direction GPIO raised/dropped per bit |
//! | [`MotorBoard`] | Current sensing and rating for one motor shield |
//! | [`Delay`] | Blocking millisecond delay for foreground waits |
//!
//! # Interrupt-context contract
//!
//! The waveform engine calls [`SignalTimer::set_alarm_us`],
//! [`SignalTimer::restart`], [`TrackPin::set_high`] and
//! [`TrackPin::set_low`] from interrupt context, once per transmitted bit
//! (every 116–196 µs). Implementations of these methods must be resident,
//! non-blocking, and must not allocate or take locks; they are therefore
//! infallible by signature. Fallible setup and teardown live in
//! [`SignalTimer::arm`] / [`SignalTimer::disarm`], which only foreground
//! code calls.
//!
//! # Implementation
//!
//! For testing and desktop development, use the mock implementations from
//! [`crate::hal::mock`]. For ESP32 hardware, use the implementations from
//! `hal::esp32` (requires the `esp32` feature).

/// Microsecond-resolution hardware alarm timer.
///
/// Two of these drive each track: a full-cycle timer that fires once per
/// bit, and a pulse timer that fires once at the bit midpoint. The
/// constructor of an implementation decides auto-reload (full-cycle) versus
/// one-shot (pulse) behaviour; prescale must give one timer tick per
/// microsecond.
pub trait SignalTimer {
    /// Error type for arm/disarm operations.
    type Error;

    /// Zeroes the counter and starts the timer with its alarm and
    /// interrupt enabled.
    fn arm(&mut self) -> Result<(), Self::Error>;

    /// Stops the timer and disables its interrupt. After this returns no
    /// further alarm callback will be scheduled, though one may already be
    /// in flight.
    fn disarm(&mut self) -> Result<(), Self::Error>;

    /// Reprograms the alarm to fire `us` microseconds after the counter
    /// origin.
    ///
    /// Called from interrupt context; must not block or fail.
    fn set_alarm_us(&mut self, us: u64);

    /// Zeroes the counter and re-enables the alarm for another shot.
    ///
    /// Called from interrupt context; must not block or fail.
    fn restart(&mut self);
}

/// Track direction GPIO.
///
/// The full-cycle ISR raises the pin at the start of every bit and the
/// pulse ISR drops it at the midpoint, producing the bipolar DCC waveform
/// through the motor shield's H-bridge.
///
/// Constructors must configure the pin as an output driven low, so the
/// track is unpowered until the timers start.
pub trait TrackPin {
    /// Drives the pin high. Interrupt context; must not block or fail.
    fn set_high(&mut self);

    /// Drives the pin low. Interrupt context; must not block or fail.
    fn set_low(&mut self);
}

/// One motor shield: a named output channel with current sensing.
///
/// The service-mode programmer consumes only three things from a board:
/// its name (diagnostics), its maximum current rating (ACK threshold
/// arithmetic) and single-shot raw ADC reads of the track current.
pub trait MotorBoard {
    /// Board name, `"OPS"` or `"PROG"` on a stock wiring.
    fn name(&self) -> &str;

    /// Maximum rated current of the shield in milliamps.
    fn max_milliamps(&self) -> u32;

    /// Takes one raw ADC sample of the track current.
    ///
    /// Full scale is 4095 (12-bit). A reading of `0` denotes a failed
    /// conversion and is discarded by callers.
    fn sample_current_raw(&mut self) -> u16;
}

/// Blocking millisecond delay.
///
/// Every foreground suspension point (free-slot backpressure in
/// `load_packet`, queue-drain polling, ADC sample spacing, the post-stop
/// quiescence wait) goes through this trait, so hosts choose the blocking
/// primitive: FreeRTOS on the ESP32, `std::thread::sleep` on desktop, or a
/// simulation pump in tests.
pub trait Delay {
    /// Blocks the calling context for at least `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);
}

impl<T: Delay + ?Sized> Delay for &mut T {
    fn delay_ms(&mut self, ms: u32) {
        (**self).delay_ms(ms);
    }
}

/// Std-backed delay for desktop hosts.
#[cfg(feature = "std")]
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

#[cfg(feature = "std")]
impl Delay for StdDelay {
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingDelay(u32);

    impl Delay for CountingDelay {
        fn delay_ms(&mut self, ms: u32) {
            self.0 += ms;
        }
    }

    #[test]
    fn delay_forwards_through_mut_ref() {
        let mut inner = CountingDelay(0);
        {
            let mut by_ref: &mut CountingDelay = &mut inner;
            by_ref.delay_ms(5);
            by_ref.delay_ms(7);
        }
        assert_eq!(inner.0, 12);
    }

    #[cfg(feature = "std")]
    #[test]
    fn std_delay_sleeps_roughly_the_requested_time() {
        let mut delay = StdDelay;
        let start = std::time::Instant::now();
        delay.delay_ms(10);
        assert!(start.elapsed() >= std::time::Duration::from_millis(10));
    }
}
