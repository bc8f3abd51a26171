//! ESP32 hardware timer implementation of [`SignalTimer`].
//!
//! The ESP32 timer groups expose four 64-bit timers with programmable
//! prescale and alarm interrupts. One track uses two of them: the
//! auto-reload full-cycle timer and the one-shot pulse timer. The divider
//! is fixed at 80 so one tick equals one microsecond on the stock 80 MHz
//! APB clock, which lets the interrupt bodies write bit durations into
//! the alarm registers directly.

use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::sys::EspError;
use esp_idf_hal::timer::{config::Config, Timer, TimerDriver};

use crate::traits::SignalTimer;

/// Timer prescale: 80 MHz APB clock divided down to 1 MHz, one tick per
/// microsecond.
pub const DCC_TIMER_DIVIDER: u32 = 80;

/// One hardware alarm timer of the DCC waveform pair.
///
/// # Example
///
/// ```ignore
/// use esp_idf_hal::peripherals::Peripherals;
/// use rs_dcc::hal::esp32::Esp32SignalTimer;
///
/// let peripherals = Peripherals::take()?;
/// // Full-cycle timer reloads every bit; the pulse timer is one-shot.
/// let full_cycle = Esp32SignalTimer::new(peripherals.timer00, true)?;
/// let pulse = Esp32SignalTimer::new(peripherals.timer01, false)?;
/// ```
pub struct Esp32SignalTimer<'d> {
    driver: TimerDriver<'d>,
}

impl<'d> Esp32SignalTimer<'d> {
    /// Creates a signal timer over one hardware timer peripheral.
    ///
    /// `auto_reload` selects full-cycle behaviour (the counter wraps to
    /// zero when the alarm fires) versus one-shot pulse behaviour.
    ///
    /// # Errors
    ///
    /// Returns an error if the timer peripheral cannot be initialised.
    pub fn new<T: Timer>(
        timer: impl Peripheral<P = T> + 'd,
        auto_reload: bool,
    ) -> Result<Self, EspError> {
        let config = Config::new().divider(DCC_TIMER_DIVIDER).auto_reload(auto_reload);
        Ok(Self {
            driver: TimerDriver::new(timer, &config)?,
        })
    }

    /// Attaches the interrupt callback for this timer.
    ///
    /// # Safety
    ///
    /// The callback runs in interrupt context: it must not block,
    /// allocate or call into non-ISR-safe ESP-IDF APIs, and everything it
    /// captures must stay alive until [`unsubscribe`](Self::unsubscribe)
    /// or the end of the program.
    pub unsafe fn subscribe(
        &mut self,
        callback: impl FnMut() + Send + 'static,
    ) -> Result<(), EspError> {
        self.driver.subscribe(callback)
    }

    /// Detaches the interrupt callback.
    pub fn unsubscribe(&mut self) -> Result<(), EspError> {
        self.driver.unsubscribe()
    }
}

impl SignalTimer for Esp32SignalTimer<'_> {
    type Error = EspError;

    fn arm(&mut self) -> Result<(), EspError> {
        self.driver.set_counter(0)?;
        self.driver.enable_interrupt()?;
        self.driver.enable_alarm(true)?;
        self.driver.enable(true)?;
        Ok(())
    }

    fn disarm(&mut self) -> Result<(), EspError> {
        self.driver.enable(false)?;
        self.driver.enable_alarm(false)?;
        self.driver.disable_interrupt()?;
        Ok(())
    }

    fn set_alarm_us(&mut self, us: u64) {
        // One tick is one microsecond at the fixed divider. Alarm writes
        // cannot meaningfully fail once the driver exists; the interrupt
        // contract forbids propagating here.
        let _ = self.driver.set_alarm(us);
    }

    fn restart(&mut self) {
        let _ = self.driver.set_counter(0);
        let _ = self.driver.enable_alarm(true);
    }
}
