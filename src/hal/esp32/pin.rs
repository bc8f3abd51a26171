//! ESP32 GPIO implementation of [`TrackPin`].

use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::sys::EspError;

use crate::traits::TrackPin;

/// Track direction output on an ESP32 GPIO.
///
/// # Example
///
/// ```ignore
/// use esp_idf_hal::gpio::AnyOutputPin;
/// use esp_idf_hal::peripherals::Peripherals;
/// use rs_dcc::hal::esp32::Esp32TrackPin;
///
/// let peripherals = Peripherals::take()?;
/// let pin = Esp32TrackPin::new(AnyOutputPin::from(peripherals.pins.gpio19))?;
/// ```
pub struct Esp32TrackPin<'d> {
    pin: PinDriver<'d, AnyOutputPin, Output>,
}

impl<'d> Esp32TrackPin<'d> {
    /// Configures the GPIO as an output driven low, so the track stays
    /// unpowered until the waveform timers start.
    ///
    /// # Errors
    ///
    /// Returns an error if the pin cannot be configured as an output.
    pub fn new(pin: impl Peripheral<P = AnyOutputPin> + 'd) -> Result<Self, EspError> {
        let mut pin = PinDriver::output(pin)?;
        pin.set_low()?;
        Ok(Self { pin })
    }
}

impl TrackPin for Esp32TrackPin<'_> {
    fn set_high(&mut self) {
        // GPIO level writes do not fail on an initialised output; the
        // interrupt contract forbids propagating here.
        let _ = self.pin.set_high();
    }

    fn set_low(&mut self) {
        let _ = self.pin.set_low();
    }
}
