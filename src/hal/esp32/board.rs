//! Motor-shield current sensing via the ESP32 ADC.
//!
//! The motor shields expose a current-sense output voltage proportional
//! to track current. This module reads it through a oneshot ADC1 channel
//! at 11 dB attenuation (full 0-3.3 V range, 12-bit counts), which is
//! what the service-mode ACK threshold arithmetic assumes.

use esp_idf_hal::adc::attenuation::DB_11;
use esp_idf_hal::adc::oneshot::config::AdcChannelConfig;
use esp_idf_hal::adc::oneshot::{AdcChannelDriver, AdcDriver};
use esp_idf_hal::gpio::ADCPin;
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::sys::EspError;

use crate::traits::MotorBoard;

/// One motor shield's identity, rating and current-sense channel.
///
/// # Example
///
/// ```ignore
/// use esp_idf_hal::adc::oneshot::AdcDriver;
/// use esp_idf_hal::peripherals::Peripherals;
/// use rs_dcc::hal::esp32::Esp32MotorBoard;
///
/// let peripherals = Peripherals::take()?;
/// let adc1 = AdcDriver::new(peripherals.adc1)?;
/// let prog = Esp32MotorBoard::new("PROG", 2000, &adc1, peripherals.pins.gpio39)?;
/// ```
pub struct Esp32MotorBoard<'d, P: ADCPin> {
    name: &'static str,
    max_milliamps: u32,
    channel: AdcChannelDriver<'d, P, &'d AdcDriver<'d, P::Adc>>,
}

impl<'d, P: ADCPin> Esp32MotorBoard<'d, P> {
    /// Creates a board over its current-sense ADC channel.
    ///
    /// # Arguments
    ///
    /// * `name` - Board name, `"OPS"` or `"PROG"` on stock wiring
    /// * `max_milliamps` - Shield current rating in milliamps
    /// * `adc` - Shared ADC1 driver (must outlive this struct)
    /// * `sense_pin` - Current-sense GPIO (typically GPIO36 or GPIO39)
    ///
    /// # Errors
    ///
    /// Returns an error if ADC channel initialisation fails.
    pub fn new(
        name: &'static str,
        max_milliamps: u32,
        adc: &'d AdcDriver<'d, P::Adc>,
        sense_pin: impl Peripheral<P = P> + 'd,
    ) -> Result<Self, EspError> {
        let config = AdcChannelConfig {
            attenuation: DB_11,
            ..Default::default()
        };
        let channel = AdcChannelDriver::new(adc, sense_pin, &config)?;
        Ok(Self {
            name,
            max_milliamps,
            channel,
        })
    }
}

impl<P: ADCPin> MotorBoard for Esp32MotorBoard<'_, P> {
    fn name(&self) -> &str {
        self.name
    }

    fn max_milliamps(&self) -> u32 {
        self.max_milliamps
    }

    fn sample_current_raw(&mut self) -> u16 {
        // Failed conversions read as zero and are discarded upstream.
        self.channel.read().unwrap_or(0)
    }
}
