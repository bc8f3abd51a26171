//! ESP32 DCC base-station bring-up.
//!
//! This is the main entry point for the physical base station. It brings
//! up both tracks:
//! - OPS on timer00/timer01 with its direction signal on GPIO19
//! - PROG on timer10/timer11 with its direction signal on GPIO18
//!
//! Each track gets its packet pool, queues the mandatory power-up packet
//! sequence, binds its waveform driver to the hardware timer interrupts
//! and starts streaming. Once both tracks run, the station reads the
//! manufacturer and address CVs off the programming track as a smoke
//! test, then idles while the timers keep the rails alive.
//!
//! # Build
//!
//! ```bash
//! cargo build --release --features esp32 --bin esp32_station
//! ```

use esp_idf_hal::adc::oneshot::AdcDriver;
use esp_idf_hal::gpio::OutputPin;
use esp_idf_hal::peripherals::Peripherals;
use rs_dcc::config::{ServiceModeConfig, TrackConfig};
use rs_dcc::generator::{OpsPacketPool, PacketPool, ProgPacketPool, SignalGenerator};
use rs_dcc::hal::esp32::{Esp32Delay, Esp32MotorBoard, Esp32SignalTimer, Esp32TrackPin};
use rs_dcc::prog::ServiceModeProgrammer;
use rs_dcc::traits::Delay;
use rs_dcc::waveform::WaveformDriver;

/// Current rating of the stock motor shields in milliamps.
const SHIELD_MAX_MILLIAMPS: u32 = 2000;

/// One track's waveform driver with the pool queues leaked to `'static`,
/// as the timer interrupts outlive `main`'s stack frame.
type TrackDriver<const N: usize> =
    WaveformDriver<'static, Esp32SignalTimer<'static>, Esp32TrackPin<'static>, N>;

/// Raw driver pointer that the timer callbacks close over.
///
/// Carrying the pointer through a newtype lets the `Send` bound on the
/// interrupt subscription be satisfied explicitly rather than by
/// accident.
struct IsrHandle<const N: usize>(*mut TrackDriver<N>);

// Safety: the pointer targets a leaked driver that is never freed, and
// the single-writer discipline of the signal core guarantees the two
// interrupt bodies and foreground stop() never run concurrently on this
// single-core dispatch.
unsafe impl<const N: usize> Send for IsrHandle<N> {}

/// Leaks the driver and attaches both timer interrupt bodies to it.
fn bind_track<const N: usize>(
    driver: TrackDriver<N>,
) -> anyhow::Result<&'static mut TrackDriver<N>> {
    let driver = Box::leak(Box::new(driver));
    let ptr: *mut TrackDriver<N> = driver;
    let full = IsrHandle::<N>(ptr);
    let pulse = IsrHandle::<N>(ptr);

    // Safety: the callbacks only touch the driver's interrupt-safe
    // methods, and the handles outlive the subscriptions (the driver is
    // leaked).
    unsafe {
        driver.full_cycle_timer_mut().subscribe(move || {
            (*full.0).on_full_cycle();
        })?;
        driver.pulse_timer_mut().subscribe(move || {
            (*pulse.0).on_pulse();
        })?;
    }
    Ok(driver)
}

fn main() -> anyhow::Result<()> {
    esp_idf_hal::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    log::info!("rs-dcc base station starting");

    let peripherals = Peripherals::take()?;
    let mut delay = Esp32Delay::new();

    // =========================================================================
    // Operations track: timer00/timer01, GPIO19
    // =========================================================================
    let ops_pool: &'static mut OpsPacketPool = Box::leak(Box::new(PacketPool::new()));
    let (mut ops, ops_stream) = SignalGenerator::configure(ops_pool, &TrackConfig::ops());

    let ops_driver = bind_track(WaveformDriver::new(
        ops_stream,
        Esp32SignalTimer::new(peripherals.timer00, true)?,
        Esp32SignalTimer::new(peripherals.timer01, false)?,
        Esp32TrackPin::new(peripherals.pins.gpio19.downgrade_output())?,
    ))?;

    ops.send_startup_sequence(&mut delay)?;
    ops_driver.start()?;
    log::info!("[OPS] track started");

    // =========================================================================
    // Programming track: timer10/timer11, GPIO18
    // =========================================================================
    let prog_pool: &'static mut ProgPacketPool = Box::leak(Box::new(PacketPool::new()));
    let (mut prog, prog_stream) = SignalGenerator::configure(prog_pool, &TrackConfig::prog());

    let prog_driver = bind_track(WaveformDriver::new(
        prog_stream,
        Esp32SignalTimer::new(peripherals.timer10, true)?,
        Esp32SignalTimer::new(peripherals.timer11, false)?,
        Esp32TrackPin::new(peripherals.pins.gpio18.downgrade_output())?,
    ))?;

    prog.send_startup_sequence(&mut delay)?;
    prog_driver.start()?;
    log::info!("[PROG] track started");

    // =========================================================================
    // Smoke test: identify whatever sits on the programming track
    // =========================================================================
    let adc1 = AdcDriver::new(peripherals.adc1)?;
    let prog_board = Esp32MotorBoard::new(
        "PROG",
        SHIELD_MAX_MILLIAMPS,
        &adc1,
        peripherals.pins.gpio39,
    )?;

    let mut programmer = ServiceModeProgrammer::new(
        &mut prog,
        prog_board,
        Esp32Delay::new(),
        ServiceModeConfig::default(),
    );
    match programmer.read_cv(8) {
        Ok(manufacturer) => log::info!("[PROG] decoder manufacturer id {}", manufacturer),
        Err(err) => log::warn!("[PROG] no decoder identified: {}", err),
    }
    match programmer.read_cv(1) {
        Ok(address) => log::info!("[PROG] decoder short address {}", address),
        Err(err) => log::warn!("[PROG] address read failed: {}", err),
    }
    drop(programmer);

    // =========================================================================
    // Idle: the timers carry the rails from here
    // =========================================================================
    loop {
        delay.delay_ms(10_000);
        log::info!(
            "[OPS] {} queued / [PROG] {} queued",
            ops.queue_len(),
            prog.queue_len()
        );
    }
}
