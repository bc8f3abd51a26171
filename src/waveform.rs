//! Bit-level waveform generation: the interrupt-side half of a track.
//!
//! Each track runs two cascaded timer interrupts. The full-cycle interrupt
//! fires once per transmitted bit: it asks the [`Bitstream`] for the next
//! bit, reprograms both timer alarms with that bit's durations, rearms the
//! pulse timer and raises the direction pin. The pulse interrupt fires once
//! at the bit midpoint and drops the pin. Together they produce the NMRA
//! bipolar waveform: 58/58 µs halves for a one, 98/98 µs halves for a zero.
//!
//! [`Bitstream`] owns the consuming end of the to-send queue and the
//! producing end of the free list, plus the dedicated idle packet that
//! keeps the track alive when nothing is queued. [`WaveformDriver`] binds a
//! bitstream to the two hardware timers and the direction pin; its
//! [`on_full_cycle`](WaveformDriver::on_full_cycle) and
//! [`on_pulse`](WaveformDriver::on_pulse) methods are the interrupt
//! bodies, kept free of blocking calls, allocation and locks.

use heapless::spsc::{Consumer, Producer};
use log::info;

use crate::packet::Packet;
use crate::traits::{Delay, SignalTimer, TrackPin};

/// Total duration of a `0` bit in microseconds.
pub const ZERO_BIT_TOTAL_US: u64 = 196;
/// Half-wave pulse duration of a `0` bit in microseconds.
pub const ZERO_BIT_PULSE_US: u64 = 98;
/// Total duration of a `1` bit in microseconds.
pub const ONE_BIT_TOTAL_US: u64 = 116;
/// Half-wave pulse duration of a `1` bit in microseconds.
pub const ONE_BIT_PULSE_US: u64 = 58;

/// How long `stop` waits after disarming the timers before draining the
/// queues, so an in-flight interrupt can finish.
pub const STOP_QUIESCE_MS: u32 = 250;

/// Idle packet payload, transmitted whenever the to-send queue is empty.
pub const IDLE_PAYLOAD: [u8; 2] = [0xFF, 0x00];
/// Reset packet payload, returning decoders to a neutral state.
pub const RESET_PAYLOAD: [u8; 2] = [0x00, 0x00];

/// One DCC bit value with its on-wire timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DccBit {
    /// A zero bit: 98 µs high, 98 µs low.
    Zero,
    /// A one bit: 58 µs high, 58 µs low.
    One,
}

impl DccBit {
    /// Full bit-cell duration in microseconds.
    #[inline]
    pub const fn total_us(self) -> u64 {
        match self {
            DccBit::Zero => ZERO_BIT_TOTAL_US,
            DccBit::One => ONE_BIT_TOTAL_US,
        }
    }

    /// High half-wave duration in microseconds.
    #[inline]
    pub const fn pulse_us(self) -> u64 {
        match self {
            DccBit::Zero => ZERO_BIT_PULSE_US,
            DccBit::One => ONE_BIT_PULSE_US,
        }
    }
}

impl From<bool> for DccBit {
    #[inline]
    fn from(level: bool) -> Self {
        if level {
            DccBit::One
        } else {
            DccBit::Zero
        }
    }
}

/// What the bitstream is currently shifting out.
enum Active {
    /// Nothing installed; the next tick picks a packet.
    None,
    /// A packet drawn from the to-send queue.
    Pool(Packet),
    /// The dedicated idle packet.
    Idle,
}

/// The interrupt-side packet cursor for one track.
///
/// Exactly one interrupt context owns a `Bitstream`; the matching
/// foreground handle is the
/// [`SignalGenerator`](crate::generator::SignalGenerator) produced by the
/// same `configure` call. All queue traffic between the two goes through
/// lock-free single-producer/single-consumer rings, so neither side ever
/// blocks the other.
pub struct Bitstream<'a, const N: usize> {
    to_send: Consumer<'a, Packet, N>,
    free: Producer<'a, Packet, N>,
    active: Active,
    idle: Packet,
}

impl<'a, const N: usize> Bitstream<'a, N> {
    pub(crate) fn new(to_send: Consumer<'a, Packet, N>, free: Producer<'a, Packet, N>) -> Self {
        // The idle payload is a compile-time constant, so framing it
        // cannot fail.
        let idle = Packet::encode(&IDLE_PAYLOAD, 0).unwrap_or_default();
        Self {
            to_send,
            free,
            active: Active::None,
            idle,
        }
    }

    /// Produces the next bit to put on the wire.
    ///
    /// Retires the active packet once its bits and repeats are spent
    /// (returning pool packets to the free list zeroed), pulls the next
    /// packet from the to-send queue, and falls back to the idle packet
    /// when the queue is empty.
    pub fn next_bit(&mut self) -> DccBit {
        self.retire_finished();
        if matches!(self.active, Active::None) {
            self.active = match self.to_send.dequeue() {
                Some(packet) => Active::Pool(packet),
                None => {
                    self.idle.rewind();
                    Active::Idle
                }
            };
        }
        let packet = match &mut self.active {
            Active::Pool(packet) => packet,
            Active::Idle | Active::None => &mut self.idle,
        };
        DccBit::from(packet.next_bit())
    }

    fn retire_finished(&mut self) {
        let finished = match &self.active {
            Active::Pool(packet) => packet.exhausted(),
            Active::Idle => self.idle.exhausted(),
            Active::None => false,
        };
        if !finished {
            return;
        }
        match core::mem::replace(&mut self.active, Active::None) {
            Active::Pool(mut packet) => {
                if packet.repeats_remaining() > 0 {
                    packet.consume_repeat();
                    self.active = Active::Pool(packet);
                } else {
                    packet.clear();
                    // Always fits: the free list is sized to hold every
                    // pool packet.
                    let _ = self.free.enqueue(packet);
                }
            }
            Active::Idle | Active::None => {}
        }
    }

    /// True while the idle packet is the one being transmitted.
    pub fn idle_active(&self) -> bool {
        matches!(self.active, Active::Idle)
    }

    /// Moves the active packet and everything still queued back to the
    /// free list, zeroing each slot. Called by `stop` after the timers are
    /// quiescent.
    fn drain(&mut self) {
        if let Active::Pool(mut packet) = core::mem::replace(&mut self.active, Active::None) {
            packet.clear();
            let _ = self.free.enqueue(packet);
        }
        while let Some(mut packet) = self.to_send.dequeue() {
            packet.clear();
            let _ = self.free.enqueue(packet);
        }
        self.idle.rewind();
    }
}

/// Binds a [`Bitstream`] to its two hardware timers and direction pin.
///
/// `T` is instantiated twice, as the auto-reload full-cycle timer and the
/// one-shot pulse timer. The driver is handed to the platform's interrupt
/// attachment; on desktop and in tests the interrupt bodies are simply
/// called in a loop.
///
/// # Example
///
/// ```rust
/// use rs_dcc::config::TrackConfig;
/// use rs_dcc::generator::{PacketPool, SignalGenerator};
/// use rs_dcc::hal::{MockDelay, MockSignalTimer, MockTrackPin};
/// use rs_dcc::waveform::{DccBit, WaveformDriver};
///
/// let mut pool: PacketPool<65> = PacketPool::new();
/// let (mut track, stream) = SignalGenerator::configure(&mut pool, &TrackConfig::prog());
/// let mut driver = WaveformDriver::new(
///     stream,
///     MockSignalTimer::new(),
///     MockSignalTimer::new(),
///     MockTrackPin::new(),
/// );
/// driver.start().unwrap();
///
/// track
///     .load_packet(&mut MockDelay::new(), &[0x03, 0x3F, 0x00], 0)
///     .unwrap();
/// // First bit of the queued packet is a preamble one.
/// assert_eq!(driver.on_full_cycle(), DccBit::One);
/// ```
pub struct WaveformDriver<'a, T: SignalTimer, P: TrackPin, const N: usize> {
    stream: Bitstream<'a, N>,
    full_cycle: T,
    pulse: T,
    pin: P,
}

impl<'a, T: SignalTimer, P: TrackPin, const N: usize> WaveformDriver<'a, T, P, N> {
    /// Creates a driver over an already-configured bitstream. The pin must
    /// arrive configured as an output driven low.
    pub fn new(stream: Bitstream<'a, N>, full_cycle: T, pulse: T, pin: P) -> Self {
        Self {
            stream,
            full_cycle,
            pulse,
            pin,
        }
    }

    /// Programs the initial alarms and arms both timers. The first
    /// full-cycle interrupt fires one one-bit period later and begins
    /// streaming queued packets.
    ///
    /// # Errors
    ///
    /// Propagates timer failures; the track stays stopped.
    pub fn start(&mut self) -> Result<(), T::Error> {
        self.full_cycle.set_alarm_us(ONE_BIT_TOTAL_US);
        self.pulse.set_alarm_us(ONE_BIT_PULSE_US);
        self.full_cycle.arm()?;
        self.pulse.arm()?;
        info!("signal timers armed");
        Ok(())
    }

    /// Full-cycle interrupt body: fetches the next bit, reprograms both
    /// alarms for its durations, rearms the pulse timer and raises the
    /// direction pin. Returns the emitted bit.
    pub fn on_full_cycle(&mut self) -> DccBit {
        let bit = self.stream.next_bit();
        self.full_cycle.set_alarm_us(bit.total_us());
        self.pulse.set_alarm_us(bit.pulse_us());
        self.pulse.restart();
        self.pin.set_high();
        bit
    }

    /// Pulse interrupt body: drops the direction pin at the bit midpoint.
    #[inline]
    pub fn on_pulse(&mut self) {
        self.pin.set_low();
    }

    /// Disarms both timers, drives the track low, waits out any in-flight
    /// interrupt and drains unsent packets back to the free list, zeroing
    /// each slot.
    ///
    /// # Errors
    ///
    /// Propagates timer teardown failures. The quiescence wait and drain
    /// still run, so the pool stays intact.
    pub fn stop(&mut self, delay: &mut impl Delay) -> Result<(), T::Error> {
        let full = self.full_cycle.disarm();
        let pulse = self.pulse.disarm();
        self.pin.set_low();
        // Let a timer callback that was already dispatched run to
        // completion before foreground touches the queues.
        delay.delay_ms(STOP_QUIESCE_MS);
        self.stream.drain();
        info!("signal timers stopped, queue drained");
        full?;
        pulse?;
        Ok(())
    }

    /// The underlying bitstream, for inspection.
    pub fn stream(&self) -> &Bitstream<'a, N> {
        &self.stream
    }

    /// The full-cycle timer, for platform interrupt attachment.
    pub fn full_cycle_timer_mut(&mut self) -> &mut T {
        &mut self.full_cycle
    }

    /// The pulse timer, for platform interrupt attachment.
    pub fn pulse_timer_mut(&mut self) -> &mut T {
        &mut self.pulse
    }

    /// The direction pin, for inspection.
    pub fn pin(&self) -> &P {
        &self.pin
    }
}
