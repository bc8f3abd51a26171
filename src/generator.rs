//! Packet pool and the foreground handle of a signal generator.
//!
//! Each track owns a fixed [`PacketPool`]: every packet slot the track will
//! ever use is allocated up front and recycled for the lifetime of the base
//! station. Two lock-free single-producer/single-consumer rings run over
//! the pool: the **free list** (interrupt side produces, foreground
//! consumes) and the **to-send queue** (foreground produces, interrupt side
//! consumes). [`SignalGenerator::configure`] splits a pool into the
//! foreground [`SignalGenerator`] handle and the interrupt-side
//! [`Bitstream`], which [`WaveformDriver`](crate::waveform::WaveformDriver)
//! then binds to the hardware timers.
//!
//! Backpressure is built in: when the free list is momentarily empty,
//! [`load_packet`](SignalGenerator::load_packet) polls in short slices
//! until the interrupt side returns a slot. There is no failure mode for a
//! saturated queue while the track is running.
//!
//! # Example
//!
//! ```rust
//! use rs_dcc::config::TrackConfig;
//! use rs_dcc::generator::{PacketPool, SignalGenerator};
//! use rs_dcc::hal::MockDelay;
//!
//! let mut pool: PacketPool<65> = PacketPool::new();
//! let (mut track, _stream) = SignalGenerator::configure(&mut pool, &TrackConfig::prog());
//!
//! let mut delay = MockDelay::new();
//! track.load_packet(&mut delay, &[0xFF, 0x00], 10).unwrap();
//! assert!(!track.queue_empty());
//! ```

use heapless::spsc::{Consumer, Producer, Queue};
use log::{debug, info, trace};

use crate::config::{TrackConfig, TrackName};
use crate::packet::{EncodingError, Packet};
use crate::traits::Delay;
use crate::waveform::{Bitstream, IDLE_PAYLOAD, RESET_PAYLOAD};

/// Poll slice while waiting for a free packet slot.
pub const FREE_SLOT_POLL_MS: u32 = 2;

/// Poll slice while waiting for the to-send queue to drain.
pub const QUEUE_POLL_MS: u32 = 10;

/// Extra reset transmissions injected by the startup sequence
/// (S-9.2.4 section A requires at least 20 on the wire).
pub const STARTUP_RESET_REPEATS: u8 = 20;

/// Extra idle transmissions injected by the startup sequence.
pub const STARTUP_IDLE_REPEATS: u8 = 10;

/// Packet slots in the stock operations-track pool.
pub const OPS_POOL_SLOTS: usize = 512;

/// Packet slots in the stock programming-track pool.
pub const PROG_POOL_SLOTS: usize = 64;

/// Fixed packet storage for one track.
///
/// `N` is the ring storage size of each queue; the usable pool depth is
/// `N - 1` slots (one ring element stays empty to distinguish full from
/// empty). Use the [`OpsPacketPool`] and [`ProgPacketPool`] aliases for the
/// stock 512/64-slot configurations.
///
/// A pool is plain storage with a `const` constructor, so it can live in a
/// `static` on embedded targets or on the stack in tests.
pub struct PacketPool<const N: usize> {
    to_send: Queue<Packet, N>,
    free: Queue<Packet, N>,
}

/// 512-slot pool for the operations track.
pub type OpsPacketPool = PacketPool<{ OPS_POOL_SLOTS + 1 }>;

/// 64-slot pool for the programming track.
pub type ProgPacketPool = PacketPool<{ PROG_POOL_SLOTS + 1 }>;

impl<const N: usize> PacketPool<N> {
    /// Creates an empty pool.
    pub const fn new() -> Self {
        Self {
            to_send: Queue::new(),
            free: Queue::new(),
        }
    }
}

impl<const N: usize> Default for PacketPool<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Foreground handle of one track's signal generator.
///
/// The handle is the single foreground writer for its track: it draws
/// zeroed slots from the free list, frames payloads into them and pushes
/// them onto the to-send queue in strict FIFO order. Higher layers must
/// serialise their own access; the interrupt side is the only other party
/// and touches the opposite end of each ring.
pub struct SignalGenerator<'a, const N: usize> {
    name: TrackName,
    to_send: Producer<'a, Packet, N>,
    free: Consumer<'a, Packet, N>,
}

impl<'a, const N: usize> SignalGenerator<'a, N> {
    /// Fills `pool`'s free list with zeroed slots and splits it into the
    /// foreground handle and the interrupt-side bitstream.
    ///
    /// The direction GPIO named by `config` is owned by the platform
    /// layer; see [`WaveformDriver`](crate::waveform::WaveformDriver) for
    /// how the bitstream gets bound to timers and pin.
    pub fn configure(
        pool: &'a mut PacketPool<N>,
        config: &TrackConfig,
    ) -> (Self, Bitstream<'a, N>) {
        while pool.free.enqueue(Packet::default()).is_ok() {}
        info!(
            "[{}] pool configured, {} packet slots",
            config.name(),
            pool.free.len()
        );

        let (to_send_prod, to_send_cons) = pool.to_send.split();
        let (free_prod, free_cons) = pool.free.split();

        let generator = Self {
            name: config.name_owned(),
            to_send: to_send_prod,
            free: free_cons,
        };
        (generator, Bitstream::new(to_send_cons, free_prod))
    }

    /// Track name, for diagnostics.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Frames `payload` into a pool slot and queues it for transmission.
    ///
    /// `repeats` is the number of extra transmissions after the first.
    /// When the free list is empty the call blocks in
    /// [`FREE_SLOT_POLL_MS`] slices until the interrupt side returns a
    /// slot; with the track stopped and the pool exhausted it would wait
    /// forever, so only load while the track runs (or within pool depth).
    ///
    /// # Errors
    ///
    /// [`EncodingError::PayloadLength`] for payloads outside 1..=5 bytes;
    /// nothing is dequeued or sent in that case.
    pub fn load_packet(
        &mut self,
        delay: &mut impl Delay,
        payload: &[u8],
        repeats: u8,
    ) -> Result<(), EncodingError> {
        Packet::check_payload(payload)?;
        debug!(
            "[{}] preparing {} byte packet, {} repeats [{} in queue]",
            self.name,
            payload.len(),
            repeats,
            self.to_send.len()
        );

        let mut packet = loop {
            match self.free.dequeue() {
                Some(slot) => break slot,
                None => delay.delay_ms(FREE_SLOT_POLL_MS),
            }
        };
        packet.fill(payload, repeats);
        trace!(
            "[{}] <* {:02x?} / {} / {}>",
            self.name,
            &packet.raw_bytes()[..usize::from(packet.len_bits() + 7) / 8],
            packet.len_bits(),
            repeats
        );
        // Always fits: the to-send ring is as deep as the pool itself.
        let _ = self.to_send.enqueue(packet);
        Ok(())
    }

    /// Injects the power-up sequence required by S-9.2.4 section A: at
    /// least 20 reset packets then at least 10 idle packets, forcing any
    /// attached decoder out of a residual service mode. Call before the
    /// waveform driver is started so the sequence leads the stream.
    pub fn send_startup_sequence(
        &mut self,
        delay: &mut impl Delay,
    ) -> Result<(), EncodingError> {
        info!("[{}] queueing startup reset packets", self.name);
        self.load_packet(delay, &RESET_PAYLOAD, STARTUP_RESET_REPEATS)?;
        info!("[{}] queueing startup idle packets", self.name);
        self.load_packet(delay, &IDLE_PAYLOAD, STARTUP_IDLE_REPEATS)?;
        Ok(())
    }

    /// True when the to-send queue holds no packets. The active packet may
    /// still be transmitting its repeats.
    pub fn queue_empty(&self) -> bool {
        self.to_send.len() == 0
    }

    /// Number of packets waiting in the to-send queue.
    pub fn queue_len(&self) -> usize {
        self.to_send.len()
    }

    /// True when every pool slot is back on the free list, i.e. nothing is
    /// queued and nothing but the idle packet can be transmitting.
    pub fn pool_full(&self) -> bool {
        self.free.len() == self.free.capacity()
    }

    /// Blocks until everything queued has been fully transmitted,
    /// including repeats, polling in [`QUEUE_POLL_MS`] slices.
    ///
    /// Returning only once the free list is full again (not merely once
    /// the queue is empty) guarantees the last packet's final repeat has
    /// left the wire before the caller proceeds, which service-mode ACK
    /// sampling depends on.
    pub fn wait_queue_empty(&self, delay: &mut impl Delay) {
        while !(self.queue_empty() && self.pool_full()) {
            debug!(
                "[{}] waiting for {} packets to send",
                self.name,
                self.to_send.len()
            );
            delay.delay_ms(QUEUE_POLL_MS);
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate alloc;

    use super::*;
    use crate::hal::MockDelay;

    fn configure<const N: usize>(pool: &mut PacketPool<N>) -> (SignalGenerator<'_, N>, Bitstream<'_, N>) {
        SignalGenerator::configure(pool, &TrackConfig::ops())
    }

    #[test]
    fn configure_fills_free_list() {
        let mut pool: PacketPool<8> = PacketPool::new();
        let (track, _stream) = configure(&mut pool);
        assert!(track.pool_full());
        assert!(track.queue_empty());
        assert_eq!(track.name(), "OPS");
    }

    #[test]
    fn load_packet_moves_slot_to_queue() {
        let mut pool: PacketPool<8> = PacketPool::new();
        let (mut track, _stream) = configure(&mut pool);
        let mut delay = MockDelay::new();

        track.load_packet(&mut delay, &[0xFF, 0x00], 0).unwrap();
        assert_eq!(track.queue_len(), 1);
        assert!(!track.pool_full());
    }

    #[test]
    fn load_packet_rejects_bad_payload_without_consuming_a_slot() {
        let mut pool: PacketPool<8> = PacketPool::new();
        let (mut track, _stream) = configure(&mut pool);
        let mut delay = MockDelay::new();

        assert_eq!(
            track.load_packet(&mut delay, &[], 0),
            Err(EncodingError::PayloadLength(0))
        );
        assert_eq!(
            track.load_packet(&mut delay, &[0u8; 6], 0),
            Err(EncodingError::PayloadLength(6))
        );
        assert!(track.pool_full());
        assert!(track.queue_empty());
    }

    #[test]
    fn queue_is_fifo() {
        let mut pool: PacketPool<8> = PacketPool::new();
        let (mut track, mut stream) = configure(&mut pool);
        let mut delay = MockDelay::new();

        track.load_packet(&mut delay, &[0x00, 0x00], 0).unwrap();
        track.load_packet(&mut delay, &[0xFF, 0x00], 0).unwrap();

        // Data region of the first emitted frame must be the reset
        // packet's all-zero bits.
        let first_frame: alloc::vec::Vec<bool> =
            (0..49).map(|_| stream.next_bit() == crate::waveform::DccBit::One).collect();
        assert!(first_frame[22..].iter().all(|&b| !b));
    }

    #[test]
    fn startup_sequence_counts() {
        let mut pool: PacketPool<8> = PacketPool::new();
        let (mut track, mut stream) = configure(&mut pool);
        let mut delay = MockDelay::new();

        track.send_startup_sequence(&mut delay).unwrap();
        assert_eq!(track.queue_len(), 2);

        // 21 reset transmissions then 11 idle transmissions, 49 bits each.
        let mut frames = alloc::vec::Vec::new();
        for _ in 0..32 {
            let frame: alloc::vec::Vec<bool> =
                (0..49).map(|_| stream.next_bit() == crate::waveform::DccBit::One).collect();
            frames.push(frame);
        }
        for frame in &frames[..21] {
            assert!(frame[22..].iter().all(|&b| !b), "reset frame expected");
        }
        for frame in &frames[21..] {
            // Idle packet data region starts with 0 then 0xFF.
            assert!(!frame[22]);
            assert!(frame[23..31].iter().all(|&b| b), "idle frame expected");
        }
    }

    /// Delay that runs a closure instead of sleeping, so tests can pump
    /// the interrupt side while the foreground blocks.
    struct FnDelay<F: FnMut(u32)> {
        hook: F,
        total_ms: u64,
    }

    impl<F: FnMut(u32)> FnDelay<F> {
        fn new(hook: F) -> Self {
            Self { hook, total_ms: 0 }
        }
    }

    impl<F: FnMut(u32)> Delay for FnDelay<F> {
        fn delay_ms(&mut self, ms: u32) {
            self.total_ms += u64::from(ms);
            (self.hook)(ms);
        }
    }

    #[test]
    fn backpressure_polls_until_slot_returns() {
        let mut pool: PacketPool<4> = PacketPool::new();
        let (mut track, mut stream) = configure(&mut pool);
        let mut delay = MockDelay::new();

        // Exhaust the 3-slot pool.
        for _ in 0..3 {
            track.load_packet(&mut delay, &[0x00, 0x00], 0).unwrap();
        }
        assert_eq!(delay.total_ms(), 0);

        // Each poll slice pumps one full frame plus the retiring tick, so
        // a slot comes back while load_packet is blocked.
        let mut pump = FnDelay::new(|_| {
            for _ in 0..50 {
                stream.next_bit();
            }
        });
        track.load_packet(&mut pump, &[0x00, 0x00], 0).unwrap();
        assert!(pump.total_ms >= u64::from(FREE_SLOT_POLL_MS));
    }

    #[test]
    fn wait_queue_empty_returns_once_pool_is_full_again() {
        let mut pool: PacketPool<4> = PacketPool::new();
        let (mut track, mut stream) = configure(&mut pool);
        let mut delay = MockDelay::new();

        track.load_packet(&mut delay, &[0xFF, 0x00], 1).unwrap();

        let mut pump = FnDelay::new(|_| {
            stream.next_bit();
        });
        track.wait_queue_empty(&mut pump);
        assert!(track.queue_empty());
        assert!(track.pool_full());
    }
}
