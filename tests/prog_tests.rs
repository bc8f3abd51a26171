//! Integration tests for service-mode programming against the decoder
//! simulator: the full read/write round trip over the simulated wire.

use std::cell::RefCell;
use std::rc::Rc;

use rs_dcc::config::{ServiceModeConfig, TrackConfig};
use rs_dcc::cv::CvError;
use rs_dcc::generator::{ProgPacketPool, SignalGenerator};
use rs_dcc::hal::{DccDecoder, MockMotorBoard, MockSignalTimer, MockTrackPin, PumpDelay};
use rs_dcc::prog::ServiceModeProgrammer;
use rs_dcc::waveform::WaveformDriver;

/// Motor-shield rating used across these tests; the matching ACK
/// threshold is (4096 * 60) / 2000 = 122 raw counts.
const SHIELD_MILLIAMPS: u32 = 2000;

type Sim<'a> = PumpDelay<'a, MockSignalTimer, MockTrackPin, 65>;

/// Wires a programming track through the bit pump to a shared decoder.
fn wire(
    pool: &mut ProgPacketPool,
    decoder: Rc<RefCell<DccDecoder>>,
) -> (SignalGenerator<'_, 65>, Sim<'_>) {
    let (track, stream) = SignalGenerator::configure(pool, &TrackConfig::prog());
    let driver = WaveformDriver::new(
        stream,
        MockSignalTimer::new(),
        MockSignalTimer::new(),
        MockTrackPin::new(),
    );
    (track, PumpDelay::new(driver, decoder))
}

/// A board whose readings follow the simulated decoder's ACK line.
fn hearing_board(decoder: &Rc<RefCell<DccDecoder>>) -> MockMotorBoard {
    MockMotorBoard::new("PROG", SHIELD_MILLIAMPS).with_decoder(decoder.clone())
}

/// A board that only ever reads quiescent current, as if the programming
/// track were empty.
fn deaf_board() -> MockMotorBoard {
    MockMotorBoard::new("PROG", SHIELD_MILLIAMPS)
}

/// Short sampling keeps the simulated half-second ACK windows cheap
/// while preserving the mean-over-samples decision logic.
fn quick() -> ServiceModeConfig {
    ServiceModeConfig::default()
        .with_sample_count(20)
        .with_sample_interval_ms(2)
}

// ============================================================================
// read_cv
// ============================================================================

#[test]
fn read_cv_recovers_a_preset_value() {
    let decoder = DccDecoder::shared();
    decoder.borrow_mut().set_cv(29, 0x2A);
    let mut pool = ProgPacketPool::new();
    let (mut track, mut sim) = wire(&mut pool, decoder.clone());

    let mut programmer =
        ServiceModeProgrammer::new(&mut track, hearing_board(&decoder), &mut sim, quick());
    assert_eq!(programmer.read_cv(29), Ok(0x2A));
}

#[test]
fn read_cv_of_an_all_zero_cv_still_verifies() {
    let decoder = DccDecoder::shared();
    let mut pool = ProgPacketPool::new();
    let (mut track, mut sim) = wire(&mut pool, decoder.clone());

    // No verify-bit round acks, but the byte-verify of zero does.
    let mut programmer =
        ServiceModeProgrammer::new(&mut track, hearing_board(&decoder), &mut sim, quick());
    assert_eq!(programmer.read_cv(7), Ok(0));
}

#[test]
fn read_cv_reads_the_top_bit() {
    let decoder = DccDecoder::shared();
    decoder.borrow_mut().set_cv(1, 0x80);
    let mut pool = ProgPacketPool::new();
    let (mut track, mut sim) = wire(&mut pool, decoder.clone());

    let mut programmer =
        ServiceModeProgrammer::new(&mut track, hearing_board(&decoder), &mut sim, quick());
    assert_eq!(programmer.read_cv(1), Ok(0x80));
}

#[test]
fn read_cv_without_a_decoder_fails_verification() {
    let decoder = DccDecoder::shared();
    let mut pool = ProgPacketPool::new();
    let (mut track, mut sim) = wire(&mut pool, decoder);

    let mut programmer = ServiceModeProgrammer::new(&mut track, deaf_board(), &mut sim, quick());
    assert_eq!(programmer.read_cv(7), Err(CvError::VerificationFailed));
}

#[test]
fn read_cv_emits_the_expected_verify_traffic() {
    let decoder = DccDecoder::shared();
    decoder.borrow_mut().set_cv(29, 0x06);
    let mut pool = ProgPacketPool::new();
    let (mut track, mut sim) = wire(&mut pool, decoder.clone());

    let mut programmer =
        ServiceModeProgrammer::new(&mut track, hearing_board(&decoder), &mut sim, quick());
    programmer.read_cv(29).unwrap();
    drop(programmer);

    let seen = decoder.borrow();
    let packets = seen.packets();
    // Each verify-bit round puts six copies of its instruction on the
    // wire (one transmission plus five repeats).
    let bit2 = packets
        .iter()
        .filter(|p| p.as_slice() == [0x78, 0x1C, 0xEA])
        .count();
    assert_eq!(bit2, 6);
    // The closing byte-verify carries the assembled value.
    assert!(packets.iter().any(|p| p.as_slice() == [0x74, 0x1C, 0x06]));
}

#[test]
fn read_cv_validates_the_cv_number() {
    let decoder = DccDecoder::shared();
    let mut pool = ProgPacketPool::new();
    let (mut track, mut sim) = wire(&mut pool, decoder.clone());

    let mut programmer =
        ServiceModeProgrammer::new(&mut track, hearing_board(&decoder), &mut sim, quick());
    assert_eq!(programmer.read_cv(0), Err(CvError::CvOutOfRange(0)));
    assert_eq!(programmer.read_cv(1025), Err(CvError::CvOutOfRange(1025)));
}

// ============================================================================
// write_cv_byte
// ============================================================================

#[test]
fn write_then_read_round_trip() {
    let decoder = DccDecoder::shared();
    let mut pool = ProgPacketPool::new();
    let (mut track, mut sim) = wire(&mut pool, decoder.clone());

    let mut programmer =
        ServiceModeProgrammer::new(&mut track, hearing_board(&decoder), &mut sim, quick());
    assert_eq!(programmer.write_cv_byte(3, 0x5A), Ok(()));
    assert_eq!(decoder.borrow().cv(3), 0x5A);
    assert_eq!(programmer.read_cv(3), Ok(0x5A));
}

#[test]
fn write_cv_byte_attempt_budget_is_visible_on_the_wire() {
    let decoder = DccDecoder::shared();
    let mut pool = ProgPacketPool::new();
    let (mut track, mut sim) = wire(&mut pool, decoder.clone());

    // Deaf board: the simulator decodes the traffic, but the samples
    // never reflect its ACKs, so every attempt fails.
    let config = quick().with_write_attempts(2);
    let mut programmer = ServiceModeProgrammer::new(&mut track, deaf_board(), &mut sim, config);
    assert_eq!(
        programmer.write_cv_byte(8, 0x01),
        Err(CvError::VerificationFailed)
    );
    drop(programmer);
    track.wait_queue_empty(&mut sim);

    let seen = decoder.borrow();
    // Two attempts, each putting five copies of the write instruction on
    // the wire (one transmission plus four repeats).
    let writes = seen
        .packets()
        .iter()
        .filter(|p| p.as_slice() == [0x7C, 0x07, 0x01])
        .count();
    assert_eq!(writes, 10);
}

#[test]
fn failed_write_leaves_reset_packets_on_the_wire() {
    let decoder = DccDecoder::shared();
    let mut pool = ProgPacketPool::new();
    let (mut track, mut sim) = wire(&mut pool, decoder.clone());

    let config = quick().with_write_attempts(1);
    let mut programmer = ServiceModeProgrammer::new(&mut track, deaf_board(), &mut sim, config);
    let _ = programmer.write_cv_byte(8, 0x01);
    drop(programmer);

    // The trailing decoder-reset batch is queued but unsent at return.
    assert!(!track.queue_empty());
    track.wait_queue_empty(&mut sim);
    let seen = decoder.borrow();
    assert!(seen.packets().iter().any(|p| p.as_slice() == [0x00, 0x00]));
}

// ============================================================================
// write_cv_bit
// ============================================================================

#[test]
fn write_cv_bit_reaches_the_decoder_store() {
    let decoder = DccDecoder::shared();
    decoder.borrow_mut().set_cv(29, 0x02);
    let mut pool = ProgPacketPool::new();
    let (mut track, mut sim) = wire(&mut pool, decoder.clone());

    let mut programmer =
        ServiceModeProgrammer::new(&mut track, hearing_board(&decoder), &mut sim, quick());
    // The write lands in the store regardless of how the confirmation
    // round fares against a strict decoder.
    let _ = programmer.write_cv_bit(29, 2, true);
    assert_eq!(decoder.borrow().cv(29), 0x06);

    // And the new value reads back over the wire.
    assert_eq!(programmer.read_cv(29), Ok(0x06));
}

#[test]
fn write_cv_bit_emits_write_and_confirmation_forms() {
    let decoder = DccDecoder::shared();
    let mut pool = ProgPacketPool::new();
    let (mut track, mut sim) = wire(&mut pool, decoder.clone());

    let config = quick().with_write_attempts(1);
    let mut programmer =
        ServiceModeProgrammer::new(&mut track, hearing_board(&decoder), &mut sim, config);
    let _ = programmer.write_cv_bit(29, 2, true);
    drop(programmer);
    track.wait_queue_empty(&mut sim);

    let seen = decoder.borrow();
    assert!(seen
        .packets()
        .iter()
        .any(|p| p.as_slice() == [0x78, 0x1C, 0xFA]));
    assert!(seen
        .packets()
        .iter()
        .any(|p| p.as_slice() == [0x74, 0x1C, 0xBA]));
}

#[test]
fn write_cv_bit_validates_arguments() {
    let decoder = DccDecoder::shared();
    let mut pool = ProgPacketPool::new();
    let (mut track, mut sim) = wire(&mut pool, decoder.clone());

    let mut programmer =
        ServiceModeProgrammer::new(&mut track, hearing_board(&decoder), &mut sim, quick());
    assert_eq!(
        programmer.write_cv_bit(29, 8, true),
        Err(CvError::BitOutOfRange(8))
    );
    assert_eq!(
        programmer.write_cv_bit(0, 1, true),
        Err(CvError::CvOutOfRange(0))
    );
}
