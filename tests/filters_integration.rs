//! Integration tests for the denoising path
//!
//! Tests the full path: raw channel reads → majority vote / range gate / EMA → snapshot

use handover::config::FilterConfig;
use handover::core::filters::{majority, Ema, JumpReject, TelemetryFilter};
use handover::core::{read_snapshot, MemoryChannel, SignalChannel};
use handover::types::{names, Position};

fn bits(samples: &[u8]) -> Vec<bool> {
    samples.iter().map(|s| *s == 1).collect()
}

#[test]
fn test_majority_examples() {
    assert!(majority(bits(&[1, 1, 1, 0, 0])));
    assert!(!majority(bits(&[1, 1, 0, 0, 0])));
}

#[test]
fn test_presence_vote_through_channel() {
    let mut channel = MemoryChannel::new();
    assert!(channel.connect());

    channel.queue_ints(names::OBJECT_EXISTS[0], [1, 1, 1, 0, 0]);
    channel.queue_ints(names::OBJECT_EXISTS[1], [1, 1, 0, 0, 0]);
    channel.queue_ints(names::OBJECT_EXISTS[2], [0, 0, 0, 0, 1]);

    let snapshot = read_snapshot(&mut channel, 5).unwrap();
    assert_eq!(snapshot.objects, [true, false, false]);
}

#[test]
fn test_ema_converges() {
    let mut ema = Ema::new(0.2);
    ema.update(0.0);
    let mut value = 0.0;
    for _ in 0..200 {
        value = ema.update(42.0);
    }
    assert!((value - 42.0).abs() < 1e-9);
}

#[test]
fn test_telemetry_stream() {
    let mut filter = TelemetryFilter::new(&FilterConfig::default());

    // Glitches before the first valid reading are ignored
    assert_eq!(filter.apply(0.0, 0.0), None);
    assert_eq!(filter.apply(120.0, 5.0), None);

    let first = filter.apply(30.0, 10.0).unwrap();
    assert_eq!((first.y, first.proximity), (30.0, 10.0));

    let second = filter.apply(40.0, 10.0).unwrap();
    assert!((second.y - 32.0).abs() < 1e-12);

    // Out-of-range proximity: held
    assert_eq!(filter.apply(40.0, 25.0), Some(second));

    filter.reset();
    assert_eq!(filter.current(), None);
}

#[test]
fn test_jump_reject_hold_is_exact() {
    let mut filter = JumpReject::new(0.9);
    let accepted = Position::new(0.1, 0.2, 0.3);
    assert_eq!(filter.filter(accepted), accepted);

    for spike in [
        Position::new(1.5, 0.2, 0.3),
        Position::new(0.1, -2.0, 0.3),
        Position::new(-5.0, 5.0, 5.0),
    ] {
        assert_eq!(filter.filter(spike), accepted);
    }

    let small = Position::new(0.5, 0.2, 0.3);
    assert_eq!(filter.filter(small), small);
}
