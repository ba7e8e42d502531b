//! Background identifier thread lifecycle.
//!
//! Verifies that:
//! - the thread publishes one outcome once identification settles
//! - `finish` concludes with whatever was seen
//! - an outcome already read through `try_result` is still returned by `finish`
//! - dropping the handle mid-phase joins the thread without hanging

mod common;

use std::sync::Arc;
use std::time::Duration;

use vehid_core::{IdentifierThread, IdentifyCfg, MatchCfg, VehidError};
use vehid_traits::CanFrame;
use vehid_traits::clock::MonotonicClock;

fn cfg() -> IdentifyCfg {
    IdentifyCfg {
        matcher: MatchCfg {
            settle_frames: 2,
            ..MatchCfg::default()
        },
        read_timeout_ms: 10,
        ..IdentifyCfg::default()
    }
}

#[test]
fn publishes_outcome_after_settling() {
    let db = Arc::new(common::database());
    let mut worker = IdentifierThread::spawn(db, cfg(), MonotonicClock::new());
    for f in common::frames_of(&common::signature(3)) {
        assert!(worker.push(f));
    }
    worker.push(CanFrame::zeroed(0, 0x300, 4));
    worker.push(CanFrame::zeroed(0, 0x300, 4));

    let mut outcome = None;
    for _ in 0..200 {
        if let Some(o) = worker.try_result() {
            outcome = Some(o);
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    let ident = outcome.expect("outcome within 1s").expect("identified");
    assert_eq!(ident.candidate.identity.as_str(), "DELTA");
}

#[test]
fn finish_concludes_with_seen_frames() {
    let db = Arc::new(common::database());
    let worker = IdentifierThread::spawn(db, cfg(), MonotonicClock::new());
    worker.push(CanFrame::zeroed(0, 0x100, 7));
    let outcome = worker.finish();
    assert!(matches!(outcome, Err(VehidError::NoMatch)));
}

#[test]
fn finish_after_try_result_returns_the_same_outcome() {
    let db = Arc::new(common::database());
    let mut worker = IdentifierThread::spawn(db, cfg(), MonotonicClock::new());
    // No candidate carries 0x100 with 7 bytes.
    worker.push(CanFrame::zeroed(0, 0x100, 7));

    let mut seen = None;
    for _ in 0..200 {
        seen = worker.try_result();
        if seen.is_some() {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    let seen = seen.expect("outcome within 1s");
    assert!(matches!(seen, Err(VehidError::NoMatch)));
    assert!(matches!(worker.try_result(), Some(Err(VehidError::NoMatch))));
    assert!(matches!(worker.finish(), Err(VehidError::NoMatch)));
}

#[test]
fn drop_mid_phase_does_not_hang() {
    for _ in 0..10 {
        let db = Arc::new(common::database());
        let worker = IdentifierThread::spawn(db, cfg(), MonotonicClock::new());
        worker.push(CanFrame::zeroed(0, 0x300, 4));
        std::thread::sleep(Duration::from_millis(2));
        drop(worker);
    }
}
