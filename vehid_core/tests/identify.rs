mod common;

use std::error::Error;
use std::time::Duration;

use vehid_core::{IdentifyCfg, MatchCfg, ReplaySource, VehidError, identify, open_session};
use vehid_traits::clock::MonotonicClock;
use vehid_traits::clock::test_clock::TestClock;
use vehid_traits::{CanFrame, Clock, FrameSource};

fn cfg(settle: u32) -> IdentifyCfg {
    IdentifyCfg {
        matcher: MatchCfg {
            settle_frames: settle,
            ..MatchCfg::default()
        },
        ..IdentifyCfg::default()
    }
}

fn typed(err: &eyre::Report) -> &VehidError {
    err.downcast_ref::<VehidError>().expect("typed VehidError")
}

/// Source that never produces a frame; every read times out and advances the clock.
struct SilentBus {
    clock: TestClock,
}

impl FrameSource for SilentBus {
    fn recv(&mut self, timeout: Duration) -> Result<Option<CanFrame>, Box<dyn Error + Send + Sync>> {
        self.clock.sleep(timeout);
        Err(Box::new(std::io::Error::from(std::io::ErrorKind::TimedOut)))
    }
}

/// Source that fails hard on the first read.
struct BrokenBus;

impl FrameSource for BrokenBus {
    fn recv(&mut self, _timeout: Duration) -> Result<Option<CanFrame>, Box<dyn Error + Send + Sync>> {
        Err("bus off".into())
    }
}

#[test]
fn resolves_and_keeps_settling() {
    let db = common::database();
    let mut frames = common::frames_of(&common::signature(2));
    frames.extend(std::iter::repeat_n(CanFrame::zeroed(0, 0x300, 4), 10));
    let total = frames.len();
    let mut src = ReplaySource::new(frames);

    let ident = identify(&mut src, &db, &cfg(5), &MonotonicClock::new()).unwrap();
    assert_eq!(ident.candidate.identity.as_str(), "CHARLIE");
    assert!(!ident.is_fallback());
    // Stopped after settling, before the source was drained.
    assert!(src.remaining() > 0);
    assert!(ident.frames < total as u64);
}

#[test]
fn late_contradiction_is_no_match() {
    let db = common::database();
    let mut frames = common::frames_of(&common::signature(0));
    // ALPHA declares 0x300 with length 4.
    frames.push(CanFrame::zeroed(0, 0x300, 6));
    let mut src = ReplaySource::new(frames);

    let err = identify(&mut src, &db, &cfg(25), &MonotonicClock::new()).unwrap_err();
    assert!(matches!(typed(&err), VehidError::NoMatch));
}

#[test]
fn ambiguous_window_falls_back_or_refuses() {
    let db = common::database();
    // Only ids every identity agrees on.
    let frames = vec![CanFrame::zeroed(0, 0x300, 4); 3];

    let ident = identify(
        &mut ReplaySource::new(frames.clone()),
        &db,
        &cfg(25),
        &MonotonicClock::new(),
    )
    .unwrap();
    assert!(ident.is_fallback());
    assert_eq!(ident.candidate.identity.as_str(), "ALPHA");

    let strict = IdentifyCfg {
        allow_ambiguous: false,
        ..cfg(25)
    };
    let err = identify(
        &mut ReplaySource::new(frames),
        &db,
        &strict,
        &MonotonicClock::new(),
    )
    .unwrap_err();
    match typed(&err) {
        VehidError::Ambiguous { candidates } => assert_eq!(candidates.len(), 4),
        other => panic!("expected ambiguous, got {other:?}"),
    }
}

#[test]
fn max_frames_bounds_the_window() {
    let db = common::database();
    let frames = vec![CanFrame::zeroed(0, 0x300, 4); 100];
    let mut src = ReplaySource::new(frames);
    let bounded = IdentifyCfg {
        max_frames: 10,
        ..cfg(25)
    };
    let ident = identify(&mut src, &db, &bounded, &MonotonicClock::new()).unwrap();
    assert_eq!(ident.frames, 10);
    assert_eq!(src.remaining(), 90);
}

#[test]
fn silent_bus_times_out() {
    let db = common::database();
    let clock = TestClock::new();
    let mut src = SilentBus {
        clock: clock.clone(),
    };
    let c = IdentifyCfg {
        timeout_ms: 500,
        read_timeout_ms: 100,
        ..cfg(25)
    };
    let err = identify(&mut src, &db, &c, &clock).unwrap_err();
    assert!(matches!(typed(&err), VehidError::Timeout));
}

#[test]
fn hard_source_errors_propagate() {
    let db = common::database();
    let err = identify(&mut BrokenBus, &db, &cfg(25), &MonotonicClock::new()).unwrap_err();
    match typed(&err) {
        VehidError::Source(msg) => assert_eq!(msg, "bus off"),
        other => panic!("expected source error, got {other:?}"),
    }
}

#[test]
fn open_session_carries_variant_and_observed_traffic() {
    let cat = common::catalog();
    let frames = common::frames_of(&common::signature(1));
    let session = open_session(
        &cat,
        &mut ReplaySource::new(frames),
        &cfg(0),
        &MonotonicClock::new(),
    )
    .unwrap();
    assert_eq!(session.identity().as_str(), "BRAVO");
    assert_eq!(session.params().fingerprint.variant, Some(0));
    assert!(session.params().fingerprint.observed.contains(0, 0x100));
}
