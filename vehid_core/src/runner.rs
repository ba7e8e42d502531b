use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};
use vehid_traits::clock::Clock;
use vehid_traits::{CanFrame, CarControl, Fingerprint, FrameSource};

use crate::config::{CycleCfg, IdentifyCfg};
use crate::error::{Result, VehidError};
use crate::fingerprint::FingerprintDatabase;
use crate::matcher::{Candidate, Identifier, MatchResult};
use crate::session::{CycleOutput, Session};
use crate::source_error::map_source_error;

/// Outcome of a bounded identification phase.
#[derive(Debug, Clone, PartialEq)]
pub struct Identification {
    /// Identity handed to the session builder.
    pub candidate: Candidate,
    /// Raw matcher verdict; `Ambiguous` when `candidate` came from the fallback.
    pub result: MatchResult,
    pub observed: Fingerprint,
    pub frames: u64,
}

impl Identification {
    pub fn is_fallback(&self) -> bool {
        !self.result.is_resolved()
    }
}

/// Why the identification loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Settled,
    Window,
    Deadline,
    Exhausted,
}

/// Pull frames from `source` until the matcher is done or a bound is hit.
///
/// Bounds are `max_frames` frames and `timeout_ms` wall time measured on
/// `clock`. Per-read timeouts from the source are tolerated. After the loop:
/// - one candidate: resolved;
/// - none: `VehidError::NoMatch`;
/// - several: the first-registered candidate if `allow_ambiguous`, otherwise
///   `VehidError::Ambiguous`;
/// - deadline reached without a single frame: `VehidError::Timeout`.
pub fn identify<S, C>(
    source: &mut S,
    db: &FingerprintDatabase,
    cfg: &IdentifyCfg,
    clock: &C,
) -> Result<Identification>
where
    S: FrameSource + ?Sized,
    C: Clock + ?Sized,
{
    let epoch = clock.now();
    let read_timeout = Duration::from_millis(cfg.read_timeout_ms.max(1));
    let mut ident = Identifier::new(db, cfg.matcher.clone());
    info!(
        candidates = db.len(),
        max_frames = cfg.max_frames,
        timeout_ms = cfg.timeout_ms,
        "identification start"
    );

    let stop = loop {
        if ident.is_done() {
            break Stop::Settled;
        }
        if ident.frames_seen() >= u64::from(cfg.max_frames) {
            break Stop::Window;
        }
        if clock.ms_since(epoch) >= cfg.timeout_ms {
            break Stop::Deadline;
        }
        match source.recv(read_timeout) {
            Ok(Some(frame)) => ident.observe(&frame),
            Ok(None) => break Stop::Exhausted,
            Err(e) => match map_source_error(e.as_ref()) {
                VehidError::Timeout => continue,
                other => return Err(eyre::Report::new(other)),
            },
        }
    };

    debug!(
        ?stop,
        frames = ident.frames_seen(),
        remaining = ident.remaining(),
        "identification stopped"
    );
    conclude(ident, cfg, stop == Stop::Deadline).map_err(eyre::Report::new)
}

/// Turn the matcher state at the end of a phase into an identification.
pub(crate) fn conclude(
    ident: Identifier<'_>,
    cfg: &IdentifyCfg,
    deadline: bool,
) -> std::result::Result<Identification, VehidError> {
    let frames = ident.frames_seen();
    if deadline && frames == 0 {
        return Err(VehidError::Timeout);
    }

    let result = ident.result();
    let candidate = match &result {
        MatchResult::Resolved(c) => c.clone(),
        MatchResult::NoMatch => {
            warn!(frames, "no fingerprint matched");
            return Err(VehidError::NoMatch);
        }
        MatchResult::Ambiguous(cands) => {
            let ids = cands.iter().map(|c| c.identity.clone()).collect::<Vec<_>>();
            if !cfg.allow_ambiguous {
                return Err(VehidError::Ambiguous { candidates: ids });
            }
            let chosen = result.canonical().cloned().ok_or(VehidError::NoMatch)?;
            warn!(
                candidates = ids.len(),
                chosen = %chosen.identity,
                frames,
                "ambiguous fingerprint, falling back to first-registered candidate"
            );
            chosen
        }
    };
    if result.is_resolved() {
        info!(car = %candidate.identity, variant = candidate.variant, frames, "identified");
    }

    Ok(Identification {
        candidate,
        result,
        observed: ident.into_observed(),
        frames,
    })
}

/// In-memory frame source over a recorded sequence.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    frames: VecDeque<CanFrame>,
}

impl ReplaySource {
    pub fn new(frames: impl IntoIterator<Item = CanFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    /// Frames not consumed by identification.
    pub fn into_remaining(self) -> Vec<CanFrame> {
        self.frames.into()
    }
}

impl FrameSource for ReplaySource {
    fn recv(
        &mut self,
        _timeout: Duration,
    ) -> std::result::Result<Option<CanFrame>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.frames.pop_front())
    }
}

/// Longest run of empty batches kept between two frames; longer gaps in the
/// log are collapsed to this many quiet cycles.
pub const MAX_EMPTY_CYCLES: u64 = 100;

/// Group timestamped frames into per-cycle batches of `period_ms`.
///
/// Batch `k` holds frames with `t_ms` in `[t0 + k*period, t0 + (k+1)*period)`
/// where `t0` is the first timestamp; empty cycles yield empty batches, at
/// most [`MAX_EMPTY_CYCLES`] in a row.
pub fn batch_by_period<I>(timed: I, period_ms: u64) -> Vec<Vec<CanFrame>>
where
    I: IntoIterator<Item = (u64, CanFrame)>,
{
    let period = period_ms.max(1);
    let mut out: Vec<Vec<CanFrame>> = Vec::new();
    let mut t0 = None;
    let mut collapsed = 0u64;
    for (t, frame) in timed {
        let start = *t0.get_or_insert(t);
        let mut slot = (t.saturating_sub(start) / period).saturating_sub(collapsed);
        let next = out.len() as u64;
        let empty = slot.saturating_sub(next);
        if empty > MAX_EMPTY_CYCLES {
            let excess = empty - MAX_EMPTY_CYCLES;
            warn!(t_ms = t, skipped_cycles = excess, "collapsing gap in bus log");
            collapsed = collapsed.saturating_add(excess);
            slot -= excess;
        }
        // bounded by `next + MAX_EMPTY_CYCLES` above
        let slot = slot as usize;
        if slot >= out.len() {
            out.resize_with(slot + 1, Vec::new);
        }
        if let Some(batch) = out.get_mut(slot) {
            batch.push(frame);
        }
    }
    out
}

/// Drive `session` over pre-batched frames at `cfg.rate_hz`.
///
/// `command` supplies the intent for each cycle index; `sink` sees every
/// cycle output. Stops early when `stop` is raised. Returns cycles run.
pub fn drive<C, F, O>(
    session: &mut Session,
    batches: impl IntoIterator<Item = Vec<CanFrame>>,
    cfg: &CycleCfg,
    clock: &C,
    stop: &AtomicBool,
    mut command: F,
    mut sink: O,
) -> u64
where
    C: Clock + ?Sized,
    F: FnMut(u64) -> CarControl,
    O: FnMut(u64, &CycleOutput),
{
    let period = Duration::from_micros(crate::util::period_us(cfg.rate_hz));
    let mut cycles = 0u64;
    info!(car = %session.identity(), rate_hz = cfg.rate_hz, "drive start");

    for frames in batches {
        if stop.load(Ordering::Relaxed) {
            info!(cycles, "drive stopped");
            break;
        }
        let started = clock.now();
        let cc = command(cycles);
        let out = session.cycle(&cc, &frames);
        sink(cycles, &out);
        cycles += 1;

        let spent = clock.now().saturating_duration_since(started);
        clock.sleep(period.saturating_sub(spent));
    }
    info!(cycles, "drive complete");
    cycles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_follow_timestamps() {
        let f = |id| CanFrame::zeroed(0, id, 1);
        let b = batch_by_period(vec![(100, f(1)), (105, f(2)), (131, f(3))], 10);
        assert_eq!(b.len(), 4);
        assert_eq!(b[0].len(), 2);
        assert!(b[1].is_empty() && b[2].is_empty());
        assert_eq!(b[3][0].id, 3);
    }

    #[test]
    fn long_gaps_collapse_to_quiet_cycles() {
        let f = |id| CanFrame::zeroed(0, id, 1);
        let far = 1u64 << 40;
        let b = batch_by_period(vec![(0, f(1)), (far, f(2)), (far + 20, f(3))], 10);
        let quiet = usize::try_from(MAX_EMPTY_CYCLES).unwrap();
        assert_eq!(b.len(), quiet + 2 + 2);
        assert_eq!(b[0][0].id, 1);
        assert!(b[1..=quiet].iter().all(Vec::is_empty));
        assert_eq!(b[quiet + 1][0].id, 2);
        assert!(b[quiet + 2].is_empty());
        assert_eq!(b[quiet + 3][0].id, 3);
    }

    #[test]
    fn gaps_at_the_limit_are_kept() {
        let f = |id| CanFrame::zeroed(0, id, 1);
        let t = (MAX_EMPTY_CYCLES + 1) * 10;
        let b = batch_by_period(vec![(0, f(1)), (t, f(2))], 10);
        assert_eq!(b.len() as u64, MAX_EMPTY_CYCLES + 2);
    }

    #[test]
    fn replay_source_drains_in_order() {
        let mut src = ReplaySource::new([CanFrame::zeroed(0, 1, 1), CanFrame::zeroed(0, 2, 1)]);
        let t = Duration::from_millis(1);
        assert_eq!(src.recv(t).unwrap().unwrap().id, 1);
        assert_eq!(src.remaining(), 1);
        assert_eq!(src.recv(t).unwrap().unwrap().id, 2);
        assert!(src.recv(t).unwrap().is_none());
    }
}
