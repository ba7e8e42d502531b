//! Fingerprint matcher.
//!
//! Starts from every identity in the database and eliminates candidates whose
//! signatures contradict observed traffic. A signature contradicts a frame when
//! it declares the frame's id on the frame's channel with a different length;
//! ids a signature does not declare are ignored. A candidate survives while at
//! least one of its signature variants survives.
//!
//! Elimination is monotone: a candidate never comes back, so the outcome does
//! not depend on frame order or channel interleaving.

use tracing::{debug, info, trace};
use vehid_traits::{CanFrame, Fingerprint, VehicleIdentity};

use crate::config::MatchCfg;
use crate::fingerprint::FingerprintDatabase;

/// A surviving identity with its lowest surviving signature variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub identity: VehicleIdentity,
    pub variant: usize,
}

/// Outcome of matching accumulated samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    Resolved(Candidate),
    /// Candidates in database registration order.
    Ambiguous(Vec<Candidate>),
    NoMatch,
}

impl MatchResult {
    /// Single identity for callers that require one.
    ///
    /// `Ambiguous` falls back to the first-registered candidate of the tied
    /// set; `NoMatch` never yields an identity.
    pub fn canonical(&self) -> Option<&Candidate> {
        match self {
            MatchResult::Resolved(c) => Some(c),
            MatchResult::Ambiguous(cands) => cands.first(),
            MatchResult::NoMatch => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, MatchResult::Resolved(_))
    }
}

/// Incremental matcher over one database.
#[derive(Debug, Clone)]
pub struct Identifier<'db> {
    db: &'db FingerprintDatabase,
    cfg: MatchCfg,
    /// Surviving-variant bitmask per database entry.
    alive: Vec<u64>,
    remaining: usize,
    observed: Fingerprint,
    frames_seen: u64,
    settled_at: Option<u64>,
}

impl<'db> Identifier<'db> {
    pub fn new(db: &'db FingerprintDatabase, cfg: MatchCfg) -> Self {
        let alive: Vec<u64> = db
            .entries()
            .iter()
            .map(|e| full_mask(e.signatures().len()))
            .collect();
        let remaining = alive.len();
        let mut this = Self {
            db,
            cfg,
            alive,
            remaining,
            observed: Fingerprint::new(),
            frames_seen: 0,
            settled_at: None,
        };
        this.note_settled();
        this
    }

    pub fn observe(&mut self, frame: &CanFrame) {
        self.observe_pair(frame.channel, frame.id, frame.len());
    }

    /// Consume one observed `(channel, id, length)` sample.
    pub fn observe_pair(&mut self, channel: u8, id: u32, len: u8) {
        self.frames_seen = self.frames_seen.saturating_add(1);
        self.observed.insert(channel, id, len);
        if !self.cfg.considers(channel, id) || self.remaining == 0 {
            return;
        }

        for (entry, mask) in self.db.entries().iter().zip(self.alive.iter_mut()) {
            if *mask == 0 {
                continue;
            }
            let mut next = *mask;
            for (v, sig) in entry.signatures().iter().enumerate() {
                if next & (1u64 << v) == 0 {
                    continue;
                }
                if let Some(expected) = sig.get(channel, id)
                    && expected != len
                {
                    next &= !(1u64 << v);
                }
            }
            if next != *mask {
                trace!(
                    identity = %entry.identity(),
                    channel,
                    id = %format!("0x{id:x}"),
                    len,
                    "signature variant eliminated"
                );
            }
            if next == 0 {
                self.remaining -= 1;
                debug!(
                    identity = %entry.identity(),
                    channel,
                    id = %format!("0x{id:x}"),
                    len,
                    remaining = self.remaining,
                    "candidate eliminated"
                );
            }
            *mask = next;
        }
        self.note_settled();
    }

    fn note_settled(&mut self) {
        if self.remaining == 1 && self.settled_at.is_none() {
            self.settled_at = Some(self.frames_seen);
            if let Some(c) = self.candidates().next() {
                info!(identity = %c.identity, frames = self.frames_seen, "fingerprint settled");
            }
        }
    }

    /// Surviving candidates in registration order.
    pub fn candidates(&self) -> impl Iterator<Item = Candidate> + '_ {
        self.db
            .entries()
            .iter()
            .zip(self.alive.iter())
            .filter(|(_, mask)| **mask != 0)
            .map(|(e, mask)| Candidate {
                identity: e.identity().clone(),
                variant: mask.trailing_zeros() as usize,
            })
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Everything observed so far, including ignored ids.
    pub fn observed(&self) -> &Fingerprint {
        &self.observed
    }

    /// True once more frames cannot change the verdict in a useful way:
    /// nothing left, or one candidate held for `settle_frames` frames.
    pub fn is_done(&self) -> bool {
        if self.remaining == 0 {
            return true;
        }
        match self.settled_at {
            Some(at) if self.remaining == 1 => {
                self.frames_seen.saturating_sub(at) >= u64::from(self.cfg.settle_frames)
            }
            _ => false,
        }
    }

    /// Verdict for the samples consumed so far.
    pub fn result(&self) -> MatchResult {
        let mut cands: Vec<Candidate> = self.candidates().collect();
        match cands.len() {
            0 => MatchResult::NoMatch,
            1 => MatchResult::Resolved(cands.remove(0)),
            _ => MatchResult::Ambiguous(cands),
        }
    }

    pub fn into_observed(self) -> Fingerprint {
        self.observed
    }
}

#[inline]
fn full_mask(variants: usize) -> u64 {
    if variants >= 64 {
        u64::MAX
    } else {
        (1u64 << variants) - 1
    }
}

/// Match a complete sample set in one call.
pub fn match_samples<'a, I>(db: &FingerprintDatabase, cfg: &MatchCfg, samples: I) -> MatchResult
where
    I: IntoIterator<Item = &'a CanFrame>,
{
    let mut ident = Identifier::new(db, cfg.clone());
    for frame in samples {
        ident.observe(frame);
    }
    ident.result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::BusSignature;
    use rstest::rstest;

    fn sig(pairs: &[(u32, u8)]) -> BusSignature {
        Fingerprint::new().with_channel(0, pairs)
    }

    fn db() -> FingerprintDatabase {
        FingerprintDatabase::builder()
            .add(
                "ALPHA".into(),
                vec![sig(&[(0x10, 8), (0x20, 4)]), sig(&[(0x10, 8), (0x20, 6)])],
            )
            .add("BRAVO".into(), vec![sig(&[(0x10, 2), (0x30, 8)])])
            .add("CHARLIE".into(), vec![sig(&[(0x10, 8), (0x20, 5)])])
            .build()
            .unwrap()
    }

    #[test]
    fn no_samples_leaves_everything_ambiguous() {
        let db = db();
        let r = match_samples(&db, &MatchCfg::default(), &Vec::<CanFrame>::new());
        match &r {
            MatchResult::Ambiguous(c) => assert_eq!(c.len(), 3),
            other => panic!("expected ambiguous, got {other:?}"),
        }
        assert_eq!(r.canonical().unwrap().identity.as_str(), "ALPHA");
    }

    #[rstest]
    #[case(&[(0x10, 8), (0x20, 4)], Some(("ALPHA", 0)))]
    #[case(&[(0x10, 8), (0x20, 6)], Some(("ALPHA", 1)))]
    #[case(&[(0x10, 8), (0x20, 5)], Some(("CHARLIE", 0)))]
    #[case(&[(0x10, 2)], Some(("BRAVO", 0)))]
    #[case(&[(0x10, 3)], None)]
    fn resolves_by_length(#[case] pairs: &[(u32, u8)], #[case] want: Option<(&str, usize)>) {
        let db = db();
        let frames: Vec<_> = pairs
            .iter()
            .map(|&(id, len)| CanFrame::zeroed(0, id, usize::from(len)))
            .collect();
        let r = match_samples(&db, &MatchCfg::default(), &frames);
        match want {
            Some((name, variant)) => assert_eq!(
                r,
                MatchResult::Resolved(Candidate {
                    identity: name.into(),
                    variant
                })
            ),
            None => assert_eq!(r, MatchResult::NoMatch),
        }
    }

    #[test]
    fn unknown_ids_are_not_penalized() {
        let db = db();
        let frames = [CanFrame::zeroed(0, 0x30, 8), CanFrame::zeroed(0, 0x99, 1)];
        // 0x30 is only declared by BRAVO; ALPHA and CHARLIE ignore it.
        let r = match_samples(&db, &MatchCfg::default(), &frames);
        assert!(matches!(r, MatchResult::Ambiguous(ref c) if c.len() == 3));
    }

    #[test]
    fn ignored_ids_and_channels_do_not_eliminate() {
        let db = db();
        let cfg = MatchCfg {
            ignore_ids: vec![0x10],
            ..MatchCfg::default()
        };
        let frames = [
            CanFrame::zeroed(0, 0x10, 1),
            CanFrame::zeroed(7, 0x20, 1),
            CanFrame::zeroed(0, 0x900, 1),
        ];
        let mut ident = Identifier::new(&db, cfg);
        for f in &frames {
            ident.observe(f);
        }
        assert_eq!(ident.remaining(), 3);
        // Still recorded for auxiliary signal detection.
        assert!(ident.observed().contains(0, 0x900));
    }

    #[test]
    fn settles_after_settle_frames() {
        let db = db();
        let cfg = MatchCfg {
            settle_frames: 2,
            ..MatchCfg::default()
        };
        let mut ident = Identifier::new(&db, cfg);
        ident.observe(&CanFrame::zeroed(0, 0x10, 2));
        assert_eq!(ident.remaining(), 1);
        assert!(!ident.is_done());
        ident.observe(&CanFrame::zeroed(0, 0x55, 1));
        assert!(!ident.is_done());
        ident.observe(&CanFrame::zeroed(0, 0x56, 1));
        assert!(ident.is_done());
    }

    #[test]
    fn late_contradiction_yields_no_match() {
        let db = db();
        let mut ident = Identifier::new(&db, MatchCfg::default());
        ident.observe(&CanFrame::zeroed(0, 0x10, 2));
        ident.observe(&CanFrame::zeroed(0, 0x30, 7));
        assert_eq!(ident.result(), MatchResult::NoMatch);
        assert!(ident.is_done());
    }
}
