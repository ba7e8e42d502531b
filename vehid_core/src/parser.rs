//! Minimal frame parser shared by brand state decoders.
//!
//! Keeps the last good payload per expected message. A frame with the wrong
//! length or a failing checksum is dropped and marks the message invalid until
//! the next good frame. A message not received for more than its timeout
//! (counted in `update` calls) is stale, and so is the whole bus when nothing
//! at all arrives on the channel for that long.

use std::collections::BTreeMap;

use tracing::{debug, trace};
use vehid_traits::CanFrame;

/// Payload check run on every frame of a message: `(id, data) -> ok`.
pub type Checksum = fn(u32, &[u8]) -> bool;

/// Update cycles a message may go unseen before it counts as missing.
pub const DEFAULT_TIMEOUT_CYCLES: u32 = 50;

/// Consecutive counter skips after which frames are dropped.
pub const MAX_BAD_COUNTER: u8 = 5;

/// Rolling counter field: `bits` wide, starting at bit `shift` of byte `byte`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterField {
    pub byte: usize,
    pub shift: u8,
    pub bits: u8,
}

impl CounterField {
    fn read(&self, data: &[u8]) -> Option<u8> {
        let mask = (1u16 << self.bits.min(8)) - 1;
        data.get(self.byte)
            .map(|b| ((u16::from(*b) >> self.shift) & mask) as u8)
    }

    fn follows(&self, prev: u8, next: u8) -> bool {
        let mask = (1u16 << self.bits.min(8)) - 1;
        ((u16::from(prev) + 1) & mask) as u8 == next
    }
}

/// One message a decoder expects on its channel.
#[derive(Debug, Clone, Copy)]
pub struct MessageSpec {
    pub id: u32,
    pub len: u8,
    pub checksum: Option<Checksum>,
    pub counter: Option<CounterField>,
    pub timeout_cycles: u32,
}

impl MessageSpec {
    pub const fn new(id: u32, len: u8) -> Self {
        Self {
            id,
            len,
            checksum: None,
            counter: None,
            timeout_cycles: DEFAULT_TIMEOUT_CYCLES,
        }
    }

    pub const fn checked(id: u32, len: u8, checksum: Checksum) -> Self {
        Self {
            checksum: Some(checksum),
            ..Self::new(id, len)
        }
    }

    pub const fn with_counter(self, byte: usize, shift: u8, bits: u8) -> Self {
        Self {
            counter: Some(CounterField { byte, shift, bits }),
            ..self
        }
    }

    pub const fn with_timeout(self, cycles: u32) -> Self {
        Self {
            timeout_cycles: cycles,
            ..self
        }
    }

    fn accepts(&self, frame: &CanFrame) -> bool {
        frame.len() == self.len && self.checksum.is_none_or(|f| f(frame.id, &frame.data))
    }
}

#[derive(Debug, Clone, Default)]
struct MessageState {
    data: Option<Vec<u8>>,
    last_ok: bool,
    bad: u32,
    since_seen: u32,
    counter: Option<u8>,
    counter_fail: u8,
}

#[derive(Debug, Clone)]
pub struct CanParser {
    channel: u8,
    specs: BTreeMap<u32, MessageSpec>,
    states: BTreeMap<u32, MessageState>,
    since_bus_frame: u32,
    bus_timeout_cycles: u32,
}

impl CanParser {
    pub fn new(channel: u8, specs: &[MessageSpec]) -> Self {
        Self {
            channel,
            specs: specs.iter().map(|s| (s.id, *s)).collect(),
            states: specs
                .iter()
                .map(|s| (s.id, MessageState::default()))
                .collect(),
            since_bus_frame: 0,
            bus_timeout_cycles: specs
                .iter()
                .map(|s| s.timeout_cycles)
                .min()
                .unwrap_or(DEFAULT_TIMEOUT_CYCLES),
        }
    }

    /// Consume this cycle's frames. Frames for other channels or ids are skipped.
    pub fn update(&mut self, frames: &[CanFrame]) {
        for state in self.states.values_mut() {
            state.since_seen = state.since_seen.saturating_add(1);
        }
        let mut on_bus = false;
        for frame in frames.iter().filter(|f| f.channel == self.channel) {
            on_bus = true;
            let (Some(spec), Some(state)) =
                (self.specs.get(&frame.id), self.states.get_mut(&frame.id))
            else {
                continue;
            };
            if spec.accepts(frame) && Self::counter_ok(spec, state, &frame.data) {
                state.data = Some(frame.data.clone());
                state.last_ok = true;
                state.since_seen = 0;
            } else {
                state.last_ok = false;
                state.bad = state.bad.saturating_add(1);
                trace!(
                    channel = self.channel,
                    id = %format!("0x{:x}", frame.id),
                    len = frame.len(),
                    "dropped malformed frame"
                );
            }
        }
        if on_bus {
            self.since_bus_frame = 0;
        } else {
            self.since_bus_frame = self.since_bus_frame.saturating_add(1);
            if self.since_bus_frame == self.bus_timeout_cycles.saturating_add(1) {
                debug!(channel = self.channel, "bus timeout");
            }
        }
    }

    /// Track the rolling counter; a frame is dropped once `MAX_BAD_COUNTER`
    /// skips accumulate, and each in-sequence frame pays one back.
    fn counter_ok(spec: &MessageSpec, state: &mut MessageState, data: &[u8]) -> bool {
        let Some(field) = spec.counter else {
            return true;
        };
        let Some(value) = field.read(data) else {
            return false;
        };
        let prev = state.counter.replace(value);
        match prev {
            Some(p) if !field.follows(p, value) => {
                state.counter_fail = (state.counter_fail + 1).min(MAX_BAD_COUNTER);
            }
            _ => state.counter_fail = state.counter_fail.saturating_sub(1),
        }
        state.counter_fail < MAX_BAD_COUNTER
    }

    /// Last good payload of `id`.
    pub fn get(&self, id: u32) -> Option<&[u8]> {
        self.states.get(&id).and_then(|s| s.data.as_deref())
    }

    /// Big-endian u16 at `at` in the last good payload of `id`.
    pub fn be_u16(&self, id: u32, at: usize) -> Option<u16> {
        let d = self.get(id)?;
        Some(u16::from_be_bytes([*d.get(at)?, *d.get(at + 1)?]))
    }

    pub fn be_i16(&self, id: u32, at: usize) -> Option<i16> {
        self.be_u16(id, at).map(|v| v as i16)
    }

    pub fn byte(&self, id: u32, at: usize) -> Option<u8> {
        self.get(id)?.get(at).copied()
    }

    /// Total frames dropped for `id` since construction.
    pub fn bad_count(&self, id: u32) -> u32 {
        self.states.get(&id).map_or(0, |s| s.bad)
    }

    /// Nothing arrived on the channel for longer than the shortest message
    /// timeout.
    pub fn bus_timeout(&self) -> bool {
        self.since_bus_frame > self.bus_timeout_cycles
    }

    /// Every expected message has been received recently and its latest frame
    /// was good.
    pub fn can_valid(&self) -> bool {
        !self.bus_timeout()
            && self.specs.values().all(|spec| {
                self.states.get(&spec.id).is_some_and(|s| {
                    s.data.is_some() && s.last_ok && s.since_seen <= spec.timeout_cycles
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum_is_zero(_id: u32, data: &[u8]) -> bool {
        data.iter().fold(0u8, |a, b| a.wrapping_add(*b)) == 0
    }

    #[test]
    fn starts_invalid_and_tracks_good_frames() {
        let mut p = CanParser::new(0, &[MessageSpec::new(0x10, 2)]);
        assert!(!p.can_valid());
        p.update(&[CanFrame::new(0, 0x10, [0x01, 0x02])]);
        assert!(p.can_valid());
        assert_eq!(p.be_u16(0x10, 0), Some(0x0102));
    }

    #[test]
    fn malformed_frames_keep_the_last_good_payload() {
        let mut p = CanParser::new(0, &[MessageSpec::checked(0x10, 2, sum_is_zero)]);
        p.update(&[CanFrame::new(0, 0x10, [0x01, 0xFF])]);
        assert!(p.can_valid());
        p.update(&[
            CanFrame::new(0, 0x10, [0x01]),
            CanFrame::new(0, 0x10, [0x01, 0x01]),
        ]);
        assert!(!p.can_valid());
        assert_eq!(p.get(0x10), Some(&[0x01, 0xFF][..]));
        assert_eq!(p.bad_count(0x10), 2);
    }

    #[test]
    fn messages_go_stale_after_their_timeout() {
        let mut p = CanParser::new(0, &[MessageSpec::new(0x10, 2).with_timeout(3)]);
        p.update(&[CanFrame::new(0, 0x10, [0x01, 0x02])]);
        for _ in 0..3 {
            p.update(&[]);
            assert!(p.can_valid());
        }
        p.update(&[]);
        assert!(!p.can_valid());
        assert!(p.bus_timeout());
        assert_eq!(p.be_u16(0x10, 0), Some(0x0102));

        p.update(&[CanFrame::new(0, 0x10, [0x01, 0x02])]);
        assert!(p.can_valid());
    }

    #[test]
    fn a_message_seen_once_does_not_stay_valid() {
        let mut p = CanParser::new(0, &[MessageSpec::new(0x10, 2)]);
        p.update(&[CanFrame::new(0, 0x10, [0x01, 0x02])]);
        for _ in 0..10_000 {
            p.update(&[]);
        }
        assert!(!p.can_valid());
    }

    #[test]
    fn one_silent_message_invalidates_a_busy_bus() {
        let mut p = CanParser::new(
            0,
            &[
                MessageSpec::new(0x10, 1).with_timeout(2),
                MessageSpec::new(0x20, 1).with_timeout(2),
            ],
        );
        p.update(&[CanFrame::new(0, 0x10, [0]), CanFrame::new(0, 0x20, [0])]);
        for _ in 0..3 {
            p.update(&[CanFrame::new(0, 0x10, [0])]);
        }
        assert!(!p.bus_timeout());
        assert!(!p.can_valid());
    }

    #[test]
    fn counter_skips_drop_frames_after_the_limit() {
        let spec = MessageSpec::new(0x10, 1).with_counter(0, 4, 2);
        let mut p = CanParser::new(0, &[spec]);
        for c in 0..8u8 {
            p.update(&[CanFrame::new(0, 0x10, [(c & 3) << 4])]);
            assert!(p.can_valid(), "in-sequence frame {c}");
        }
        // Same counter value every cycle.
        for i in 1..u32::from(MAX_BAD_COUNTER) {
            p.update(&[CanFrame::new(0, 0x10, [0x30])]);
            assert!(p.can_valid(), "skip {i} is tolerated");
        }
        p.update(&[CanFrame::new(0, 0x10, [0x30])]);
        assert!(!p.can_valid());
        assert_eq!(p.bad_count(0x10), 1);

        // In-sequence frames pay the failures back one at a time.
        p.update(&[CanFrame::new(0, 0x10, [0x00])]);
        assert!(p.can_valid());
    }

    #[test]
    fn ignores_other_channels() {
        let mut p = CanParser::new(1, &[MessageSpec::new(0x10, 1)]);
        p.update(&[CanFrame::new(0, 0x10, [7])]);
        assert!(p.get(0x10).is_none());
    }
}
