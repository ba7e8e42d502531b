//! Raw bus frames and per-channel fingerprints.

use serde::Serialize;
use std::collections::BTreeMap;

/// Largest payload a frame may carry (CAN-FD).
pub const MAX_PAYLOAD: usize = 64;

/// One frame as seen on (or sent to) a bus channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CanFrame {
    pub channel: u8,
    pub id: u32,
    pub data: Vec<u8>,
}

impl CanFrame {
    pub fn new(channel: u8, id: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            channel,
            id,
            data: data.into(),
        }
    }

    /// Frame carrying `len` zero bytes; used for triggers and synthetic traffic.
    pub fn zeroed(channel: u8, id: u32, len: usize) -> Self {
        Self::new(channel, id, vec![0; len.min(MAX_PAYLOAD)])
    }

    /// Payload length clamped into the `u8` range used by fingerprints.
    #[inline]
    pub fn len(&self) -> u8 {
        u8::try_from(self.data.len()).unwrap_or(u8::MAX)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn byte(&self, at: usize) -> Option<u8> {
        self.data.get(at).copied()
    }

    /// Big-endian unsigned 16-bit field starting at byte `at`.
    pub fn be_u16(&self, at: usize) -> Option<u16> {
        let b = self.data.get(at..at + 2)?;
        Some(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Big-endian signed 16-bit field starting at byte `at`.
    pub fn be_i16(&self, at: usize) -> Option<i16> {
        self.be_u16(at).map(|v| v as i16)
    }
}

/// Per-channel map of message id to payload length.
///
/// Used both for reference signatures (expected lengths) and for the
/// fingerprint accumulated from observed traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Fingerprint {
    channels: BTreeMap<u8, BTreeMap<u32, u8>>,
}

impl Fingerprint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper: declare every `(id, len)` pair on `channel`.
    pub fn with_channel(mut self, channel: u8, pairs: &[(u32, u8)]) -> Self {
        for &(id, len) in pairs {
            self.insert(channel, id, len);
        }
        self
    }

    /// Record `id` on `channel`. Returns false when the id was already present;
    /// the first recorded length is kept.
    pub fn insert(&mut self, channel: u8, id: u32, len: u8) -> bool {
        let ch = self.channels.entry(channel).or_default();
        if ch.contains_key(&id) {
            return false;
        }
        ch.insert(id, len);
        true
    }

    #[inline]
    pub fn get(&self, channel: u8, id: u32) -> Option<u8> {
        self.channels.get(&channel)?.get(&id).copied()
    }

    #[inline]
    pub fn contains(&self, channel: u8, id: u32) -> bool {
        self.get(channel, id).is_some()
    }

    /// Iterate `(id, len)` pairs declared on `channel` in ascending id order.
    pub fn channel(&self, channel: u8) -> impl Iterator<Item = (u32, u8)> + '_ {
        self.channels
            .get(&channel)
            .into_iter()
            .flat_map(|m| m.iter().map(|(id, len)| (*id, *len)))
    }

    /// Iterate every `(channel, id, len)` triple.
    pub fn iter(&self) -> impl Iterator<Item = (u8, u32, u8)> + '_ {
        self.channels
            .iter()
            .flat_map(|(ch, m)| m.iter().map(move |(id, len)| (*ch, *id, *len)))
    }

    pub fn channels(&self) -> impl Iterator<Item = u8> + '_ {
        self.channels.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.channels.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Synthesize one zero-filled frame per declared `(channel, id)`.
    pub fn to_frames(&self) -> Vec<CanFrame> {
        self.iter()
            .map(|(ch, id, len)| CanFrame::zeroed(ch, id, usize::from(len)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_length_wins() {
        let mut fp = Fingerprint::new();
        assert!(fp.insert(0, 0x1c4, 8));
        assert!(!fp.insert(0, 0x1c4, 4));
        assert_eq!(fp.get(0, 0x1c4), Some(8));
        assert_eq!(fp.get(1, 0x1c4), None);
    }

    #[test]
    fn field_accessors_tolerate_short_payloads() {
        let f = CanFrame::new(0, 0x25, [0x12, 0x34, 0xff]);
        assert_eq!(f.be_u16(0), Some(0x1234));
        assert_eq!(f.be_i16(1), Some(0x34ff));
        assert_eq!(f.be_u16(2), None);
        assert_eq!(f.byte(5), None);
    }

    #[test]
    fn frames_follow_declared_lengths() {
        let fp = Fingerprint::new()
            .with_channel(0, &[(0x25, 8), (0x1c4, 3)])
            .with_channel(2, &[(0x2e4, 5)]);
        let frames = fp.to_frames();
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| fp.get(f.channel, f.id) == Some(f.len())));
    }
}
