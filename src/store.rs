use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use log::warn;

use crate::protocol::Packet;

/// Packets keyed by sequence number.
///
/// Sequence numbers are dense and start at 1, so every key missing below the highest one
/// seen is a gap.
#[derive(Debug, Default, Clone)]
pub struct SequenceStore {
    packets: BTreeMap<i32, Packet>,
}

impl SequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts by sequence; the last write for a key wins. Returns the replaced packet.
    ///
    /// Sequence numbers below 1 are outside the sequence space and are dropped.
    pub fn insert(&mut self, packet: Packet) -> Option<Packet> {
        let seq = packet.sequence();
        if seq < 1 {
            warn!("dropping packet with invalid sequence {seq}");
            return None;
        }
        self.packets.insert(seq, packet)
    }

    pub fn get(&self, sequence: i32) -> Option<&Packet> {
        self.packets.get(&sequence)
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Highest sequence present, 0 when empty.
    pub fn max_sequence(&self) -> i32 {
        self.packets.keys().next_back().copied().unwrap_or(0)
    }

    /// Every sequence in `1..=max_sequence()` not present, ascending.
    pub fn gaps(&self) -> Vec<i32> {
        self.gap_ranges().into_iter().flatten().collect()
    }

    /// The same gaps as [`gaps`](Self::gaps), collapsed into ascending inclusive runs.
    /// Sized by the number of stored packets, not by how far apart they are.
    pub fn gap_ranges(&self) -> Vec<RangeInclusive<i32>> {
        let mut ranges = Vec::new();
        let mut expected = 1;
        for &seq in self.packets.keys() {
            if seq > expected {
                ranges.push(expected..=seq - 1);
            }
            expected = seq.saturating_add(1);
        }
        ranges
    }

    /// Consumes the store, yielding packets for `1..=max_sequence()` in ascending order.
    /// Sequences still absent are skipped.
    pub fn into_ordered(self) -> Vec<Packet> {
        self.packets.into_values().collect()
    }
}

impl Extend<Packet> for SequenceStore {
    fn extend<I: IntoIterator<Item = Packet>>(&mut self, iter: I) {
        for packet in iter {
            self.insert(packet);
        }
    }
}

impl FromIterator<Packet> for SequenceStore {
    fn from_iter<I: IntoIterator<Item = Packet>>(iter: I) -> Self {
        let mut store = Self::new();
        store.extend(iter);
        store
    }
}
