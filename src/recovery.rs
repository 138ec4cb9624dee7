//! Full replay plus per-gap recovery.
//!
//! A run moves through `Streaming -> GapAnalysis -> Recovering -> Done`, or stops in
//! `Failed` when the initial replay breaks. Individual gap requests fail locally: the
//! sequence is recorded as unresolved and the run carries on.

use std::collections::BTreeMap;
use std::fmt;
use std::mem;

use log::{debug, info, warn};

use crate::protocol::Packet;
use crate::store::SequenceStore;
use crate::transport::PacketSource;
use crate::{Error, Result};

/// Highest sequence a resume request can address.
pub const MAX_RESUME_SEQUENCE: i32 = u8::MAX as i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Streaming,
    GapAnalysis,
    Recovering,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Streaming => "streaming",
            Phase::GapAnalysis => "gap-analysis",
            Phase::Recovering => "recovering",
            Phase::Done => "done",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A run of sequences missing from the final set, `first..=last`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unresolved {
    pub first: i32,
    pub last: i32,
    pub reason: String,
}

impl Unresolved {
    fn single(sequence: i32, reason: String) -> Self {
        Self {
            first: sequence,
            last: sequence,
            reason,
        }
    }

    /// Number of sequences in the run.
    pub fn count(&self) -> u64 {
        span(self.first, self.last)
    }
}

impl fmt::Display for Unresolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first == self.last {
            write!(f, "{} ({})", self.first, self.reason)
        } else {
            write!(f, "{}..={} ({})", self.first, self.last, self.reason)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Final packets, strictly ascending by sequence.
    pub packets: Vec<Packet>,
    /// Packets accepted from the full replay.
    pub streamed: usize,
    /// Gap sequences filled by individual requests.
    pub recovered: Vec<i32>,
    /// Every sequence below the final maximum that is absent from `packets`, ascending.
    pub unresolved: Vec<Unresolved>,
}

impl RecoveryReport {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    pub fn unresolved_count(&self) -> u64 {
        self.unresolved.iter().map(Unresolved::count).sum()
    }
}

pub struct RecoveryCoordinator<S> {
    source: S,
    store: SequenceStore,
    phase: Phase,
}

impl<S: PacketSource> RecoveryCoordinator<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            store: SequenceStore::new(),
            phase: Phase::Streaming,
        }
    }

    /// Where the last run stopped: `Done` or `Failed` after [`run`](Self::run).
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Runs the whole exchange from a fresh store. Fails with [`Error::StreamingFailed`]
    /// only when the full replay cannot be read; everything after that degrades to
    /// unresolved sequences.
    pub fn run(&mut self) -> Result<RecoveryReport> {
        self.store = SequenceStore::new();
        self.phase = Phase::Streaming;
        let streamed = match self.stream() {
            Ok(count) => count,
            Err(err) => {
                self.enter(Phase::Failed);
                return Err(Error::StreamingFailed(Box::new(err)));
            }
        };

        self.enter(Phase::GapAnalysis);
        let gaps = self.store.gap_ranges();
        let missing: u64 = gaps.iter().map(|r| span(*r.start(), *r.end())).sum();
        info!(
            "streamed {streamed} packets up to sequence {}, {missing} missing",
            self.store.max_sequence()
        );
        if !gaps.is_empty() {
            info!("missing sequences: {gaps:?}");
        }

        let mut recovered = Vec::new();
        let mut failures = BTreeMap::new();
        if !gaps.is_empty() {
            self.enter(Phase::Recovering);
            for range in gaps {
                let (first, last) = range.into_inner();
                for seq in first..=last.min(MAX_RESUME_SEQUENCE) {
                    match self.recover(seq) {
                        Ok(()) => recovered.push(seq),
                        Err(err) => {
                            warn!("could not recover sequence {seq}: {err}");
                            failures.insert(seq, err.to_string());
                        }
                    }
                }
                if last > MAX_RESUME_SEQUENCE {
                    let from = first.max(MAX_RESUME_SEQUENCE + 1);
                    warn!("sequences {from}..={last} cannot be requested: {}", unsupported(from));
                }
            }
        }

        self.enter(Phase::Done);
        let unresolved = self.unresolved(&failures);
        let packets = mem::take(&mut self.store).into_ordered();
        info!(
            "recovered {} gaps, {} sequences unresolved, {} packets in final set",
            recovered.len(),
            unresolved.iter().map(Unresolved::count).sum::<u64>(),
            packets.len()
        );
        Ok(RecoveryReport {
            packets,
            streamed,
            recovered,
            unresolved,
        })
    }

    fn stream(&mut self) -> Result<usize> {
        let mut accepted = 0;
        let mut highest_corrupt: Option<(i32, String)> = None;
        for item in self.source.stream_all()? {
            match item {
                Ok(packet) => {
                    if packet.sequence() >= 1 {
                        accepted += 1;
                    }
                    self.store.insert(packet);
                }
                Err(Error::CorruptFrame { sequence, reason }) => {
                    warn!("skipping corrupt frame for sequence {sequence}: {reason}");
                    if highest_corrupt.as_ref().map_or(true, |(seq, _)| sequence > *seq) {
                        highest_corrupt = Some((sequence, reason));
                    }
                }
                Err(err) => return Err(err),
            }
        }
        // Below the maximum a corrupt frame is an ordinary gap. Above it the maximum itself
        // is unknown, so no gap set can be trusted.
        if let Some((sequence, reason)) = highest_corrupt {
            if sequence > self.store.max_sequence() {
                return Err(Error::CorruptFrame { sequence, reason });
            }
        }
        Ok(accepted)
    }

    fn recover(&mut self, seq: i32) -> Result<()> {
        let packet = self.source.request_one(seq)?;
        let got = packet.sequence();
        self.store.insert(packet);
        if got != seq {
            return Err(Error::MalformedFrame(format!(
                "requested sequence {seq}, server answered {got}"
            )));
        }
        debug!("recovered sequence {seq}");
        Ok(())
    }

    /// Everything still missing from the store, with the failure recorded for each
    /// requested sequence. Off-target replies can raise the maximum and expose gaps that
    /// were never requested; those are listed too.
    fn unresolved(&self, failures: &BTreeMap<i32, String>) -> Vec<Unresolved> {
        let mut out = Vec::new();
        for range in self.store.gap_ranges() {
            let (first, last) = range.into_inner();
            for seq in first..=last.min(MAX_RESUME_SEQUENCE) {
                let reason = failures
                    .get(&seq)
                    .cloned()
                    .unwrap_or_else(|| "exposed by an off-target reply, never requested".into());
                out.push(Unresolved::single(seq, reason));
            }
            let from = first.max(MAX_RESUME_SEQUENCE + 1);
            if from <= last {
                out.push(Unresolved {
                    first: from,
                    last,
                    reason: unsupported(from),
                });
            }
        }
        out
    }

    fn enter(&mut self, next: Phase) {
        debug!("recovery phase {} -> {}", self.phase, next);
        self.phase = next;
    }
}

fn span(first: i32, last: i32) -> u64 {
    (i64::from(last) - i64::from(first) + 1) as u64
}

fn unsupported(from: i32) -> String {
    Error::UnsupportedSequence(from).to_string()
}
