//! Snapshot + diff-stream reconciliation.
//!
//! The reconciler is a synchronous state machine. It never does I/O itself:
//! every call returns an [`Outcome`] telling the caller whether a snapshot
//! should be fetched and whether the book changed. All mutations of the shared
//! book happen here, one event at a time.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::engine::book::Book;
use crate::engine::buffer::DiffBuffer;
use crate::engine::types::{DiffEvent, Snapshot};
use crate::error::SyncError;

pub type SharedBook = Arc<RwLock<Book>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No snapshot applied yet; buffering.
    Unsynced,
    /// Snapshot applied; looking for the event that covers `S + 1`.
    AwaitingAnchor,
    /// Book valid; events checked against `pu` and applied on arrival.
    Synced,
    /// Continuity lost; buffering until the next snapshot lands.
    Resyncing,
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub max_buffered_events: usize,
    pub malformed_threshold: usize,
    pub malformed_window: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_buffered_events: 5000,
            malformed_threshold: 20,
            malformed_window: Duration::from_secs(60),
        }
    }
}

/// What the caller has to do after feeding one input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Issue a snapshot fetch and report back via `on_snapshot`/`on_snapshot_failed`.
    pub request_snapshot: bool,
    /// At least one apply left the book valid.
    pub book_changed: bool,
    /// The book went from valid to invalid.
    pub invalidated: bool,
}

impl Outcome {
    fn merge(&mut self, other: Outcome) {
        self.request_snapshot |= other.request_snapshot;
        self.book_changed |= other.book_changed;
        self.invalidated |= other.invalidated;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub diffs_applied: u64,
    pub snapshots_applied: u64,
    pub gaps: u64,
    pub resyncs: u64,
    pub stale_discarded: u64,
    pub malformed: u64,
    pub buffer_overflows: u64,
    pub snapshot_failures: u64,
}

pub struct Reconciler {
    book: SharedBook,
    buffer: DiffBuffer,
    state: SyncState,
    snapshot_pending: bool,
    snapshot_id: u64,
    stats: SyncStats,
    malformed_seen: VecDeque<Instant>,
    malformed_threshold: usize,
    malformed_window: Duration,
}

impl Reconciler {
    pub fn new(config: ReconcilerConfig) -> Self {
        Self {
            book: Arc::new(RwLock::new(Book::new())),
            buffer: DiffBuffer::with_capacity(config.max_buffered_events),
            state: SyncState::Unsynced,
            snapshot_pending: false,
            snapshot_id: 0,
            stats: SyncStats::default(),
            malformed_seen: VecDeque::new(),
            malformed_threshold: config.malformed_threshold,
            malformed_window: config.malformed_window,
        }
    }

    /// Enter `Unsynced` and ask for the first snapshot.
    pub fn start(&mut self) -> Outcome {
        info!("Starting book sync");
        self.state = SyncState::Unsynced;
        let invalidated = self.invalidate();
        Outcome { request_snapshot: self.request_snapshot(), invalidated, ..Outcome::default() }
    }

    #[instrument(level = "debug", skip_all, fields(state = ?self.state, U = d.first_update_id, u = d.final_update_id, pu = d.prev_final_update_id))]
    pub fn on_diff(&mut self, d: DiffEvent) -> Outcome {
        match self.state {
            SyncState::Synced => {
                let mut out = self.apply_in_sequence(d);
                // a gap leaves `d` at the head of the buffer
                if self.state == SyncState::Synced {
                    out.merge(self.drain());
                }
                out
            }
            SyncState::AwaitingAnchor => {
                let mut out = self.buffer_event(d);
                if self.state == SyncState::AwaitingAnchor {
                    out.merge(self.try_anchor());
                }
                out
            }
            SyncState::Unsynced | SyncState::Resyncing => self.buffer_event(d),
        }
    }

    #[instrument(level = "debug", skip_all, fields(S = s.last_update_id, state = ?self.state))]
    pub fn on_snapshot(&mut self, s: Snapshot) -> Outcome {
        if !self.snapshot_pending || self.state == SyncState::Synced {
            debug!("Ignoring unrequested snapshot");
            return Outcome::default();
        }
        self.snapshot_pending = false;

        let discarded = self.buffer.discard_stale(s.last_update_id);
        self.stats.stale_discarded += discarded as u64;

        self.book.write().apply_snapshot(&s);
        self.snapshot_id = s.last_update_id;
        self.stats.snapshots_applied += 1;
        metrics::counter!("depth_replica_snapshots_applied_total").increment(1);

        info!(discarded, buffered = self.buffer.len(), "Snapshot applied, awaiting anchor");
        self.state = SyncState::AwaitingAnchor;
        self.try_anchor()
    }

    /// A snapshot fetch failed. Fatal errors are handed back; anything else
    /// just asks for another fetch.
    pub fn on_snapshot_failed(&mut self, err: &SyncError) -> Result<Outcome, SyncError> {
        self.snapshot_pending = false;
        self.stats.snapshot_failures += 1;
        if err.is_fatal() {
            error!(error = %err, "Snapshot fetch rejected by exchange");
            return Err(err.clone());
        }
        warn!(error = %err, state = ?self.state, "Snapshot fetch failed, retrying");
        Ok(Outcome { request_snapshot: self.request_snapshot(), ..Outcome::default() })
    }

    /// Count one undecodable frame. Returns true while the malformed rate is
    /// above the configured threshold.
    pub fn on_malformed(&mut self, now: Instant) -> bool {
        self.stats.malformed += 1;
        metrics::counter!("depth_replica_malformed_events_total").increment(1);
        self.malformed_seen.push_back(now);
        self.degraded(now)
    }

    pub fn degraded(&mut self, now: Instant) -> bool {
        while let Some(first) = self.malformed_seen.front() {
            if now.duration_since(*first) > self.malformed_window {
                self.malformed_seen.pop_front();
            } else {
                break;
            }
        }
        self.malformed_seen.len() > self.malformed_threshold
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    pub fn book(&self) -> SharedBook {
        Arc::clone(&self.book)
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn snapshot_pending(&self) -> bool {
        self.snapshot_pending
    }

    // Only one fetch is ever outstanding.
    fn request_snapshot(&mut self) -> bool {
        if self.snapshot_pending {
            return false;
        }
        self.snapshot_pending = true;
        true
    }

    fn invalidate(&mut self) -> bool {
        let mut book = self.book.write();
        let was_valid = book.is_valid();
        book.set_valid(false);
        metrics::gauge!("depth_replica_valid").set(0.0);
        was_valid
    }

    fn buffer_event(&mut self, d: DiffEvent) -> Outcome {
        let dropped = self.buffer.push(d);
        if dropped == 0 {
            return Outcome::default();
        }
        self.stats.buffer_overflows += 1;
        metrics::counter!("depth_replica_buffer_overflows_total").increment(1);
        // the applied snapshot can no longer be spliced to what is left
        if self.state == SyncState::AwaitingAnchor {
            self.state = SyncState::Resyncing;
            self.stats.resyncs += 1;
        }
        Outcome { request_snapshot: self.request_snapshot(), ..Outcome::default() }
    }

    fn try_anchor(&mut self) -> Outcome {
        let target = self.snapshot_id + 1;
        let Some(idx) = self.buffer.find_straddling(target) else {
            if self.buffer.has_event_after(target) {
                info!(snapshot = self.snapshot_id, "Snapshot older than stream, refetching");
                self.state = SyncState::Resyncing;
                self.stats.resyncs += 1;
                return Outcome { request_snapshot: self.request_snapshot(), ..Outcome::default() };
            }
            debug!(buffered = self.buffer.len(), "No anchor yet");
            return Outcome::default();
        };
        let Some(anchor) = self.buffer.take_through(idx) else {
            return Outcome::default();
        };

        {
            let mut book = self.book.write();
            book.apply_diff(&anchor);
            book.set_valid(true);
        }
        self.stats.diffs_applied += 1;
        metrics::counter!("depth_replica_diffs_applied_total").increment(1);
        metrics::gauge!("depth_replica_valid").set(1.0);
        self.state = SyncState::Synced;
        info!(
            U = anchor.first_update_id,
            u = anchor.final_update_id,
            remaining = self.buffer.len(),
            "Anchored on stream, book valid"
        );

        let mut out = Outcome { book_changed: true, ..Outcome::default() };
        out.merge(self.drain());
        out
    }

    // Apply whatever was buffered behind the anchor. Stops at the first gap and
    // waits for the next snapshot instead of scanning further.
    fn drain(&mut self) -> Outcome {
        let mut out = Outcome::default();
        while self.state == SyncState::Synced {
            let Some(d) = self.buffer.pop_front() else { break };
            out.merge(self.apply_in_sequence(d));
        }
        out
    }

    fn apply_in_sequence(&mut self, d: DiffEvent) -> Outcome {
        let mut book = self.book.write();
        let last = book.last_update_id();
        if d.prev_final_update_id == last {
            book.apply_diff(&d);
            drop(book);
            self.stats.diffs_applied += 1;
            metrics::counter!("depth_replica_diffs_applied_total").increment(1);
            return Outcome { book_changed: true, ..Outcome::default() };
        }

        // Levels stay untouched until the next snapshot replaces them.
        book.set_valid(false);
        drop(book);
        let gap = SyncError::ProtocolGap { expected: last, got: d.prev_final_update_id };
        info!(error = %gap, u = d.final_update_id, "Continuity lost, resyncing");
        metrics::gauge!("depth_replica_valid").set(0.0);
        metrics::counter!("depth_replica_gaps_total").increment(1);
        self.stats.gaps += 1;
        self.stats.resyncs += 1;

        self.buffer.push_front(d);
        self.state = SyncState::Resyncing;
        Outcome {
            request_snapshot: self.request_snapshot(),
            invalidated: true,
            ..Outcome::default()
        }
    }
}
