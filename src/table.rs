//! Routing table entry lifecycle and the table itself (spec §3, §4.2).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::wire::INFINITY;

/// A single destination's route: next-hop, metric, and the two timers
/// that drive the Active -> Deletion -> (removed) state machine.
///
/// Uses a monotonic [`Instant`] rather than wall-clock time (spec §9:
/// the original Python implementation used `time.time()`, which is a
/// known quality issue fixed here).
#[derive(Debug, Clone)]
pub struct RoutingTableEntry {
    pub next_hop: u16,
    pub metric: u8,
    time_update_due: Instant,
    time_deletion_due: Option<Instant>,
    entry_timeout: Duration,
    garbage_collection: Duration,
}

impl RoutingTableEntry {
    pub fn new(next_hop: u16, metric: u8, entry_timeout: Duration, garbage_collection: Duration) -> Self {
        Self {
            next_hop,
            metric,
            time_update_due: Instant::now() + entry_timeout,
            time_deletion_due: None,
            entry_timeout,
            garbage_collection,
        }
    }

    pub fn in_deletion(&self) -> bool {
        self.time_deletion_due.is_some()
    }

    fn over_halfway_to_update_due(&self, now: Instant) -> bool {
        let due_in = self.time_update_due.saturating_duration_since(now);
        due_in <= self.entry_timeout / 2
    }

    pub fn update_due_in(&self, now: Instant) -> Duration {
        self.time_update_due.saturating_duration_since(now)
    }

    pub fn deletion_due_in(&self, now: Instant) -> Option<Duration> {
        self.time_deletion_due
            .map(|due| due.saturating_duration_since(now))
    }

    /// Time until the next event this entry cares about: its update
    /// deadline, or (while in deletion) its deletion deadline.
    pub fn next_timeout(&self, now: Instant) -> Duration {
        match self.deletion_due_in(now) {
            Some(deletion) => self.update_due_in(now).min(deletion),
            None => self.update_due_in(now),
        }
    }

    /// Apply the RIP update rule (spec §4.2). Returns a human-readable
    /// reason when the entry changed, for debug logging.
    pub fn update(&mut self, new_next_hop: u16, new_metric: u8, now: Instant) -> Option<String> {
        let mut reason = None;
        let mut refresh = false;

        if new_next_hop == self.next_hop {
            refresh = true;
            if self.metric != new_metric {
                reason = Some(format!(
                    "updated next-hop {} metric from {} to {} (update is from next-hop)",
                    self.next_hop, self.metric, new_metric
                ));
                self.metric = new_metric;
            }
        } else if new_metric < self.metric {
            reason = Some(format!(
                "updated next-hop from {} ({}) to {} ({}) (better metric)",
                self.next_hop, self.metric, new_next_hop, new_metric
            ));
            refresh = true;
            self.next_hop = new_next_hop;
            self.metric = new_metric;
        } else if new_metric != INFINITY
            && new_metric == self.metric
            && self.over_halfway_to_update_due(now)
        {
            refresh = true;
            reason = Some(format!(
                "updated next-hop from {} ({}) to {} ({}) (over halfway to update due)",
                self.next_hop, self.metric, new_next_hop, new_metric
            ));
            self.next_hop = new_next_hop;
            self.metric = new_metric;
        }

        if refresh {
            self.time_update_due = now + self.entry_timeout;
            if self.metric < INFINITY {
                self.time_deletion_due = None;
            }
        }

        reason
    }

    pub fn should_begin_deletion(&self, now: Instant) -> bool {
        !self.in_deletion() && (self.metric >= INFINITY || now >= self.time_update_due)
    }

    pub fn begin_deletion(&mut self, now: Instant) {
        debug_assert!(!self.in_deletion());
        self.metric = INFINITY;
        self.time_deletion_due = Some(now + self.garbage_collection);
    }

    pub fn should_delete(&self, now: Instant) -> bool {
        match self.time_deletion_due {
            Some(due) => now >= due,
            None => false,
        }
    }
}

/// One row of the machine-readable table dump (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub destination: u16,
    pub next_hop: u16,
    pub metric: u8,
    pub deletion_in_progress: bool,
}

/// The routing table: destination router-id -> entry, excluding self.
#[derive(Debug, Default)]
pub struct RoutingTable {
    entries: HashMap<u16, RoutingTableEntry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, destination: u16) -> Option<&RoutingTableEntry> {
        self.entries.get(&destination)
    }

    pub fn get_mut(&mut self, destination: u16) -> Option<&mut RoutingTableEntry> {
        self.entries.get_mut(&destination)
    }

    pub fn insert(&mut self, destination: u16, entry: RoutingTableEntry) {
        self.entries.insert(destination, entry);
    }

    pub fn remove(&mut self, destination: u16) {
        self.entries.remove(&destination);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u16, &RoutingTableEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Destinations currently due for deletion-process entry or removal,
    /// snapshotted up front so callers can safely mutate/remove after.
    pub fn destinations(&self) -> Vec<u16> {
        self.entries.keys().copied().collect()
    }

    pub fn to_rows(&self) -> Vec<TableRow> {
        let mut rows: Vec<TableRow> = self
            .entries
            .iter()
            .map(|(dest, entry)| TableRow {
                destination: *dest,
                next_hop: entry.next_hop,
                metric: entry.metric,
                deletion_in_progress: entry.in_deletion(),
            })
            .collect();
        rows.sort_by_key(|row| row.destination);
        rows
    }
}
