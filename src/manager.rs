//! The RIP manager: the protocol state machine (spec §4.3).

use std::time::{Duration, Instant};

use rand::Rng;

use crate::config::Config;
use crate::table::{RoutingTable, RoutingTableEntry, TableRow};
use crate::wire::{RipEntry, RipPacket, INFINITY};

/// Split-horizon with poisoned reverse vs. plain split-horizon (spec §6:
/// "compile-time boolean selecting poisoned reverse vs plain
/// split-horizon").
const POISONED_REVERSE: bool = true;

const BASE_PERIODIC_UPDATE: Duration = Duration::from_secs(30);
const BASE_TRIGGERED_UPDATE: Duration = Duration::from_secs(5);
const BASE_ENTRY_TIMEOUT: Duration = Duration::from_secs(180);
const BASE_GARBAGE_COLLECTION: Duration = Duration::from_secs(120);

/// A packet ready to go out on one of our input sockets, addressed by
/// the neighbour's port on `127.0.0.1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPacket {
    pub port: u16,
    pub bytes: Vec<u8>,
}

/// Owns the routing table and update scheduling for one router process.
pub struct RipManager {
    router_id: u16,
    outputs: std::collections::HashMap<u16, crate::config::Output>,
    table: RoutingTable,

    periodic_update: Duration,
    triggered_update: Duration,
    entry_timeout: Duration,
    garbage_collection: Duration,

    next_periodic_update: Instant,
    triggered_update_pending: bool,
    next_triggered_update: Instant,
}

impl RipManager {
    pub fn new(config: &Config) -> Self {
        Self::with_timings(
            config,
            BASE_PERIODIC_UPDATE,
            BASE_TRIGGERED_UPDATE,
            BASE_ENTRY_TIMEOUT,
            BASE_GARBAGE_COLLECTION,
        )
    }

    /// Construct with explicit timer durations, used by the daemon when
    /// a `--time-scale` divisor is configured and by tests that need
    /// fast convergence (spec §9 "Time scaling").
    pub fn with_timings(
        config: &Config,
        periodic_update: Duration,
        triggered_update: Duration,
        entry_timeout: Duration,
        garbage_collection: Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            router_id: config.router_id,
            outputs: config.outputs.clone(),
            table: RoutingTable::new(),
            periodic_update,
            triggered_update,
            entry_timeout,
            garbage_collection,
            next_periodic_update: now,
            triggered_update_pending: false,
            next_triggered_update: now,
        }
    }

    pub fn router_id(&self) -> u16 {
        self.router_id
    }

    pub fn table_rows(&self) -> Vec<TableRow> {
        self.table.to_rows()
    }

    /// Time until the earliest pending event: periodic update, any
    /// per-entry update/deletion deadline, or a pending triggered update
    /// slot. Never negative (spec §4.3).
    pub fn next_timeout(&self, now: Instant) -> Duration {
        let mut smallest = self.next_periodic_update.saturating_duration_since(now);

        for (_, entry) in self.table.iter() {
            smallest = smallest.min(entry.next_timeout(now));
        }

        if self.triggered_update_pending {
            smallest = smallest.min(self.next_triggered_update.saturating_duration_since(now));
        }

        smallest
    }

    /// Process one incoming UDP datagram (spec §4.3 step 1-4).
    pub fn incoming_message(&mut self, bytes: &[u8], now: Instant) {
        let packet = match RipPacket::decode(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                log::debug!("received invalid packet: {e}");
                return;
            }
        };

        let next_hop = packet.router_id;
        let Some(output) = self.outputs.get(&next_hop).copied() else {
            log::debug!("received packet from unknown router {next_hop}");
            return;
        };
        let link_metric = output.metric;

        // Keep the direct link alive even if the packet carries no
        // entry naming us (spec §4.3 step 3).
        self.add_to_table(next_hop, next_hop, link_metric, now);

        for entry in &packet.entries {
            let metric = link_metric.saturating_add(entry.metric).min(INFINITY);
            self.add_to_table(entry.router_id, next_hop, metric, now);
        }
    }

    /// Update or insert a table entry for `destination` (spec §4.3).
    fn add_to_table(&mut self, destination: u16, next_hop: u16, metric: u8, now: Instant) {
        if destination == self.router_id {
            return;
        }

        if let Some(existing) = self.table.get_mut(destination) {
            if let Some(reason) = existing.update(next_hop, metric, now) {
                log::debug!(
                    "{} updating routing table entry for destination {destination}: {reason}",
                    self.router_id
                );
            }
        } else if metric < INFINITY {
            log::debug!(
                "{} added a new route to destination {destination} next-hop {next_hop} metric {metric}",
                self.router_id
            );
            self.table.insert(
                destination,
                RoutingTableEntry::new(next_hop, metric, self.entry_timeout, self.garbage_collection),
            );
        }
    }

    /// Advance per-entry timers and, if a periodic or triggered update
    /// is due, build the outbound packets for this tick (spec §4.3).
    pub fn send_any_updates(&mut self, now: Instant) -> Vec<OutboundPacket> {
        let mut to_delete = Vec::new();

        for destination in self.table.destinations() {
            let entry = self.table.get(destination).expect("just listed");
            if entry.should_delete(now) {
                to_delete.push(destination);
                self.triggered_update_pending = true;
            } else if entry.should_begin_deletion(now) {
                log::debug!("starting deletion process for destination {destination}");
                self.table.get_mut(destination).unwrap().begin_deletion(now);
                self.triggered_update_pending = true;
            }
        }

        for destination in to_delete {
            log::debug!("deleting destination {destination}");
            self.table.remove(destination);
        }

        let periodic_due = now >= self.next_periodic_update;
        let triggered_due = self.triggered_update_pending && now >= self.next_triggered_update;

        if periodic_due || triggered_due {
            self.send_response_messages(now)
        } else {
            Vec::new()
        }
    }

    /// Build and reschedule a full response round to every neighbour
    /// (spec §4.3).
    fn send_response_messages(&mut self, now: Instant) -> Vec<OutboundPacket> {
        let mut outbound = Vec::new();
        let peers: Vec<(u16, u16)> = self
            .outputs
            .iter()
            .map(|(&peer_id, out)| (peer_id, out.port))
            .collect();

        for (peer_id, port) in peers {
            for packet in self.build_packets(peer_id) {
                let bytes = packet.encode();
                if let Err(e) = RipPacket::validate(&bytes) {
                    log::debug!("sending invalid packet to router {peer_id}: {e}");
                }
                outbound.push(OutboundPacket { port, bytes });
            }
        }

        let mut rng = rand::thread_rng();
        let jitter = self.periodic_update.as_secs_f64() / 6.0;
        let offset = rng.gen_range(-jitter..=jitter);
        let scheduled = (self.periodic_update.as_secs_f64() + offset).max(0.0);
        self.next_periodic_update = now + Duration::from_secs_f64(scheduled);

        self.triggered_update_pending = false;
        let lower = self.triggered_update.as_secs_f64() / 5.0;
        let upper = self.triggered_update.as_secs_f64();
        let next_triggered = rng.gen_range(lower..=upper);
        self.next_triggered_update = now + Duration::from_secs_f64(next_triggered);

        outbound
    }

    /// Build the response packets for one neighbour, applying
    /// split-horizon with (optional) poisoned reverse, splitting at 25
    /// entries per packet (spec §4.3, §9 "Packet size policy").
    fn build_packets(&self, peer_id: u16) -> Vec<RipPacket> {
        let mut packets = Vec::new();
        let mut current = vec![RipEntry::new(peer_id, INFINITY)];

        for (&destination, entry) in self.table.iter() {
            let metric = if entry.next_hop == peer_id {
                if POISONED_REVERSE {
                    INFINITY
                } else {
                    continue;
                }
            } else {
                entry.metric
            };

            if current.len() >= 25 {
                packets.push(RipPacket::new(self.router_id, std::mem::take(&mut current)));
            }
            current.push(RipEntry::new(destination, metric));
        }

        packets.push(RipPacket::new(self.router_id, current));
        packets
    }
}

impl std::fmt::Display for RipManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let now = Instant::now();
        writeln!(f, "Router {:<16} Routing Table", self.router_id)?;
        writeln!(
            f,
            "+-------------+----------+--------+------------+--------------+"
        )?;
        writeln!(
            f,
            "| destination | next hop | metric | update due | deletion due |"
        )?;
        writeln!(
            f,
            "+-------------+----------+--------+------------+--------------+"
        )?;
        for row in self.table.to_rows() {
            let entry = self.table.get(row.destination).expect("row came from table");
            let deletion_due = match entry.deletion_due_in(now) {
                Some(d) => format!("{}", d.as_secs()),
                None => String::new(),
            };
            writeln!(
                f,
                "| {:>11} | {:>8} | {:>6} | {:>10} | {:>12} |",
                row.destination,
                row.next_hop,
                row.metric,
                entry.update_due_in(now).as_secs(),
                deletion_due
            )?;
        }
        writeln!(
            f,
            "+-------------+----------+--------+------------+--------------+"
        )
    }
}
