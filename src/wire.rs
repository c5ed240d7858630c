//! RIP wire codec.
//!
//! A RIP packet is a byte sequence:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +---------------+---------------+-------------------------------+
//! |   command (1) |  version (1)  |      sender router-id (2)      |
//! +---------------+---------------+---------------------------------+
//! |                                                                 |
//! ~                       RIP entry (20) * N                        ~
//! |                                                                 |
//! +-----------------------------------------------------------------+
//! ```
//!
//! and a RIP entry is:
//!
//! ```text
//! +-------------------------------+-------------------------------+
//! | address family (2), must be 2 |     must be zero (2)           |
//! +-------------------------------+---------------------------------+
//! |                    destination router-id (4)                    |
//! +-------------------------------------------------------------------+
//! |                          must be zero (8)                         |
//! +---------------------------------------------------------------------+
//! |                             metric (4)                               |
//! +-----------------------------------------------------------------------+
//! ```

use crate::error::{RouteError, RouteResult};

pub const COMMAND_RESPONSE: u8 = 2;
pub const VERSION: u8 = 2;

pub const HEADER_LEN: usize = 4;
pub const ENTRY_LEN: usize = 20;
pub const MAX_ENTRIES: usize = 25;
pub const MAX_PACKET_LEN: usize = HEADER_LEN + ENTRY_LEN * MAX_ENTRIES;

pub const MIN_ROUTER_ID: u16 = 1;
pub const MAX_ROUTER_ID: u16 = 64000;
pub const INFINITY: u8 = 16;

pub fn router_id_is_valid(id: u16) -> bool {
    (MIN_ROUTER_ID..=MAX_ROUTER_ID).contains(&id)
}

pub fn metric_is_valid(metric: u8) -> bool {
    (1..=INFINITY).contains(&metric)
}

/// A single destination/metric pair carried in a RIP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RipEntry {
    pub router_id: u16,
    pub metric: u8,
}

impl RipEntry {
    pub fn new(router_id: u16, metric: u8) -> Self {
        Self { router_id, metric }
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&2u16.to_be_bytes()); // address family
        buf.extend_from_slice(&0u16.to_be_bytes()); // must be zero
        buf.extend_from_slice(&(self.router_id as u32).to_be_bytes());
        buf.extend_from_slice(&[0u8; 8]); // must be zero
        buf.extend_from_slice(&(self.metric as u32).to_be_bytes());
    }

    /// Decode a single 20-byte entry. Returns `RouteError::Entry` (and
    /// leaves the caller to drop just this entry) if any field is
    /// invalid.
    fn decode(bytes: &[u8]) -> RouteResult<Self> {
        debug_assert_eq!(bytes.len(), ENTRY_LEN);

        let address_family = u16::from_be_bytes([bytes[0], bytes[1]]);
        if address_family != 2 {
            return Err(RouteError::Entry(format!(
                "address family not 2: {address_family}"
            )));
        }
        if bytes[2] != 0 || bytes[3] != 0 {
            return Err(RouteError::Entry("must-be-zero field after address family set".to_string()));
        }
        let router_id = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let router_id: u16 = router_id
            .try_into()
            .map_err(|_| RouteError::Entry(format!("router-id out of range: {router_id}")))?;
        if !router_id_is_valid(router_id) {
            return Err(RouteError::Entry(format!("router-id invalid: {router_id}")));
        }
        if bytes[8..16].iter().any(|&b| b != 0) {
            return Err(RouteError::Entry("must-be-zero padding set".to_string()));
        }
        let metric = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
        let metric: u8 = metric
            .try_into()
            .map_err(|_| RouteError::Entry(format!("metric out of range: {metric}")))?;
        if !metric_is_valid(metric) {
            return Err(RouteError::Entry(format!("metric invalid: {metric}")));
        }

        Ok(RipEntry { router_id, metric })
    }
}

/// A validated RIP response packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RipPacket {
    pub router_id: u16,
    pub entries: Vec<RipEntry>,
}

impl RipPacket {
    pub fn new(router_id: u16, entries: Vec<RipEntry>) -> Self {
        Self { router_id, entries }
    }

    /// Encode the packet to its wire representation. The inverse of
    /// [`RipPacket::decode`] for any packet with 1..=25 entries.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + ENTRY_LEN * self.entries.len());
        buf.push(COMMAND_RESPONSE);
        buf.push(VERSION);
        buf.extend_from_slice(&self.router_id.to_be_bytes());
        for entry in &self.entries {
            entry.encode(&mut buf);
        }
        buf
    }

    /// Re-parse freshly encoded bytes as a self-check before sending.
    /// Never fatal: logs and the caller sends regardless, mirroring the
    /// original's `try: RipPacket(p) except AssertionError` around its
    /// own re-parse before `sendto` (spec §7 "Send error").
    pub fn validate(bytes: &[u8]) -> RouteResult<()> {
        Self::decode(bytes).map(|_| ())
    }

    /// Decode and validate a packet header; malformed entries are
    /// silently dropped while the rest of the packet is kept (spec §4.1).
    pub fn decode(bytes: &[u8]) -> RouteResult<Self> {
        let len = bytes.len();
        if len < HEADER_LEN + ENTRY_LEN || len > MAX_PACKET_LEN {
            return Err(RouteError::Packet(format!(
                "packet length invalid: {len}"
            )));
        }
        if (len - HEADER_LEN) % ENTRY_LEN != 0 {
            return Err(RouteError::Packet(format!(
                "packet length invalid: {len}"
            )));
        }
        if bytes[0] != COMMAND_RESPONSE {
            return Err(RouteError::Packet("command field not 2".to_string()));
        }
        if bytes[1] != VERSION {
            return Err(RouteError::Packet("version field not 2".to_string()));
        }
        let router_id = u16::from_be_bytes([bytes[2], bytes[3]]);
        if !router_id_is_valid(router_id) {
            return Err(RouteError::Packet(format!(
                "router-id invalid {router_id}"
            )));
        }

        let mut entries = Vec::new();
        let mut offset = HEADER_LEN;
        while offset < len {
            match RipEntry::decode(&bytes[offset..offset + ENTRY_LEN]) {
                Ok(entry) => entries.push(entry),
                Err(e) => log::debug!("dropping malformed RIP entry at offset {offset}: {e}"),
            }
            offset += ENTRY_LEN;
        }

        Ok(RipPacket { router_id, entries })
    }
}
