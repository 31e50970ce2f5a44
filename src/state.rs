// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The identifier state table: a dense, single-threaded map from packet
//! identifier to the state of that identifier's QoS 1/2 handshake.
//!
//! The reference client keeps a `HashMap<PacketId, PublishPacket>` per QoS
//! level (see `publishing_qos1_packets` / `publishing_qos2_packets` in the
//! client's session loop); this crate collapses both maps, and the
//! "acked, waiting on a write/PUBREL" states they don't model at all, into
//! one closed tagged union per identifier, stored in a dense array indexed
//! by `PacketId::index`. No hashing, no runtime type probing.

use crate::puback::PublishAckPacket;
use crate::pubrec::PublishReceivedPacket;
use crate::qos::PacketId;

const TABLE_LEN: usize = u16::MAX as usize;

/// The state of a single packet identifier's QoS 1/2 handshake. See the
/// data model table in the crate-level docs for the full transition table.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentifierState {
    /// No exchange in progress for this id.
    Absent,

    /// QoS 1 PUBLISH received, not yet acked by the application.
    Qos1Pending,

    /// QoS 2 PUBLISH received, PUBREC not yet sent.
    Qos2Pending,

    /// PUBACK built and cached; may still be queued for write or already
    /// flushed. Retransmitted verbatim on a duplicate PUBLISH.
    Qos1Acked(PublishAckPacket),

    /// PUBREC built and cached; awaiting PUBREL.
    Qos2Acked(PublishReceivedPacket),
}

impl IdentifierState {
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, IdentifierState::Absent)
    }

    /// Whether this state belongs to the QoS 1 track (`Qos1Pending` or
    /// `Qos1Acked`).
    #[must_use]
    pub const fn is_qos1(&self) -> bool {
        matches!(self, IdentifierState::Qos1Pending | IdentifierState::Qos1Acked(_))
    }

    /// Whether this state belongs to the QoS 2 track (`Qos2Pending` or
    /// `Qos2Acked`).
    #[must_use]
    pub const fn is_qos2(&self) -> bool {
        matches!(self, IdentifierState::Qos2Pending | IdentifierState::Qos2Acked(_))
    }

    /// Whether this identifier counts against the Receive Maximum window
    /// (§I4): only the two "pending application ack" states do.
    #[must_use]
    pub const fn counts_against_window(&self) -> bool {
        matches!(
            self,
            IdentifierState::Qos1Pending | IdentifierState::Qos2Pending
        )
    }
}

/// Dense `1..=65535` mapping from packet identifier to [`IdentifierState`].
///
/// Single-threaded: every method takes `&mut self` and is meant to be called
/// only from the I/O event loop that owns the
/// [`crate::handler::IncomingQosHandler`]. There is no internal locking.
pub struct StateTable {
    slots: Box<[IdentifierState]>,
    in_flight: usize,
}

impl StateTable {
    #[must_use]
    pub fn new() -> Self {
        StateTable {
            slots: (0..TABLE_LEN).map(|_| IdentifierState::Absent).collect(),
            in_flight: 0,
        }
    }

    /// Count of identifiers currently in `Qos1Pending` or `Qos2Pending`,
    /// i.e. the count the Receive Maximum caps (§I4).
    #[must_use]
    pub const fn in_flight(&self) -> usize {
        self.in_flight
    }

    #[must_use]
    pub fn get(&self, id: PacketId) -> &IdentifierState {
        &self.slots[id.index()]
    }

    /// Atomically substitutes `new_state` for the current state of `id`,
    /// returning the previous state.
    pub fn get_and_set(&mut self, id: PacketId, new_state: IdentifierState) -> IdentifierState {
        let new_counts = new_state.counts_against_window();
        let previous = std::mem::replace(&mut self.slots[id.index()], new_state);
        self.adjust_in_flight(previous.counts_against_window(), new_counts);
        previous
    }

    /// Removes `id` from the table, returning its previous state.
    pub fn remove(&mut self, id: PacketId) -> IdentifierState {
        self.get_and_set(id, IdentifierState::Absent)
    }

    /// Unconditionally overwrites the state of `id`. Used to revert a
    /// rejected transition back to the state it had before the rejected
    /// event was processed (§4.3.2's "revert").
    pub fn put(&mut self, id: PacketId, state: IdentifierState) {
        let _ = self.get_and_set(id, state);
    }

    fn adjust_in_flight(&mut self, previous_counted: bool, current_counted: bool) {
        match (previous_counted, current_counted) {
            (false, true) => self.in_flight += 1,
            (true, false) => self.in_flight -= 1,
            _ => {}
        }
    }

    /// Clears every slot. Called on transport disconnect (§5).
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = IdentifierState::Absent;
        }
        self.in_flight = 0;
    }
}

impl Default for StateTable {
    fn default() -> Self {
        Self::new()
    }
}
