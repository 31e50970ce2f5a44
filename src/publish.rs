// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use std::sync::Arc;

use crate::qos::{PacketId, QoS};

/// The decoded, payload-bearing part of a PUBLISH packet.
///
/// This is the part of the message an application actually cares about; it
/// carries no protocol bookkeeping (no packet id, no DUP flag) because those
/// belong to a particular *delivery attempt*, not to the message itself.
#[derive(Debug, Clone, PartialEq)]
pub struct StatelessPublish {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

impl StatelessPublish {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        StatelessPublish {
            topic: topic.into(),
            payload: payload.into(),
            retain: false,
        }
    }
}

/// A decoded PUBLISH packet as received from the broker, carrying the
/// protocol state this handler needs: QoS level, packet identifier (`0` for
/// QoS 0), and the DUP flag.
///
/// The DUP flag MUST be set to 1 by the broker when it attempts to
/// re-deliver a PUBLISH packet, and MUST be 0 for all QoS 0 messages and for
/// the first attempt at any QoS 1/2 message. This handler relies on that
/// invariant to distinguish a legitimate resend from a protocol violation
/// (see [`crate::handler::IncomingQosHandler`], §I3).
#[derive(Debug, Clone, PartialEq)]
pub struct StatefulPublish {
    qos: QoS,
    packet_id: Option<PacketId>,
    dup: bool,
    message: Arc<StatelessPublish>,
}

impl StatefulPublish {
    #[must_use]
    pub fn new_qos0(message: StatelessPublish) -> Self {
        StatefulPublish {
            qos: QoS::AtMostOnce,
            packet_id: None,
            dup: false,
            message: Arc::new(message),
        }
    }

    #[must_use]
    pub fn new(qos: QoS, packet_id: PacketId, dup: bool, message: StatelessPublish) -> Self {
        assert_ne!(qos, QoS::AtMostOnce, "QoS 0 publishes carry no packet id");
        StatefulPublish {
            qos,
            packet_id: Some(packet_id),
            dup,
            message: Arc::new(message),
        }
    }

    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }

    /// Packet identifier of this delivery attempt. `None` iff `qos()` is
    /// [`QoS::AtMostOnce`].
    #[must_use]
    pub const fn packet_id(&self) -> Option<PacketId> {
        self.packet_id
    }

    #[must_use]
    pub const fn dup(&self) -> bool {
        self.dup
    }

    #[must_use]
    pub fn message(&self) -> &StatelessPublish {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::{StatefulPublish, StatelessPublish};
    use crate::qos::{PacketId, QoS};

    #[test]
    fn qos0_has_no_packet_id() {
        let publish = StatefulPublish::new_qos0(StatelessPublish::new("a/b", b"hi".to_vec()));
        assert_eq!(publish.packet_id(), None);
        assert_eq!(publish.qos(), QoS::AtMostOnce);
    }

    #[test]
    fn qos1_carries_packet_id_and_dup() {
        let publish = StatefulPublish::new(
            QoS::AtLeastOnce,
            PacketId::new(7),
            true,
            StatelessPublish::new("a/b", b"hi".to_vec()),
        );
        assert_eq!(publish.packet_id(), Some(PacketId::new(7)));
        assert!(publish.dup());
    }
}
