// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::properties::Properties;
use crate::pubrel::PublishReleasePacket;
use crate::qos::PacketId;
use crate::reason_code::ReasonCode;

/// Completes a QoS 2 exchange; the fourth and final packet.
///
/// Unlike PUBACK/PUBREC, a PUBCOMP is never cached for retransmission: once
/// it is written, the identifier is already gone from the state table
/// (§4.3.5), and a resent PUBREL (after the PUBCOMP was lost) is answered
/// idempotently with a fresh PUBCOMP carrying
/// [`ReasonCode::PacketIdentifierNotFound`] rather than a cached one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishCompletePacket {
    packet_id: PacketId,
    reason_code: ReasonCode,
    properties: Properties,
}

impl PublishCompletePacket {
    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    #[must_use]
    pub const fn reason_code(&self) -> ReasonCode {
        self.reason_code
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }
}

/// Single-use builder for a [`PublishCompletePacket`], handed to the QoS 2
/// interceptor's `onPubRel` hook along with the inbound [`PublishReleasePacket`].
#[derive(Debug)]
pub struct PublishCompleteBuilder {
    packet_id: PacketId,
    reason_code: ReasonCode,
    properties: Properties,
}

impl PublishCompleteBuilder {
    #[must_use]
    pub(crate) fn new(packet_id: PacketId, reason_code: ReasonCode) -> Self {
        debug_assert!(
            ReasonCode::PUBLISH_COMPLETE_REASONS.contains(&reason_code),
            "{reason_code:?} is not a valid PUBCOMP reason code",
        );
        PublishCompleteBuilder {
            packet_id,
            reason_code,
            properties: Properties::new(),
        }
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    #[must_use]
    pub const fn reason_code(&self) -> ReasonCode {
        self.reason_code
    }

    pub fn set_reason_code(&mut self, reason_code: ReasonCode) -> &mut Self {
        debug_assert!(
            ReasonCode::PUBLISH_COMPLETE_REASONS.contains(&reason_code),
            "{reason_code:?} is not a valid PUBCOMP reason code",
        );
        self.reason_code = reason_code;
        self
    }

    pub fn set_reason_string(&mut self, reason_string: impl Into<String>) -> &mut Self {
        self.properties.set_reason_string(reason_string);
        self
    }

    pub fn add_user_property(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.properties.add_user_property(key, value);
        self
    }

    #[must_use]
    pub fn build(self) -> PublishCompletePacket {
        PublishCompletePacket {
            packet_id: self.packet_id,
            reason_code: self.reason_code,
            properties: self.properties,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PublishCompleteBuilder;
    use crate::qos::PacketId;
    use crate::reason_code::ReasonCode;

    #[test]
    fn idempotent_replay_uses_packet_identifier_not_found() {
        let packet =
            PublishCompleteBuilder::new(PacketId::new(5), ReasonCode::PacketIdentifierNotFound)
                .build();
        assert_eq!(packet.reason_code(), ReasonCode::PacketIdentifierNotFound);
    }
}
