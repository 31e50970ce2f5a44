// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::properties::Properties;
use crate::qos::PacketId;
use crate::reason_code::ReasonCode;

/// Acknowledges a PUBLISH received at QoS 1.
///
/// Built once per identifier by [`crate::handler::IncomingQosHandler`] when
/// the application calls `ack`, then cached in the identifier state table
/// (`Qos1Acked`) so a broker resend before the write completes can be
/// answered with the *same* packet rather than a freshly built one (§I5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAckPacket {
    packet_id: PacketId,
    reason_code: ReasonCode,
    properties: Properties,
}

impl PublishAckPacket {
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

/// Single-use builder for a [`PublishAckPacket`].
///
/// Handed to the QoS 1 interceptor by exclusive reference; the interceptor
/// may set a reason code, a reason string and user properties, but cannot
/// retain the builder past the call (it is frozen by `build`, consuming
/// `self`).
#[derive(Debug)]
pub struct PublishAckBuilder {
    packet_id: PacketId,
    reason_code: ReasonCode,
    properties: Properties,
}

impl PublishAckBuilder {
    #[must_use]
    pub(crate) fn new(packet_id: PacketId) -> Self {
        PublishAckBuilder {
            packet_id,
            reason_code: ReasonCode::Success,
            properties: Properties::new(),
        }
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    /// Sets the reason code. Must be one of [`ReasonCode::PUBLISH_ACK_REASONS`].
    pub fn set_reason_code(&mut self, reason_code: ReasonCode) -> &mut Self {
        debug_assert!(
            ReasonCode::PUBLISH_ACK_REASONS.contains(&reason_code),
            "{reason_code:?} is not a valid PUBACK reason code",
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
    pub fn build(self) -> PublishAckPacket {
        PublishAckPacket {
            packet_id: self.packet_id,
            reason_code: self.reason_code,
            properties: self.properties,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PublishAckBuilder;
    use crate::qos::PacketId;
    use crate::reason_code::ReasonCode;

    #[test]
    fn defaults_to_success() {
        let packet = PublishAckBuilder::new(PacketId::new(7)).build();
        assert_eq!(packet.reason_code(), ReasonCode::Success);
        assert_eq!(packet.packet_id(), PacketId::new(7));
    }

    #[test]
    fn interceptor_can_set_reason_string() {
        let mut builder = PublishAckBuilder::new(PacketId::new(1));
        builder.set_reason_string("quota exceeded for this client");
        let packet = builder.build();
        assert_eq!(
            packet.properties().reason_string(),
            Some("quota exceeded for this client")
        );
    }
}
