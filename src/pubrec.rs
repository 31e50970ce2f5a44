// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::properties::Properties;
use crate::qos::PacketId;
use crate::reason_code::ReasonCode;

/// Acknowledges a PUBLISH received at QoS 2; the second packet of the QoS 2
/// exchange. Cached in the identifier state table (`Qos2Acked`) until the
/// matching PUBREL arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceivedPacket {
    packet_id: PacketId,
    reason_code: ReasonCode,
    properties: Properties,
}

impl PublishReceivedPacket {
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

/// Single-use builder for a [`PublishReceivedPacket`], handed to the QoS 2
/// interceptor's `onPublish` hook.
#[derive(Debug)]
pub struct PublishReceivedBuilder {
    packet_id: PacketId,
    reason_code: ReasonCode,
    properties: Properties,
}

impl PublishReceivedBuilder {
    #[must_use]
    pub(crate) fn new(packet_id: PacketId) -> Self {
        PublishReceivedBuilder {
            packet_id,
            reason_code: ReasonCode::Success,
            properties: Properties::new(),
        }
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    pub fn set_reason_code(&mut self, reason_code: ReasonCode) -> &mut Self {
        debug_assert!(
            ReasonCode::PUBLISH_RECEIVED_REASONS.contains(&reason_code),
            "{reason_code:?} is not a valid PUBREC reason code",
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
    pub fn build(self) -> PublishReceivedPacket {
        PublishReceivedPacket {
            packet_id: self.packet_id,
            reason_code: self.reason_code,
            properties: self.properties,
        }
    }
}
