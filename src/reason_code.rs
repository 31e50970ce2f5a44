// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

/// MQTT 5 reason codes relevant to the acknowledgement packets this handler
/// builds (PUBACK, PUBREC, PUBREL, PUBCOMP) and to client-originated
/// DISCONNECT.
///
/// Each acknowledgement packet type only accepts a subset of these; the
/// `_REASONS` const slices below document which, the way the reference v5
/// codec validates reason codes per packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ReasonCode {
    /// Used by PUBACK, PUBREC, PUBREL, PUBCOMP and DISCONNECT alike.
    #[default]
    Success = 0x00,

    /// DISCONNECT only: the client is disconnecting but wants its Will
    /// Message published.
    DisconnectWithWillMessage = 0x04,

    /// PUBACK / PUBREC only.
    NoMatchingSubscribers = 0x10,

    /// PUBACK / PUBREC / DISCONNECT.
    UnspecifiedError = 0x80,

    /// DISCONNECT only.
    MalformedPacket = 0x81,

    /// DISCONNECT only: the broker violated the MQTT 5 wire protocol.
    ProtocolError = 0x82,

    /// PUBACK / PUBREC / DISCONNECT.
    ImplementationSpecificError = 0x83,

    /// PUBACK / PUBREC / DISCONNECT.
    NotAuthorized = 0x87,

    /// DISCONNECT only.
    ServerBusy = 0x89,

    /// PUBACK / PUBREC / DISCONNECT.
    TopicNameInvalid = 0x90,

    /// PUBACK / PUBREC only: the packet id is already in use by another
    /// exchange of the *same* QoS level (not applicable to this handler,
    /// which treats same-level reuse as a DUP replay rather than an error).
    PacketIdentifierInUse = 0x91,

    /// PUBREL / PUBCOMP only: the identifier is not recognized. Used by this
    /// handler for the idempotent-replay case in §4.3.5.
    PacketIdentifierNotFound = 0x92,

    /// DISCONNECT only: the broker sent more unacknowledged QoS 1/2
    /// publishes than the negotiated Receive Maximum allows.
    ReceiveMaximumExceeded = 0x93,

    /// PUBACK / PUBREC / DISCONNECT.
    QuotaExceeded = 0x97,

    /// PUBACK / PUBREC only.
    PayloadFormatInvalid = 0x99,
}

impl ReasonCode {
    /// Reason codes a PUBACK packet built by this handler may carry.
    pub const PUBLISH_ACK_REASONS: &'static [ReasonCode] = &[
        ReasonCode::Success,
        ReasonCode::NoMatchingSubscribers,
        ReasonCode::UnspecifiedError,
        ReasonCode::ImplementationSpecificError,
        ReasonCode::NotAuthorized,
        ReasonCode::TopicNameInvalid,
        ReasonCode::QuotaExceeded,
        ReasonCode::PayloadFormatInvalid,
    ];

    /// Reason codes a PUBREC packet built by this handler may carry.
    pub const PUBLISH_RECEIVED_REASONS: &'static [ReasonCode] = Self::PUBLISH_ACK_REASONS;

    /// Reason codes a PUBCOMP packet built by this handler may carry.
    pub const PUBLISH_COMPLETE_REASONS: &'static [ReasonCode] =
        &[ReasonCode::Success, ReasonCode::PacketIdentifierNotFound];

    /// Reason codes a client-originated DISCONNECT may carry.
    pub const DISCONNECT_REASONS: &'static [ReasonCode] = &[
        ReasonCode::Success,
        ReasonCode::UnspecifiedError,
        ReasonCode::MalformedPacket,
        ReasonCode::ProtocolError,
        ReasonCode::ImplementationSpecificError,
        ReasonCode::NotAuthorized,
        ReasonCode::ReceiveMaximumExceeded,
    ];

    /// Size of the reason code field on the wire. Kept as a named constant,
    /// matching the reference codec, even though this crate never encodes
    /// bytes itself: it keeps the acknowledgement packets' `bytes()`
    /// estimates (used by the fake transport in tests) accurate.
    #[must_use]
    pub const fn bytes() -> usize {
        1
    }
}
