// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The incoming QoS handler (§4.3): the state machine binding identifier
//! state to wire events, producing acknowledgement packets, invoking
//! interceptors, and issuing protocol-violation disconnects.
//!
//! This is the component the other modules in this crate exist to serve:
//! [`crate::state`] is its data structure, [`crate::publish_service`] and
//! [`crate::transport`] are the collaborators it calls out to,
//! [`crate::interceptor`] is what it calls into, and [`crate::ack_mailbox`]
//! is how application code on another thread reaches it at all.

use tokio::sync::mpsc::Receiver;
use tokio::task::JoinSet;

use crate::ack_mailbox::AckReceiver;
use crate::config::HandlerConfig;
use crate::disconnect::DisconnectPacket;
use crate::error::{Error, ErrorKind};
use crate::interceptor::ClientConfig;
use crate::puback::{PublishAckBuilder, PublishAckPacket};
use crate::pubcomp::{PublishCompleteBuilder, PublishCompletePacket};
use crate::publish::StatefulPublish;
use crate::publish_service::PublishService;
use crate::pubrec::{PublishReceivedBuilder, PublishReceivedPacket};
use crate::pubrel::PublishReleasePacket;
use crate::qos::{PacketId, QoS};
use crate::reason_code::ReasonCode;
use crate::state::{IdentifierState, StateTable};
use crate::transport::Transport;

/// The three inbound event kinds this handler recognizes (§6). Anything
/// else the decoder produces is forwarded unchanged up the pipeline and
/// never reaches this crate.
pub enum InboundEvent {
    Publish(StatefulPublish),
    PublishRelease(PublishReleasePacket),
    /// The transport dropped the connection. `client_disconnected` reflects
    /// whether the client's *overall* lifecycle (owned elsewhere) has
    /// reached a fully-disconnected state; only then are in-flight publish
    /// flows failed (§4.3.7).
    TransportDisconnected { client_disconnected: bool },
}

/// The downstream collaborator that owns in-flight publish flow bookkeeping
/// (retries, completion futures handed to application code, and so on).
/// This handler only ever tells it to give up on everything at once.
pub trait PublishFlowRegistry: Send {
    fn fail_all(&mut self, reason: &str);
}

struct AttachedContext {
    transport: Box<dyn Transport>,
    publish_service: Box<dyn PublishService>,
    flow_registry: Box<dyn PublishFlowRegistry>,
    ack_receiver: AckReceiver,
    table: StateTable,
    config: HandlerConfig,
    pending_puback_writes: JoinSet<(PacketId, bool)>,
    stopped: bool,
}

enum Lifecycle {
    Detached,
    Attached(AttachedContext),
}

/// The per-connection protocol state machine. Non-shareable: holds
/// per-connection state and must be attached to at most one transport
/// pipeline at a time (§5, "Shared state").
pub struct IncomingQosHandler {
    lifecycle: Lifecycle,
}

impl IncomingQosHandler {
    #[must_use]
    pub fn new() -> Self {
        IncomingQosHandler {
            lifecycle: Lifecycle::Detached,
        }
    }

    /// The reusability predicate (§9, "Handler reusability"): `true` only
    /// when no transport context is attached.
    #[must_use]
    pub fn is_ready_to_attach(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Detached)
    }

    /// Attaches this handler to a freshly connected transport. Reads
    /// `receiveMaximum` and the advanced interceptor configuration out of
    /// `config` once, at attach time (§6, "Configuration surface").
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::AlreadyAttached`] if this handler already holds
    /// a transport context.
    pub fn attach(
        &mut self,
        transport: Box<dyn Transport>,
        publish_service: Box<dyn PublishService>,
        flow_registry: Box<dyn PublishFlowRegistry>,
        ack_receiver: AckReceiver,
        config: HandlerConfig,
    ) -> Result<(), Error> {
        if !self.is_ready_to_attach() {
            return Err(Error::new(
                ErrorKind::AlreadyAttached,
                "handler already holds a transport context",
            ));
        }
        self.lifecycle = Lifecycle::Attached(AttachedContext {
            transport,
            publish_service,
            flow_registry,
            ack_receiver,
            table: StateTable::new(),
            config,
            pending_puback_writes: JoinSet::new(),
            stopped: false,
        });
        Ok(())
    }

    /// Releases the transport context, making this handler ready to attach
    /// again. Does not clear the state table by itself; callers that detach
    /// without having already processed a `TransportDisconnected` event are
    /// responsible for that distinction (normally `run` never returns
    /// without having seen one).
    pub fn detach(&mut self) {
        self.lifecycle = Lifecycle::Detached;
    }

    /// Drives the handler until the attached transport disconnects, the
    /// inbound channel closes, or a protocol violation triggers a
    /// client-originated DISCONNECT. Serializes three event sources onto
    /// one cooperative loop, exactly as §5 requires: decoded inbound
    /// packets, application `ack` calls hopped in from other threads via
    /// the mailbox, and PUBACK write-completion notifications.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NotAttached`] if called before `attach`.
    pub async fn run(&mut self, inbound: &mut Receiver<InboundEvent>) -> Result<(), Error> {
        if !matches!(self.lifecycle, Lifecycle::Attached(_)) {
            return Err(Error::new(
                ErrorKind::NotAttached,
                "run called before attach",
            ));
        }

        loop {
            enum LoopEvent {
                Inbound(Option<InboundEvent>),
                Ack(Option<StatefulPublish>),
                PubAckWriteComplete(PacketId, bool),
            }

            let event = {
                let ctx = match &mut self.lifecycle {
                    Lifecycle::Attached(ctx) => ctx,
                    Lifecycle::Detached => return Ok(()),
                };
                tokio::select! {
                    maybe_event = inbound.recv() => LoopEvent::Inbound(maybe_event),
                    maybe_ack = ctx.ack_receiver.recv() => LoopEvent::Ack(maybe_ack),
                    Some(joined) = ctx.pending_puback_writes.join_next(), if !ctx.pending_puback_writes.is_empty() => {
                        match joined {
                            Ok((id, success)) => LoopEvent::PubAckWriteComplete(id, success),
                            Err(_) => continue,
                        }
                    }
                }
            };

            let ctx = match &mut self.lifecycle {
                Lifecycle::Attached(ctx) => ctx,
                Lifecycle::Detached => return Ok(()),
            };

            match event {
                LoopEvent::Inbound(Some(inbound_event)) => ctx.handle_inbound(inbound_event),
                LoopEvent::Inbound(None) => return Ok(()),
                LoopEvent::Ack(Some(publish)) => ctx.handle_ack(publish),
                LoopEvent::Ack(None) => {}
                LoopEvent::PubAckWriteComplete(id, success) => {
                    ctx.handle_puback_write_complete(id, success);
                }
            }

            let stopped = ctx.stopped;
            if stopped {
                self.lifecycle = Lifecycle::Detached;
                return Ok(());
            }
        }
    }
}

impl Default for IncomingQosHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl AttachedContext {
    fn handle_inbound(&mut self, event: InboundEvent) {
        if self.stopped {
            return;
        }
        match event {
            InboundEvent::Publish(publish) => self.handle_publish(publish),
            InboundEvent::PublishRelease(pubrel) => self.handle_pubrel(pubrel),
            InboundEvent::TransportDisconnected { client_disconnected } => {
                self.handle_transport_disconnected(client_disconnected);
            }
        }
    }

    /// §4.3.1–§4.3.3: inbound PUBLISH, dispatched by QoS level.
    fn handle_publish(&mut self, publish: StatefulPublish) {
        match publish.qos() {
            // §4.3.1: QoS 0 bypasses the state table entirely. The return
            // value is ignored; this is the acknowledged flow-control gap
            // (§9, Open Questions).
            QoS::AtMostOnce => {
                log::trace!("offering QoS 0 publish on topic {:?}", publish.message().topic);
                let _ = self
                    .publish_service
                    .offer(&publish, self.config.receive_maximum().get());
            }
            QoS::AtLeastOnce => self.handle_publish_qos1(publish),
            QoS::ExactOnce => self.handle_publish_qos2(publish),
        }
    }

    /// §4.3.2.
    fn handle_publish_qos1(&mut self, publish: StatefulPublish) {
        let id = publish
            .packet_id()
            .expect("QoS 1 PUBLISH always carries a packet id");
        let prev = self.table.get_and_set(id, IdentifierState::Qos1Pending);

        match prev {
            IdentifierState::Absent => {
                let receive_maximum = self.config.receive_maximum().get();
                if self.publish_service.offer(&publish, receive_maximum) {
                    log::debug!("admitted new QoS 1 publish, id={}", id.get());
                } else {
                    log::error!(
                        "Receive Maximum exceeded admitting QoS 1 publish, id={}",
                        id.get()
                    );
                    self.disconnect(
                        ReasonCode::ReceiveMaximumExceeded,
                        "Receive Maximum exceeded",
                    );
                }
            }
            IdentifierState::Qos1Pending => {
                if publish.dup() {
                    log::warn!(
                        "dropping duplicate QoS 1 publish, id={} (still pending application ack)",
                        id.get()
                    );
                } else {
                    log::error!(
                        "QoS 1 publish resent without DUP flag set, id={}",
                        id.get()
                    );
                    self.table.put(id, IdentifierState::Qos1Pending);
                    self.disconnect(
                        ReasonCode::ProtocolError,
                        "DUP flag must be set for a resent QoS 1 PUBLISH",
                    );
                }
            }
            IdentifierState::Qos1Acked(ack) => {
                if publish.dup() {
                    log::warn!("retransmitting cached PUBACK, id={}", id.get());
                    let retransmit = ack.clone();
                    self.table.put(id, IdentifierState::Qos1Acked(ack));
                    self.submit_puback_write(retransmit);
                } else {
                    log::error!(
                        "QoS 1 publish resent without DUP flag set, id={}",
                        id.get()
                    );
                    self.table.put(id, IdentifierState::Qos1Acked(ack));
                    self.disconnect(
                        ReasonCode::ProtocolError,
                        "DUP flag must be set for a resent QoS 1 PUBLISH",
                    );
                }
            }
            reverted @ (IdentifierState::Qos2Pending | IdentifierState::Qos2Acked(_)) => {
                log::error!(
                    "QoS 1 publish reused an id already holding QoS 2 state, id={}",
                    id.get()
                );
                self.table.put(id, reverted);
                self.disconnect(
                    ReasonCode::ProtocolError,
                    "QoS 1 PUBLISH must not be received with the same packet identifier as a QoS 2 PUBLISH",
                );
            }
        }
    }

    /// §4.3.3: symmetric to QoS 1 with the QoS 2 states swapped in.
    fn handle_publish_qos2(&mut self, publish: StatefulPublish) {
        let id = publish
            .packet_id()
            .expect("QoS 2 PUBLISH always carries a packet id");
        let prev = self.table.get_and_set(id, IdentifierState::Qos2Pending);

        match prev {
            IdentifierState::Absent => {
                let receive_maximum = self.config.receive_maximum().get();
                if self.publish_service.offer(&publish, receive_maximum) {
                    log::debug!("admitted new QoS 2 publish, id={}", id.get());
                } else {
                    log::error!(
                        "Receive Maximum exceeded admitting QoS 2 publish, id={}",
                        id.get()
                    );
                    self.disconnect(
                        ReasonCode::ReceiveMaximumExceeded,
                        "Receive Maximum exceeded",
                    );
                }
            }
            IdentifierState::Qos2Pending => {
                if publish.dup() {
                    log::warn!(
                        "dropping duplicate QoS 2 publish, id={} (PUBREC not yet sent)",
                        id.get()
                    );
                } else {
                    log::error!(
                        "QoS 2 publish resent without DUP flag set, id={}",
                        id.get()
                    );
                    self.table.put(id, IdentifierState::Qos2Pending);
                    self.disconnect(
                        ReasonCode::ProtocolError,
                        "DUP flag must be set for a resent QoS 2 PUBLISH",
                    );
                }
            }
            IdentifierState::Qos2Acked(pubrec) => {
                if publish.dup() {
                    log::warn!("retransmitting cached PUBREC, id={}", id.get());
                    self.table
                        .put(id, IdentifierState::Qos2Acked(pubrec.clone()));
                    if !self.transport.submit_pubrec(pubrec) {
                        log::warn!(
                            "could not enqueue PUBREC retransmit, id={} (transport already gone)",
                            id.get()
                        );
                    }
                } else {
                    log::error!(
                        "QoS 2 publish resent without DUP flag set, id={}",
                        id.get()
                    );
                    self.table.put(id, IdentifierState::Qos2Acked(pubrec));
                    self.disconnect(
                        ReasonCode::ProtocolError,
                        "DUP flag must be set for a resent QoS 2 PUBLISH",
                    );
                }
            }
            reverted @ (IdentifierState::Qos1Pending | IdentifierState::Qos1Acked(_)) => {
                log::error!(
                    "QoS 2 publish reused an id already holding QoS 1 state, id={}",
                    id.get()
                );
                self.table.put(id, reverted);
                self.disconnect(
                    ReasonCode::ProtocolError,
                    "QoS 2 PUBLISH must not be received with the same packet identifier as a QoS 1 PUBLISH",
                );
            }
        }
    }

    /// §4.3.4: the effect of an application `ack` call once it has reached
    /// the I/O loop.
    fn handle_ack(&mut self, publish: StatefulPublish) {
        if self.stopped {
            return;
        }
        match publish.qos() {
            QoS::AtMostOnce => {}
            QoS::AtLeastOnce => self.ack_qos1(publish),
            QoS::ExactOnce => self.ack_qos2(publish),
        }
    }

    fn ack_qos1(&mut self, publish: StatefulPublish) {
        let id = publish
            .packet_id()
            .expect("QoS 1 ack always carries a packet id");
        let packet = self.build_puback(&publish, id);
        log::debug!("application acked QoS 1 publish, id={}; writing PUBACK", id.get());
        self.table.put(id, IdentifierState::Qos1Acked(packet.clone()));
        self.submit_puback_write(packet);
    }

    fn ack_qos2(&mut self, publish: StatefulPublish) {
        let id = publish
            .packet_id()
            .expect("QoS 2 ack always carries a packet id");
        let packet = self.build_pubrec(&publish, id);
        log::debug!("application acked QoS 2 publish, id={}; writing PUBREC", id.get());
        self.table
            .put(id, IdentifierState::Qos2Acked(packet.clone()));
        // Fire-and-forget (§6): the table entry lives on until PUBREL.
        if !self.transport.submit_pubrec(packet) {
            log::warn!(
                "could not enqueue PUBREC write, id={} (transport already gone)",
                id.get()
            );
        }
    }

    fn build_puback(&self, publish: &StatefulPublish, packet_id: PacketId) -> PublishAckPacket {
        let mut builder = PublishAckBuilder::new(packet_id);
        if let Some(interceptor) = self.config.advanced().qos1_interceptor() {
            let client_config = ClientConfig::new(self.config.client_id());
            interceptor.on_publish(client_config, publish.message(), &mut builder);
        }
        builder.build()
    }

    fn build_pubrec(&self, publish: &StatefulPublish, packet_id: PacketId) -> PublishReceivedPacket {
        let mut builder = PublishReceivedBuilder::new(packet_id);
        if let Some(interceptor) = self.config.advanced().qos2_interceptor() {
            let client_config = ClientConfig::new(self.config.client_id());
            interceptor.on_publish(client_config, publish.message(), &mut builder);
        }
        builder.build()
    }

    fn build_pubcomp(
        &self,
        pubrel: &PublishReleasePacket,
        packet_id: PacketId,
        reason_code: ReasonCode,
    ) -> PublishCompletePacket {
        let mut builder = PublishCompleteBuilder::new(packet_id, reason_code);
        if let Some(interceptor) = self.config.advanced().qos2_interceptor() {
            let client_config = ClientConfig::new(self.config.client_id());
            interceptor.on_pubrel(client_config, pubrel, &mut builder);
        }
        builder.build()
    }

    /// Submits a PUBACK write and tracks its completion. The same path
    /// serves both a fresh ack and a DUP retransmit (§I5): the transport
    /// cannot tell them apart, and neither does the table.
    fn submit_puback_write(&mut self, packet: PublishAckPacket) {
        let id = packet.packet_id();
        let completion = self.transport.submit_puback(packet);
        self.pending_puback_writes.spawn(async move {
            let success = completion.await.unwrap_or(false);
            (id, success)
        });
    }

    /// §4.3.4: PUBACK write-completion handling.
    fn handle_puback_write_complete(&mut self, id: PacketId, success: bool) {
        if success {
            log::debug!("PUBACK write completed, id={}; clearing table entry", id.get());
            self.table.remove(id);
        } else {
            log::warn!(
                "PUBACK write failed for packet id {}; leaving the cached ack in place for the broker's retransmit",
                id.get()
            );
        }
    }

    /// §4.3.5: inbound PUBREL.
    fn handle_pubrel(&mut self, pubrel: PublishReleasePacket) {
        if self.stopped {
            return;
        }
        let id = pubrel.packet_id();
        let prev = self.table.remove(id);

        match prev {
            IdentifierState::Qos2Acked(_) => {
                log::debug!("PUBREL received, id={}; writing PUBCOMP(success)", id.get());
                let packet = self.build_pubcomp(&pubrel, id, ReasonCode::Success);
                self.transport.submit_pubcomp(packet);
            }
            IdentifierState::Absent => {
                // Idempotent replay: the PUBCOMP we sent before was lost.
                log::warn!(
                    "PUBREL replay for id={} after the original PUBCOMP was presumably lost; \
                     answering idempotently",
                    id.get()
                );
                let packet = self.build_pubcomp(&pubrel, id, ReasonCode::PacketIdentifierNotFound);
                self.transport.submit_pubcomp(packet);
            }
            reverted @ IdentifierState::Qos2Pending => {
                log::error!(
                    "PUBREL received before any PUBREC was sent, id={}",
                    id.get()
                );
                self.table.put(id, reverted);
                self.disconnect(
                    ReasonCode::ProtocolError,
                    "PUBREL received for an id with no PUBREC sent yet",
                );
            }
            reverted @ (IdentifierState::Qos1Pending | IdentifierState::Qos1Acked(_)) => {
                log::error!(
                    "PUBREL received for an id holding QoS 1 state, id={}",
                    id.get()
                );
                self.table.put(id, reverted);
                self.disconnect(
                    ReasonCode::ProtocolError,
                    "PUBREL received for an id holding QoS 1 state",
                );
            }
        }
    }

    /// §4.3.7: client-originated DISCONNECT on a protocol or flow-control
    /// violation.
    fn disconnect(&mut self, reason_code: ReasonCode, reason_string: &'static str) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        log::warn!("disconnecting: {reason_string} ({reason_code:?})");
        let packet = DisconnectPacket::new(reason_code, reason_string);
        self.transport.submit_disconnect(packet);
    }

    /// §4.3.7, transport disconnect branch.
    fn handle_transport_disconnected(&mut self, client_disconnected: bool) {
        self.stopped = true;
        self.table.clear();
        if client_disconnected {
            self.flow_registry.fail_all("transport disconnected");
        }
    }
}
