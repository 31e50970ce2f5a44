// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! End-to-end exercises of the public API: `attach` a handler to fake
//! collaborators, drive it with `run`, and feed it events the way a real
//! decoder and a real application would — through the actual channels,
//! not by reaching into private state.

use std::time::Duration;

use mqtt5_incoming_qos::ack_mailbox;
use mqtt5_incoming_qos::config::{HandlerConfig, ReceiveMaximum};
use mqtt5_incoming_qos::handler::{IncomingQosHandler, InboundEvent, PublishFlowRegistry};
use mqtt5_incoming_qos::publish::{StatefulPublish, StatelessPublish};
use mqtt5_incoming_qos::publish_service::test_doubles::FakePublishService;
use mqtt5_incoming_qos::pubrel::PublishReleasePacket;
use mqtt5_incoming_qos::qos::{PacketId, QoS};
use mqtt5_incoming_qos::reason_code::ReasonCode;
use mqtt5_incoming_qos::transport::test_doubles::FakeTransport;
use tokio::sync::mpsc;

struct NoopFlowRegistry;

impl PublishFlowRegistry for NoopFlowRegistry {
    fn fail_all(&mut self, _reason: &str) {}
}

fn qos1_publish(id: u16) -> StatefulPublish {
    qos1_publish_with_dup(id, false)
}

fn qos1_publish_with_dup(id: u16, dup: bool) -> StatefulPublish {
    StatefulPublish::new(
        QoS::AtLeastOnce,
        PacketId::new(id),
        dup,
        StatelessPublish::new("sensors/temp", b"21.5".to_vec()),
    )
}

fn qos2_publish(id: u16) -> StatefulPublish {
    StatefulPublish::new(
        QoS::ExactOnce,
        PacketId::new(id),
        false,
        StatelessPublish::new("sensors/temp", b"21.5".to_vec()),
    )
}

/// Builds a handler attached to fresh fakes and a live inbound channel,
/// spawned onto its own task via `run`. Every end-to-end scenario test
/// drives the handler only through this channel and the returned
/// `ack_mailbox`/fakes, never through private fields.
struct Harness {
    transport: FakeTransport,
    publish_service: FakePublishService,
    ack_mailbox: ack_mailbox::AckMailbox,
    inbound_tx: mpsc::Sender<InboundEvent>,
    run_task: tokio::task::JoinHandle<IncomingQosHandler>,
}

fn spawn_harness(client_id: &str, receive_maximum: u16) -> Harness {
    let _ = env_logger::try_init();

    let mut handler = IncomingQosHandler::new();
    let transport = FakeTransport::new();
    let publish_service = FakePublishService::with_capacity(usize::from(receive_maximum));
    let (ack_mailbox, ack_receiver) = ack_mailbox::channel();
    let mut config = HandlerConfig::new(client_id);
    config.set_receive_maximum(ReceiveMaximum::new(receive_maximum).unwrap());

    handler
        .attach(
            Box::new(transport.clone()),
            Box::new(publish_service.clone()),
            Box::new(NoopFlowRegistry),
            ack_receiver,
            config,
        )
        .unwrap();

    let (inbound_tx, mut inbound_rx) = mpsc::channel(16);
    let run_task = tokio::spawn(async move {
        handler.run(&mut inbound_rx).await.unwrap();
        handler
    });

    Harness {
        transport,
        publish_service,
        ack_mailbox,
        inbound_tx,
        run_task,
    }
}

/// Polls `condition` until it's true or `timeout` elapses, failing the test
/// on timeout. Used instead of a fixed sleep to synchronize with a
/// `run`-driven handler spawned on another task.
async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {timeout:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Scenario 1, driven end-to-end: a real `mpsc` inbound channel, a real
/// `ack_mailbox` crossing into the handler's `run` loop from a separate
/// task (simulating the application's execution context), and a real
/// PUBACK write-completion round trip.
#[tokio::test]
async fn happy_qos1_end_to_end() {
    let h = spawn_harness("sensor-client-1", 10);

    h.inbound_tx
        .send(InboundEvent::Publish(qos1_publish(7)))
        .await
        .unwrap();

    // The handler must have admitted the publish before the application can
    // have anything to ack; wait for that rather than racing the two.
    wait_until(Duration::from_secs(1), || h.publish_service.offered_count() == 1).await;

    // The application acks from what is, in a real client, a different
    // thread entirely; a spawned task stands in for that here.
    let acker = h.ack_mailbox.clone();
    tokio::task::spawn_blocking(move || acker.ack(qos1_publish(7)).unwrap())
        .await
        .unwrap();

    wait_until(Duration::from_secs(1), || !h.transport.pubacks().is_empty()).await;
    assert_eq!(h.transport.pubacks()[0].reason_code(), ReasonCode::Success);

    h.transport.complete_oldest_puback_write(true);

    // Closing the inbound channel is how a real decoder shuts the loop
    // down; `run` drains anything already buffered before observing it.
    drop(h.inbound_tx);
    drop(h.ack_mailbox);
    let _handler = h.run_task.await.unwrap();

    assert!(h.transport.disconnects().is_empty());
}

/// Scenario 2, driven end-to-end: the broker resends PUBLISH(id=7, DUP=1)
/// before the application has acked the first delivery.
#[tokio::test]
async fn resend_before_ack_is_not_reoffered_end_to_end() {
    let h = spawn_harness("sensor-client-2", 10);

    h.inbound_tx
        .send(InboundEvent::Publish(qos1_publish_with_dup(7, false)))
        .await
        .unwrap();
    wait_until(Duration::from_secs(1), || h.publish_service.offered_count() == 1).await;

    h.inbound_tx
        .send(InboundEvent::Publish(qos1_publish_with_dup(7, true)))
        .await
        .unwrap();

    // Give the resend a chance to reach the loop; it must be dropped
    // silently rather than offered a second time.
    tokio::time::sleep(Duration::from_millis(50)).await;

    drop(h.inbound_tx);
    drop(h.ack_mailbox);
    let _handler = h.run_task.await.unwrap();

    assert_eq!(h.publish_service.offered_count(), 1);
    assert!(h.transport.pubacks().is_empty());
    assert!(h.transport.disconnects().is_empty());
}

/// Scenario 3, driven end-to-end: the broker resends PUBLISH(id=7) without
/// setting DUP, which is a protocol violation.
#[tokio::test]
async fn resend_missing_dup_disconnects_end_to_end() {
    let h = spawn_harness("sensor-client-3", 10);

    h.inbound_tx
        .send(InboundEvent::Publish(qos1_publish_with_dup(7, false)))
        .await
        .unwrap();
    wait_until(Duration::from_secs(1), || h.publish_service.offered_count() == 1).await;

    h.inbound_tx
        .send(InboundEvent::Publish(qos1_publish_with_dup(7, false)))
        .await
        .unwrap();
    wait_until(Duration::from_secs(1), || !h.transport.disconnects().is_empty()).await;

    drop(h.inbound_tx);
    drop(h.ack_mailbox);
    let handler = h.run_task.await.unwrap();

    let disconnects = h.transport.disconnects();
    assert_eq!(disconnects.len(), 1);
    assert_eq!(disconnects[0].reason_code(), ReasonCode::ProtocolError);
    assert!(handler.is_ready_to_attach());
}

/// Scenario 4, driven end-to-end: a QoS 1 PUBLISH reuses an id already
/// holding acked QoS 2 state.
#[tokio::test]
async fn cross_qos_id_clash_disconnects_end_to_end() {
    let h = spawn_harness("sensor-client-4", 10);

    h.inbound_tx
        .send(InboundEvent::Publish(qos2_publish(3)))
        .await
        .unwrap();
    wait_until(Duration::from_secs(1), || h.publish_service.offered_count() == 1).await;

    let acker = h.ack_mailbox.clone();
    tokio::task::spawn_blocking(move || acker.ack(qos2_publish(3)).unwrap())
        .await
        .unwrap();
    wait_until(Duration::from_secs(1), || !h.transport.pubrecs().is_empty()).await;

    h.inbound_tx
        .send(InboundEvent::Publish(qos1_publish(3)))
        .await
        .unwrap();
    wait_until(Duration::from_secs(1), || !h.transport.disconnects().is_empty()).await;

    drop(h.inbound_tx);
    drop(h.ack_mailbox);
    let handler = h.run_task.await.unwrap();

    let disconnects = h.transport.disconnects();
    assert_eq!(disconnects.len(), 1);
    assert_eq!(disconnects[0].reason_code(), ReasonCode::ProtocolError);
    assert!(handler.is_ready_to_attach());
}

/// Scenario 5, driven end-to-end: PUBREL(id=5) arrives before the
/// application has acked the QoS 2 PUBLISH, i.e. before any PUBREC was
/// ever sent.
#[tokio::test]
async fn pubrel_before_pubrec_disconnects_end_to_end() {
    let h = spawn_harness("sensor-client-5", 10);

    h.inbound_tx
        .send(InboundEvent::Publish(qos2_publish(5)))
        .await
        .unwrap();
    wait_until(Duration::from_secs(1), || h.publish_service.offered_count() == 1).await;

    h.inbound_tx
        .send(InboundEvent::PublishRelease(PublishReleasePacket::new(
            PacketId::new(5),
            ReasonCode::Success,
        )))
        .await
        .unwrap();
    wait_until(Duration::from_secs(1), || !h.transport.disconnects().is_empty()).await;

    drop(h.inbound_tx);
    drop(h.ack_mailbox);
    let handler = h.run_task.await.unwrap();

    let disconnects = h.transport.disconnects();
    assert_eq!(disconnects.len(), 1);
    assert_eq!(disconnects[0].reason_code(), ReasonCode::ProtocolError);
    assert!(handler.is_ready_to_attach());
}

/// Scenario 6, driven end-to-end: three QoS 1 publishes against a Receive
/// Maximum of 2, with no acks in between.
#[tokio::test]
async fn receive_maximum_exceeded_end_to_end() {
    let h = spawn_harness("sensor-client-6", 2);

    for id in [1_u16, 2, 3] {
        h.inbound_tx
            .send(InboundEvent::Publish(qos1_publish(id)))
            .await
            .unwrap();
    }
    drop(h.inbound_tx);
    drop(h.ack_mailbox);

    let handler = h.run_task.await.unwrap();

    let disconnects = h.transport.disconnects();
    assert_eq!(disconnects.len(), 1);
    assert_eq!(disconnects[0].reason_code(), ReasonCode::ReceiveMaximumExceeded);
    assert!(handler.is_ready_to_attach());
}

/// Scenario 7, driven end-to-end: the broker resends PUBREL(id=5) because
/// the PUBCOMP that answered it the first time was lost in transit.
#[tokio::test]
async fn idempotent_pubrel_replay_after_pubcomp_lost_end_to_end() {
    let h = spawn_harness("sensor-client-7", 10);

    h.inbound_tx
        .send(InboundEvent::Publish(qos2_publish(5)))
        .await
        .unwrap();
    wait_until(Duration::from_secs(1), || h.publish_service.offered_count() == 1).await;

    let acker = h.ack_mailbox.clone();
    tokio::task::spawn_blocking(move || acker.ack(qos2_publish(5)).unwrap())
        .await
        .unwrap();
    wait_until(Duration::from_secs(1), || !h.transport.pubrecs().is_empty()).await;

    h.inbound_tx
        .send(InboundEvent::PublishRelease(PublishReleasePacket::new(
            PacketId::new(5),
            ReasonCode::Success,
        )))
        .await
        .unwrap();
    wait_until(Duration::from_secs(1), || !h.transport.pubcomps().is_empty()).await;
    assert_eq!(h.transport.pubcomps()[0].reason_code(), ReasonCode::Success);

    // The broker never saw the PUBCOMP and resends the PUBREL.
    h.inbound_tx
        .send(InboundEvent::PublishRelease(PublishReleasePacket::new(
            PacketId::new(5),
            ReasonCode::Success,
        )))
        .await
        .unwrap();
    wait_until(Duration::from_secs(1), || h.transport.pubcomps().len() == 2).await;

    drop(h.inbound_tx);
    drop(h.ack_mailbox);
    let handler = h.run_task.await.unwrap();

    assert!(h.transport.disconnects().is_empty());
    assert_eq!(
        h.transport.pubcomps()[1].reason_code(),
        ReasonCode::PacketIdentifierNotFound
    );
    assert!(handler.is_ready_to_attach());
}
