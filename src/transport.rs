// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The outbound packet interface (§6): the four packet kinds this handler
//! ever writes, and the transport collaborator that accepts them.
//!
//! Encoding and the actual socket write are out of scope (§1); this trait is
//! the seam the real transport plugs into, the way [`crate::publish_service`]
//! is the seam the downstream dispatch pipeline plugs into.

use tokio::sync::oneshot;

use crate::disconnect::DisconnectPacket;
use crate::pubcomp::PublishCompletePacket;
use crate::puback::PublishAckPacket;
use crate::pubrec::PublishReceivedPacket;

/// Resolves once a submitted write either completes or the transport gives
/// up on it. `true` means the bytes were flushed to the broker.
pub type WriteCompletion = oneshot::Receiver<bool>;

/// The live connection a [`crate::handler::IncomingQosHandler`] writes
/// acknowledgements to.
///
/// All four `submit_*` methods must return without blocking: queuing the
/// packet for write is the transport's job, not this handler's (§5).
pub trait Transport: Send {
    /// Submits a PUBACK and returns a completion listener keyed by that
    /// packet (§6). The handler polls this to decide whether to clear the
    /// identifier state table entry (§4.3.4).
    fn submit_puback(&mut self, packet: PublishAckPacket) -> WriteCompletion;

    /// Fire-and-forget as far as the *write* is concerned: the handler
    /// never learns whether the bytes actually reached the broker. It still
    /// distinguishes "could not even enqueue the write" (`false`, e.g. the
    /// transport context was already torn down) from "enqueued" (`true`),
    /// so a lost enqueue can be logged rather than silently assumed to have
    /// gone out.
    fn submit_pubrec(&mut self, packet: PublishReceivedPacket) -> bool;

    /// Fire-and-forget, same as `submit_pubrec`.
    fn submit_pubcomp(&mut self, packet: PublishCompletePacket);

    /// Fire-and-forget: once a DISCONNECT is submitted the handler stops
    /// processing inbound packets regardless of whether the write actually
    /// reaches the broker (§4.3.7).
    fn submit_disconnect(&mut self, packet: DisconnectPacket);
}

#[cfg(any(test, feature = "test-utils"))]
pub mod test_doubles {
    use super::{Transport, WriteCompletion};
    use crate::disconnect::DisconnectPacket;
    use crate::pubcomp::PublishCompletePacket;
    use crate::puback::PublishAckPacket;
    use crate::pubrec::PublishReceivedPacket;
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    #[derive(Default)]
    struct Inner {
        pubacks: Vec<PublishAckPacket>,
        pubrecs: Vec<PublishReceivedPacket>,
        pubcomps: Vec<PublishCompletePacket>,
        disconnects: Vec<DisconnectPacket>,
        pending_completions: Vec<oneshot::Sender<bool>>,
        reject_pubrec_enqueue: bool,
    }

    /// Records every packet submitted to it and, for PUBACKs, holds on to
    /// the completion sender so a test can resolve it on demand.
    ///
    /// Cheaply cloneable: one clone is boxed and handed to `attach`, another
    /// is kept by the test for inspection. Both see the same recordings.
    #[derive(Clone, Default)]
    pub struct FakeTransport {
        inner: Arc<Mutex<Inner>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn pubacks(&self) -> Vec<PublishAckPacket> {
            self.inner.lock().unwrap().pubacks.clone()
        }

        pub fn pubrecs(&self) -> Vec<PublishReceivedPacket> {
            self.inner.lock().unwrap().pubrecs.clone()
        }

        pub fn pubcomps(&self) -> Vec<PublishCompletePacket> {
            self.inner.lock().unwrap().pubcomps.clone()
        }

        pub fn disconnects(&self) -> Vec<DisconnectPacket> {
            self.inner.lock().unwrap().disconnects.clone()
        }

        /// Resolves the oldest still-pending PUBACK write completion.
        pub fn complete_oldest_puback_write(&self, success: bool) {
            let sender = self.inner.lock().unwrap().pending_completions.remove(0);
            let _ = sender.send(success);
        }

        /// Makes every subsequent `submit_pubrec` report an enqueue failure
        /// without recording the packet, simulating a transport that has
        /// already torn down its write queue.
        pub fn reject_pubrec_enqueue(&self) {
            self.inner.lock().unwrap().reject_pubrec_enqueue = true;
        }
    }

    impl Transport for FakeTransport {
        fn submit_puback(&mut self, packet: PublishAckPacket) -> WriteCompletion {
            let (tx, rx) = oneshot::channel();
            let mut inner = self.inner.lock().unwrap();
            inner.pubacks.push(packet);
            inner.pending_completions.push(tx);
            rx
        }

        fn submit_pubrec(&mut self, packet: PublishReceivedPacket) -> bool {
            let mut inner = self.inner.lock().unwrap();
            if inner.reject_pubrec_enqueue {
                return false;
            }
            inner.pubrecs.push(packet);
            true
        }

        fn submit_pubcomp(&mut self, packet: PublishCompletePacket) {
            self.inner.lock().unwrap().pubcomps.push(packet);
        }

        fn submit_disconnect(&mut self, packet: DisconnectPacket) {
            self.inner.lock().unwrap().disconnects.push(packet);
        }
    }
}
