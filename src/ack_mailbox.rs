// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The cross-thread `ack` entry point (§5, "Cross-thread entry"): a mailbox
//! that lets application code on any thread request an acknowledgement
//! without ever touching the identifier state table directly.
//!
//! Modeled after this lineage's `Sender`/`Receiver`-per-command channel
//! pairs (see `listener::ListenerToSessionCmd` and friends): one bounded
//! `mpsc` channel, a cheaply-cloneable sending half handed out to every
//! thread that may call `ack`, and a single receiving half owned by the
//! I/O loop that drives [`crate::handler::IncomingQosHandler`].

use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::error::{Error, ErrorKind};
use crate::publish::StatefulPublish;

const CHANNEL_CAPACITY: usize = 16;

/// The application-facing handle. Cheap to clone; safe to hold on any
/// thread. `ack` enqueues and returns immediately — it never blocks on the
/// I/O loop (§5).
#[derive(Clone)]
pub struct AckMailbox {
    sender: Sender<StatefulPublish>,
}

impl AckMailbox {
    /// Requests an acknowledgement for `publish`. Ordering of multiple
    /// calls for distinct ids from the same sender is preserved across the
    /// hand-off, because a bounded mpsc channel is FIFO (§9, "Ack on
    /// another thread").
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::MailboxClosed`] if the I/O loop has already
    /// dropped its receiving half (the handler detached or the connection's
    /// task exited).
    pub fn ack(&self, publish: StatefulPublish) -> Result<(), Error> {
        self.sender.try_send(publish).map_err(|_| {
            Error::new(
                ErrorKind::MailboxClosed,
                "ack mailbox receiver has been dropped",
            )
        })
    }
}

/// The I/O-loop-owned half. Never cloned, never sent across threads on its
/// own; only [`AckReceiver::recv`] is ever called, from inside the loop
/// that also owns the [`crate::handler::IncomingQosHandler`].
pub struct AckReceiver {
    receiver: Receiver<StatefulPublish>,
}

impl AckReceiver {
    pub async fn recv(&mut self) -> Option<StatefulPublish> {
        self.receiver.recv().await
    }
}

/// Creates a fresh mailbox pair for one connection's lifetime. A new pair
/// is created on every attach; stale senders from a previous connection
/// simply fail with `MailboxClosed` once their receiver is gone.
#[must_use]
pub fn channel() -> (AckMailbox, AckReceiver) {
    let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
    (AckMailbox { sender }, AckReceiver { receiver })
}
