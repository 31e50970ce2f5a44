// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use std::fmt::{self, Display};

/// Represent the types of errors this crate reports back to its caller.
///
/// Protocol violations observed on the wire are *not* represented here: they
/// are logged and resolved by emitting a DISCONNECT (see
/// [`crate::disconnect`]), not by returning a `Result`. Only misuse of the
/// handler's own API surfaces as an [`Error`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// `attach` was called on a handler that already holds a transport
    /// context.
    AlreadyAttached,

    /// An inbound event or `ack` was delivered to a handler that has no
    /// transport context attached.
    NotAttached,

    /// `HandlerConfig` was built with a Receive Maximum of zero, which MQTT 5
    /// never allows.
    InvalidReceiveMaximum,

    /// The ack mailbox's I/O-loop side has been dropped.
    MailboxClosed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    /// Type of current error.
    kind: ErrorKind,

    /// Detail message about this error.
    message: String,
}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind, message: &str) -> Self {
        Error {
            kind,
            message: message.to_owned(),
        }
    }

    #[must_use]
    pub fn from_string(kind: ErrorKind, message: String) -> Self {
        Error { kind, message }
    }

    #[must_use]
    pub const fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}
