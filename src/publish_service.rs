// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The publish service adapter boundary (§4.2): a façade over whatever
//! downstream pipeline ultimately dispatches publishes to subscriber
//! callbacks. This crate owns no opinion about that pipeline; it only needs
//! to know whether a publish was admitted into the receive window.

use crate::publish::StatefulPublish;

/// Hands a received publish to the downstream consumer and reports whether
/// it fit within the current receive window.
///
/// Implementations must not block: `offer` may buffer the publish
/// internally (e.g. hand it to a bounded channel and return immediately),
/// but must not synchronously wait for the application to drain it.
///
/// Duplicates never reach this trait: [`crate::handler::IncomingQosHandler`]
/// recognizes a resend by consulting the identifier state table first, and
/// only calls `offer` for a genuinely new reception (§4.2, "Ordering").
pub trait PublishService: Send {
    /// Returns `false` iff accepting `publish` would take the in-flight
    /// count above `receive_maximum`. On `true`, the publish is now owned by
    /// the downstream pipeline, which will eventually call back with
    /// `ack(publish)`.
    fn offer(&mut self, publish: &StatefulPublish, receive_maximum: u16) -> bool;
}

#[cfg(any(test, feature = "test-utils"))]
pub mod test_doubles {
    use super::PublishService;
    use crate::publish::StatefulPublish;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Inner {
        offered: Vec<StatefulPublish>,
        capacity: Option<usize>,
    }

    /// Admits every publish unconditionally, up to a configurable capacity.
    /// Used by handler tests that don't care about the publish service's own
    /// internals, only about whether the handler asked it for admission.
    ///
    /// Cheaply cloneable, like [`crate::transport::test_doubles::FakeTransport`]:
    /// one clone is boxed and handed to `attach`, another is kept by the test
    /// to observe admissions from outside the handler's event loop.
    #[derive(Clone, Default)]
    pub struct FakePublishService {
        inner: Arc<Mutex<Inner>>,
    }

    impl FakePublishService {
        pub fn with_capacity(capacity: usize) -> Self {
            let service = FakePublishService::default();
            service.inner.lock().unwrap().capacity = Some(capacity);
            service
        }

        pub fn offered(&self) -> Vec<StatefulPublish> {
            self.inner.lock().unwrap().offered.clone()
        }

        pub fn offered_count(&self) -> usize {
            self.inner.lock().unwrap().offered.len()
        }
    }

    impl PublishService for FakePublishService {
        fn offer(&mut self, publish: &StatefulPublish, _receive_maximum: u16) -> bool {
            let mut inner = self.inner.lock().unwrap();
            if let Some(capacity) = inner.capacity {
                if inner.offered.len() >= capacity {
                    return false;
                }
            }
            inner.offered.push(publish.clone());
            true
        }
    }
}
