// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Interceptor hooks (§4.3.6): advanced client configuration may supply user
//! code that mutates an acknowledgement builder in place before it is frozen
//! by `build()`. Absence of configuration means the defaults in
//! [`crate::puback`], [`crate::pubrec`] and [`crate::pubcomp`] apply as-is.

use crate::puback::PublishAckBuilder;
use crate::pubcomp::PublishCompleteBuilder;
use crate::pubrec::PublishReceivedBuilder;
use crate::publish::StatelessPublish;
use crate::pubrel::PublishReleasePacket;

/// Read-only view of whatever client configuration is live when an
/// interceptor runs. Loading and owning the actual configuration is an
/// external collaborator's job (§1); this crate only passes a reference
/// through.
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig<'a> {
    client_id: &'a str,
}

impl<'a> ClientConfig<'a> {
    #[must_use]
    pub const fn new(client_id: &'a str) -> Self {
        ClientConfig { client_id }
    }

    #[must_use]
    pub const fn client_id(&self) -> &'a str {
        self.client_id
    }
}

/// Customizes the PUBACK built for an acknowledged QoS 1 PUBLISH.
///
/// Invoked synchronously inside the `ack` path (§4.3.4), after the
/// identifier state has already been committed to `Qos1Pending` but before
/// the PUBACK is cached and written. Implementations must not retain the
/// builder past the call.
pub trait Qos1Interceptor: Send + Sync {
    fn on_publish(
        &self,
        client_config: ClientConfig<'_>,
        publish: &StatelessPublish,
        builder: &mut PublishAckBuilder,
    );
}

/// Customizes both halves of the QoS 2 exchange this handler drives: the
/// PUBREC built on `ack`, and the PUBCOMP built on inbound PUBREL.
pub trait Qos2Interceptor: Send + Sync {
    fn on_publish(
        &self,
        client_config: ClientConfig<'_>,
        publish: &StatelessPublish,
        builder: &mut PublishReceivedBuilder,
    );

    fn on_pubrel(
        &self,
        client_config: ClientConfig<'_>,
        pubrel: &PublishReleasePacket,
        builder: &mut PublishCompleteBuilder,
    );
}

#[cfg(any(test, feature = "test-utils"))]
pub mod test_doubles {
    use super::{ClientConfig, Qos1Interceptor, Qos2Interceptor};
    use crate::puback::PublishAckBuilder;
    use crate::pubcomp::PublishCompleteBuilder;
    use crate::pubrec::PublishReceivedBuilder;
    use crate::publish::StatelessPublish;
    use crate::pubrel::PublishReleasePacket;

    /// Stamps a fixed reason string onto every builder it sees, so tests can
    /// assert the interceptor actually ran rather than the defaults holding
    /// by coincidence.
    pub struct TaggingInterceptor {
        pub tag: &'static str,
    }

    impl Qos1Interceptor for TaggingInterceptor {
        fn on_publish(
            &self,
            _client_config: ClientConfig<'_>,
            _publish: &StatelessPublish,
            builder: &mut PublishAckBuilder,
        ) {
            builder.set_reason_string(self.tag);
        }
    }

    impl Qos2Interceptor for TaggingInterceptor {
        fn on_publish(
            &self,
            _client_config: ClientConfig<'_>,
            _publish: &StatelessPublish,
            builder: &mut PublishReceivedBuilder,
        ) {
            builder.set_reason_string(self.tag);
        }

        fn on_pubrel(
            &self,
            _client_config: ClientConfig<'_>,
            _pubrel: &PublishReleasePacket,
            builder: &mut PublishCompleteBuilder,
        ) {
            builder.set_reason_string(self.tag);
        }
    }
}
