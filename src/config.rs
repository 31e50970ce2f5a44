// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Configuration surface (§6, "Configuration surface"): the two values read
//! from the client's live connection configuration at attach time.

use std::sync::Arc;

use crate::error::{Error, ErrorKind};
use crate::interceptor::{Qos1Interceptor, Qos2Interceptor};

/// A validated, nonzero Receive Maximum (§3). MQTT 5 never allows zero here;
/// excluding it at the type boundary means the handler never has to check
/// for it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveMaximum(u16);

impl ReceiveMaximum {
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidReceiveMaximum`] if `value` is zero.
    pub fn new(value: u16) -> Result<Self, Error> {
        if value == 0 {
            return Err(Error::new(
                ErrorKind::InvalidReceiveMaximum,
                "Receive Maximum must be nonzero",
            ));
        }
        Ok(ReceiveMaximum(value))
    }

    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl Default for ReceiveMaximum {
    /// MQTT 5 defines the default Receive Maximum as 65535 when the CONNECT
    /// packet omits the property.
    fn default() -> Self {
        ReceiveMaximum(65535)
    }
}

/// The advanced-client data an embedding client may supply: up to one
/// interceptor per QoS level (§4.3.6). Absence of either means the default
/// builder behavior applies.
#[derive(Clone, Default)]
pub struct AdvancedConfig {
    qos1_interceptor: Option<Arc<dyn Qos1Interceptor>>,
    qos2_interceptor: Option<Arc<dyn Qos2Interceptor>>,
}

impl AdvancedConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_qos1_interceptor(&mut self, interceptor: Arc<dyn Qos1Interceptor>) -> &mut Self {
        self.qos1_interceptor = Some(interceptor);
        self
    }

    pub fn set_qos2_interceptor(&mut self, interceptor: Arc<dyn Qos2Interceptor>) -> &mut Self {
        self.qos2_interceptor = Some(interceptor);
        self
    }

    #[must_use]
    pub fn qos1_interceptor(&self) -> Option<&Arc<dyn Qos1Interceptor>> {
        self.qos1_interceptor.as_ref()
    }

    #[must_use]
    pub fn qos2_interceptor(&self) -> Option<&Arc<dyn Qos2Interceptor>> {
        self.qos2_interceptor.as_ref()
    }
}

/// Configuration read once, at attach time, from the client's current
/// connection configuration. Follows the same builder shape as this
/// lineage's `ConnectOptions`: private fields, `set_*` methods returning
/// `&mut Self`, plain getters.
#[derive(Clone, Default)]
pub struct HandlerConfig {
    client_id: String,
    receive_maximum: ReceiveMaximum,
    advanced: AdvancedConfig,
}

impl HandlerConfig {
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        HandlerConfig {
            client_id: client_id.into(),
            receive_maximum: ReceiveMaximum::default(),
            advanced: AdvancedConfig::default(),
        }
    }

    pub fn set_receive_maximum(&mut self, receive_maximum: ReceiveMaximum) -> &mut Self {
        self.receive_maximum = receive_maximum;
        self
    }

    #[must_use]
    pub const fn receive_maximum(&self) -> ReceiveMaximum {
        self.receive_maximum
    }

    pub fn set_advanced(&mut self, advanced: AdvancedConfig) -> &mut Self {
        self.advanced = advanced;
        self
    }

    #[must_use]
    pub const fn advanced(&self) -> &AdvancedConfig {
        &self.advanced
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

#[cfg(test)]
mod tests {
    use super::ReceiveMaximum;

    #[test]
    fn zero_is_rejected() {
        assert!(ReceiveMaximum::new(0).is_err());
    }

    #[test]
    fn default_is_max_u16() {
        assert_eq!(ReceiveMaximum::default().get(), 65535);
    }
}
