//! Device addressing.

use std::fmt;

/// Connection identifier routed with every facade call.
///
/// An address is a network host, optionally paired with an access key that
/// the transport presents when connecting. The key changes when the device
/// rotates its session, which is why reboots can move a device from one
/// address to another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceAddress {
    host: String,
    access_key: Option<String>,
}

impl DeviceAddress {
    /// Builds an address for the given host without an access key.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            access_key: None,
        }
    }

    /// Attaches an access key to the address.
    #[must_use]
    pub fn with_access_key(mut self, key: impl Into<String>) -> Self {
        self.access_key = Some(key.into());
        self
    }

    /// Network host of the device.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Access key presented to the transport, if any.
    #[must_use]
    pub fn access_key(&self) -> Option<&str> {
        self.access_key.as_deref()
    }
}

// The access key is a credential and never appears in logs or errors.
impl fmt::Display for DeviceAddress {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.access_key {
            Some(_) => write!(formatter, "{} (keyed)", self.host),
            None => formatter.write_str(&self.host),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DeviceAddress;

    #[test]
    fn display_hides_access_key() {
        let address = DeviceAddress::new("10.0.0.7").with_access_key("s3cret");
        assert_eq!(address.to_string(), "10.0.0.7 (keyed)");
        assert_eq!(address.access_key(), Some("s3cret"));
    }

    #[test]
    fn keyed_and_plain_addresses_differ() {
        let plain = DeviceAddress::new("10.0.0.7");
        let keyed = plain.clone().with_access_key("k");
        assert_ne!(plain, keyed);
        assert_eq!(plain.host(), keyed.host());
    }
}
