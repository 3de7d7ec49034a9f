use std::fmt;

use crate::error::{Error, Result};

/// Host and port split out of a `host:port` address string.
///
/// Derived, never stored in a config: dial and listen recompute it from the configured
/// address each time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedAddress {
    pub host: String,
    pub port: u16,
}

impl ResolvedAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Same host, different port. Used when a listener was configured with port 0 and the
    /// operating system picked the real one.
    pub fn with_port(&self, port: u16) -> Self {
        Self::new(self.host.clone(), port)
    }
}

impl fmt::Display for ResolvedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Splits `address` on its first `:`. The rest must be a decimal port.
///
/// Bracketed IPv6 literals are not supported: `[::1]:80` splits at the first colon inside
/// the brackets and fails.
pub fn resolve(address: &str) -> Result<ResolvedAddress> {
    let malformed = || Error::MalformedAddress(address.to_string());

    let (host, port) = address.split_once(':').ok_or_else(malformed)?;
    if host.is_empty() || port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let port = port.parse::<u16>().map_err(|_| malformed())?;

    Ok(ResolvedAddress::new(host, port))
}
