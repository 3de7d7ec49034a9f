use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::darkstar::DarkStar;
use crate::error::{Error, Result};
use crate::handshake::HandshakeProvider;

/// Cipher name of the DarkStar handshake.
pub const DARKSTAR: &str = "darkstar";

/// Maps cipher names to handshake providers. Adding a cipher means registering a provider
/// here; the dial and accept paths only ever look providers up.
#[derive(Clone)]
pub struct CipherRegistry {
    providers: HashMap<String, Arc<dyn HandshakeProvider>>,
}

impl CipherRegistry {
    /// A registry with no ciphers at all.
    pub fn empty() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Registers `provider` under `name`, returning whatever was registered there before.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        provider: Arc<dyn HandshakeProvider>,
    ) -> Option<Arc<dyn HandshakeProvider>> {
        self.providers.insert(name.into(), provider)
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn HandshakeProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::InvalidCipher(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }
}

impl Default for CipherRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(DARKSTAR, Arc::new(DarkStar));
        registry
    }
}

impl fmt::Debug for CipherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.providers.keys().collect();
        names.sort();
        f.debug_struct("CipherRegistry")
            .field("ciphers", &names)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_has_darkstar_only() {
        let registry = CipherRegistry::default();
        assert!(registry.contains(DARKSTAR));
        assert_eq!(registry.lookup(DARKSTAR).unwrap().name(), "darkstar");
        assert!(matches!(
            registry.lookup("aes-128-gcm"),
            Err(Error::InvalidCipher(ref name)) if name == "aes-128-gcm"
        ));
    }

    #[test]
    fn register_replaces() {
        let mut registry = CipherRegistry::empty();
        assert!(!registry.contains(DARKSTAR));
        assert!(registry.register(DARKSTAR, Arc::new(DarkStar)).is_none());
        assert!(registry.register(DARKSTAR, Arc::new(DarkStar)).is_some());
    }
}
