use super::ProviderError;
use std::sync::{Arc, Mutex};

/// The `(provider, credential)` tuple a client is bound to.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderKey {
    /// Provider name.
    pub provider: String,
    /// Credential presented to the provider.
    pub credential: String,
}

impl ProviderKey {
    /// Build a key from its parts.
    pub fn new(provider: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            credential: credential.into(),
        }
    }
}

impl std::fmt::Debug for ProviderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderKey")
            .field("provider", &self.provider)
            .field("credential", &"<redacted>")
            .finish()
    }
}

struct Slot<C> {
    key: ProviderKey,
    client: Arc<C>,
}

/// Holds at most one live client together with the key it was built for.
///
/// The compare-and-rebuild step runs under a single lock, so callers never observe a key paired
/// with a client built for a different credential.
pub struct ProviderCache<C> {
    slot: Mutex<Option<Slot<C>>>,
}

impl<C> Default for ProviderCache<C> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<C> ProviderCache<C> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached client when `key` matches, otherwise build, swap in, and return a new one.
    ///
    /// A failed build leaves the previous entry in place.
    pub fn get_or_build<F>(&self, key: ProviderKey, build: F) -> Result<Arc<C>, ProviderError>
    where
        F: FnOnce(&ProviderKey) -> Result<C, ProviderError>,
    {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(current) = slot.as_ref()
            && current.key == key
        {
            return Ok(Arc::clone(&current.client));
        }

        let client = Arc::new(build(&key)?);
        tracing::info!(
            provider = %key.provider,
            replaced = slot.is_some(),
            "Provider client rebuilt for new credentials"
        );
        *slot = Some(Slot {
            key,
            client: Arc::clone(&client),
        });
        Ok(client)
    }

    /// Key of the currently cached client, if any.
    pub fn current_key(&self) -> Option<ProviderKey> {
        let slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.as_ref().map(|current| current.key.clone())
    }
}
