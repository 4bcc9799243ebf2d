use super::{Settings, SettingsError, SettingsStore};
use async_trait::async_trait;
use std::sync::RwLock;

/// Settings row held in process memory.
#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    row: RwLock<Settings>,
}

impl InMemorySettingsStore {
    /// Start from the supplied row.
    pub fn new(settings: Settings) -> Self {
        Self {
            row: RwLock::new(settings),
        }
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn get(&self) -> Result<Settings, SettingsError> {
        let guard = self.row.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(guard.clone())
    }

    async fn update(&self, settings: Settings) -> Result<(), SettingsError> {
        settings.validate()?;
        let mut guard = self.row.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = settings;
        Ok(())
    }
}
