//! In-memory configuration store.
//!
//! Keeps the configuration as an opaque `postcard` blob, the same encoding a
//! flash-backed store writes. Used by the simulator and the tests.

use std::cell::RefCell;

use log::info;

use crate::app::ports::ConfigPort;
use crate::config::HeaterConfig;
use crate::error::ConfigError;

#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    blob: RefCell<Option<Vec<u8>>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `config`, without validation.
    pub fn with_config(config: &HeaterConfig) -> Result<Self, ConfigError> {
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::Io)?;
        Ok(Self {
            blob: RefCell::new(Some(bytes)),
        })
    }

    /// Replace the stored blob verbatim.
    pub fn overwrite_raw(&self, bytes: Vec<u8>) {
        *self.blob.borrow_mut() = Some(bytes);
    }
}

impl ConfigPort for MemoryConfigStore {
    fn load(&self) -> Result<HeaterConfig, ConfigError> {
        let blob = self.blob.borrow();
        let bytes = blob.as_deref().ok_or(ConfigError::NotFound)?;
        let cfg = postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
        info!("MemoryConfigStore: loaded config ({} bytes)", bytes.len());
        Ok(cfg)
    }

    fn save(&self, config: &HeaterConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::Io)?;
        info!("MemoryConfigStore: config saved ({} bytes)", bytes.len());
        *self.blob.borrow_mut() = Some(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wired() -> HeaterConfig {
        let mut c = HeaterConfig::default();
        c.output.pin = Some(25);
        c
    }

    #[test]
    fn empty_store_reports_not_found() {
        assert_eq!(MemoryConfigStore::new().load(), Err(ConfigError::NotFound));
    }

    #[test]
    fn save_then_load() {
        let store = MemoryConfigStore::new();
        let mut cfg = wired();
        cfg.pid.kp = 3.5;
        store.save(&cfg).unwrap();
        assert_eq!(store.load().unwrap(), cfg);
    }

    #[test]
    fn invalid_config_not_saved() {
        let store = MemoryConfigStore::new();
        assert!(matches!(
            store.save(&HeaterConfig::default()),
            Err(ConfigError::Invalid(_))
        ));
        assert_eq!(store.load(), Err(ConfigError::NotFound));
    }

    #[test]
    fn garbage_blob_is_corrupted() {
        let store = MemoryConfigStore::new();
        store.overwrite_raw(vec![0xff; 3]);
        assert_eq!(store.load(), Err(ConfigError::Corrupted));
    }
}
