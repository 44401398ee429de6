//! Fuzz target: stored configuration blob decoding
//!
//! Feeds arbitrary bytes to `MemoryConfigStore` as if they had been read back
//! from flash and checks:
//! - No panics under any byte sequence
//! - A decoded blob either validates or is rejected with a named rule
//! - A decoded, valid config survives a save/load round trip unchanged
//!
//! cargo fuzz run fuzz_config_blob

#![no_main]

use frostguard::adapters::memory_store::MemoryConfigStore;
use frostguard::app::ports::ConfigPort;
use frostguard::error::ConfigError;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let store = MemoryConfigStore::new();
    store.overwrite_raw(data.to_vec());

    let Ok(cfg) = store.load() else {
        return;
    };
    match cfg.validate() {
        Ok(()) => {
            assert_eq!(store.save(&cfg), Ok(()));
            let again = store.load().expect("re-saved config must load");
            // Debug output, since NaN fields never compare equal.
            assert_eq!(format!("{again:?}"), format!("{cfg:?}"));
        }
        Err(e) => {
            assert!(matches!(e, ConfigError::Invalid(_)));
            assert!(store.save(&cfg).is_err(), "invalid config must not be stored");
        }
    }
});
