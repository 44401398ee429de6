//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements     | Connects to                  |
//! |----------------|----------------|------------------------------|
//! | `link`         | ExternalLink   | BMS message bus state        |
//! | `log_sink`     | EventSink      | `log` output                 |
//! | `memory_store` | ConfigPort     | in-memory postcard blob      |
//! | `time`         | -              | host monotonic clock         |
//!
//! The embedded-hal heater and input adapters live in
//! [`drivers`](crate::drivers).

pub mod link;
pub mod log_sink;
pub mod memory_store;
pub mod time;
