//! Eventsync - registry synchronization worker
//!
//! Subscribes to the resource event exchange and keeps an in-process
//! registry of phrases and snippets in step with the resource store.
//!
//! ## Architecture
//! ```text
//! [eventbus.exchange] -> [worker queue] -> ChannelBinder -> EventDispatcher
//!                                                                |
//!                                                                v
//!                          [resource store] <-- load -- RegistrySync
//!                                                                |
//!                                              register / index  v
//!                                                   [registry] [serving index]
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod registry;
pub mod sync;
pub mod utils;
pub mod worker;

pub use error::{Result, SyncError, WorkerError};
