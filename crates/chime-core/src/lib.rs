//! Core infrastructure for the Chime reminder engine.
//!
//! This crate holds what the feature crates share: the application state
//! with its adapters, the configuration layer, the retry policy, the
//! registry of named entry points, and in-memory adapter implementations.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod app;
pub mod memory;
pub mod prelude;
pub mod push_router;
pub mod registry;
pub mod retry;
pub mod settings;

pub use app::{App, AppState, VERSION};
pub use push_router::PushRouter;
pub use registry::{BoxFuture, EntryPointFn, EntryPointRegistry, Invocation, InvocationReport, Trigger};
pub use retry::RetryPolicy;
pub use settings::ReminderConfig;

// vim: ts=4
