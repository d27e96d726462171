//! Chime is an event reminder engine.
//!
//! # Features
//!
//! - Due reminder detection over a lookahead window
//! - At-most-once delivery across overlapping, stateless invocations
//!     - claims with leases in a delivery ledger
//!     - stale results are discarded at commit
//! - Push delivery
//!     - Web Push (VAPID, RFC 8291 encryption)
//!     - Firebase Cloud Messaging
//!     - invalid device tokens are pruned
//! - Named entry points for periodic and event-write triggers

// Re-export shared types and adapter traits from chime-types
pub use chime_types::error;
pub use chime_types::event_adapter;
pub use chime_types::hasher;
pub use chime_types::ledger_adapter;
pub use chime_types::push_gateway;
pub use chime_types::token_adapter;
pub use chime_types::types;

// Feature crate re-exports
pub use chime_core::memory;
pub use chime_core::registry;
pub use chime_core::settings;
pub use chime_push as push;
pub use chime_reminder as reminder;

// Local modules
pub mod app;
pub mod prelude;

pub use crate::app::{App, AppBuilder, Engine};

// vim: ts=4
