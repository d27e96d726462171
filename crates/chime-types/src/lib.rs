//! Shared types, adapter traits, and core utilities for the Chime reminder engine.
//!
//! This crate contains the foundational types that are shared between the
//! engine crates and all adapter implementations. Adapters depend only on this
//! crate, so they compile in parallel with the scheduling and dispatch logic.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod error;
pub mod event_adapter;
pub mod hasher;
pub mod ledger_adapter;
pub mod prelude;
pub mod push_gateway;
pub mod token_adapter;
pub mod types;

// vim: ts=4
