pub use chime_core::prelude::*;

// vim: ts=4
