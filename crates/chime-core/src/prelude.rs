pub use crate::app::App;
pub use chime_types::error::{ChResult, Error};
pub use chime_types::types::{EventId, HolderId, TaskId, Timestamp, UserId};

pub use tracing::{debug, debug_span, error, error_span, info, info_span, warn, warn_span};

// vim: ts=4
