//! Wire types for the evently event-management API.
//!
//! Everything the client sends to or receives from the remote API lives
//! here, so the session layer and the query engine agree on one shape per
//! resource. Field names follow the server's camelCase JSON; dates are
//! RFC 3339 UTC timestamps.

pub mod auth;
pub mod event;

pub use auth::{DeleteConfirmation, LoginRequest, LoginResponse, RegisterRequest};
pub use event::{Event, EventDraft, EventStatus, Thumbnail};
