//! Workspace umbrella crate.
//!
//! Re-exports the `core-service` façade so host applications can depend on
//! `maildesk` alone and pick bridges through the documented features.

pub use core_service::*;
