//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the authorization core and the mailbox
//! client:
//! - Logging and tracing setup
//! - Bridge configuration with desktop defaults
//! - Event bus for authorization state changes

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
