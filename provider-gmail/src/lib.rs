//! # Gmail Provider
//!
//! Minimal read-only client for the Gmail REST API v1.
//!
//! ## Overview
//!
//! This module provides:
//! - Bounded inbox listing with From / Subject / Date headers
//! - Single message lookup by id
//! - Fan-out of per-message metadata requests with a concurrency cap
//!
//! Tokens come from a [`core_auth::TokenProvider`], so an expired access
//! token is refreshed before the first request goes out.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{GmailConnector, GMAIL_API_BASE, MAX_RESULTS_LIMIT};
pub use error::{GmailError, Result};
pub use types::{MessageHeader, ResourceSummary};
