//! Per-kind node handlers.
//!
//! One module per node kind, each owning its config shape and execute
//! function:
//!
//! - **question**: the user's answer, normalized and validated
//! - **compute**: one derived value from a sandboxed script
//! - **branch**: condition-driven successor routing
//! - **template**: document rendering with unresolved-placeholder warnings
//! - **http**: external API calls with retry and backoff

pub mod branch;
pub mod compute;
pub mod http;
pub mod question;
pub mod template;
