//! Sandboxed user scripts.
//!
//! This module runs workflow-author scripts:
//!
//! - **Runner**: one-shot evaluation with operation and wall-clock limits
//! - **Blocks**: phase-ordered transform blocks with per-block isolation

pub mod blocks;
pub mod runner;

pub use blocks::{BlockFailure, PhaseReport, TransformBlockRunner};
pub use runner::{ScriptError, ScriptRunner};
