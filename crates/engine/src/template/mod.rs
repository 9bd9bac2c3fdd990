//! Template rendering module.
//!
//! Provides Jinja2-style template rendering for formloom workflows.

pub mod jinja;

pub use jinja::TemplateRenderer;
