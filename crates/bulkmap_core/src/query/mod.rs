//! SQL assembly.
//!
//! # Responsibility
//! - Generate statement text for the canonical CRUD operations.
//! - Expand list-valued arguments in hand-written templates.

pub mod sql;
pub mod template;
