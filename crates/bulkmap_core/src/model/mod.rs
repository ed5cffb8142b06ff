//! Domain-side mapping model.
//!
//! # Responsibility
//! - Define the value representation exchanged with mapped types.
//! - Define how a type declares its table mapping.
//!
//! # Invariants
//! - Mapped types are plain data holders; the mapper only touches them
//!   through declared getters and setters.

pub mod entity;
pub mod value;
