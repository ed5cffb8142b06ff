//! Mapping metadata and value converters.
//!
//! # Responsibility
//! - Build and cache one immutable descriptor per mapped type.
//! - Define the pluggable converter contracts attached to attributes.

pub mod converter;
pub mod registry;
