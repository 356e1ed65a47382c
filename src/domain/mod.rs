//! Domain layer types and invariants.

pub mod entities;
pub mod extent;
pub mod geometry;
pub mod i18n;
pub mod types;
