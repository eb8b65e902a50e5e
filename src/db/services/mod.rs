//! The `services` module is the persistence facade: the only code that
//! creates or updates rows. HTTP handlers and the capture workflow call into
//! it instead of issuing queries themselves.
//!
//! Each sub-module covers one entity. Functions take any sea-orm
//! `ConnectionTrait` so they run equally on a pooled connection or inside a
//! transaction.

pub mod capture_service;
pub mod plant_service;
pub mod preset_service;
pub mod recipe_service;
pub mod user_service;
