//! Core data models for the bug tracker.
//!
//! Row types map to SQLite tables via `sqlx::FromRow`. The outward JSON
//! shapes live in [`representations`] and are built by the service layer.

pub mod activity;
pub mod bug;
pub mod choices;
pub mod comment;
pub mod inputs;
pub mod project;
pub mod representations;
pub mod user;
