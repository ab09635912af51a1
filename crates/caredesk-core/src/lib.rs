//! Client-side data layer for a care team coordination service.
//!
//! The centre of the crate is [`DataStore`]: a shared cache of each team's
//! members, tasks, routines, notes and moods that decides when cached data can
//! be trusted and when the backend has to be asked again.

pub mod actions;
pub mod api;
pub mod cache;
pub mod config;
pub mod models;

pub use actions::TeamActions;
pub use api::{ApiClient, ApiError};
pub use cache::{DataStore, ResourceKind, SnapshotFile};
pub use config::Config;
