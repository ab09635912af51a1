//! Data models for care team resources.
//!
//! - `TeamData`, `Member`: team membership and the current user's role
//! - `Task`, `Routine`, `Note`: mutable list resources keyed by `id`
//! - `Mood`: append-only mood log entries
//!
//! Every model keeps fields it does not know about in `extra`, so a value read
//! from the server and written back to disk loses nothing.

mod lenient;
pub mod mood;
pub mod note;
pub mod routine;
pub mod task;
pub mod team;

pub use mood::Mood;
pub use note::Note;
pub use routine::Routine;
pub use task::{Task, TaskStatus};
pub use team::{Member, Team, TeamData};

/// A list item addressed by a server-assigned identifier.
pub trait Record: Clone + serde::Serialize + serde::de::DeserializeOwned + Send + 'static {
    fn id(&self) -> &str;
}
