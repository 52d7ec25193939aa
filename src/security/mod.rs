//! Security analysis: privacy-reduced device snapshots and heuristic
//! suspect scoring.

mod snapshot;
mod suspect;

pub use snapshot::*;
pub use suspect::*;
