//! Change feed for one service.
//!
//! [`Watcher`] produces [`WatchBatch`]es from the store; [`Merger`] folds
//! them into the current instance set. Resolvers pair one of each.

mod merger;
mod update;
mod watcher;

pub use merger::*;
pub use update::*;
pub use watcher::*;
