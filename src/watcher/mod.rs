//! File watching, debouncing and the publish trigger loop.
//!
//! # Architecture
//!
//! ```text
//! ChangeSource (NotifySource | PollSource)
//!         |  ChangeEvent
//!         v
//!     AllowList  -- unmatched paths dropped
//!         |  file name
//!         v
//! DebounceScheduler  -- one deadline per file
//!         |  settled file name
//!         v
//!   TriggerHandler (PublishHandler: encoding probe, then GitPublisher)
//! ```
//!
//! [`AutoPushWatcher`] owns the loop and ties the pieces together.

mod allow_list;
mod debouncer;
mod error;
mod handler;
mod orchestrator;
mod source;
mod state;

pub use allow_list::AllowList;
pub use debouncer::{Check, DebounceScheduler, Debouncer, Recorded};
pub use error::WatchError;
pub use handler::{PublishHandler, TriggerHandler};
pub use orchestrator::{AutoPushWatcher, AutoPushWatcherBuilder, WatchSummary};
pub use source::{ChangeEvent, ChangeSource, NotifySource, PollSource};
pub use state::{FileTable, WatchedFile};
