//! Reconciliation state for one bus subscription: merges replay and live
//! delivery into a single cursor-ordered view and folds streaming output
//! batches into stable, de-duplicated display records.

pub mod merge;
pub mod permissions;
pub mod project;
pub mod store;
pub mod tool_calls;

pub use merge::EventMerger;
pub use permissions::{PermissionLedger, PermissionRecord};
pub use project::{project, DisplayRecord};
pub use store::{ConnectionStatus, FeedStore, Listener, ListenerId};
pub use tool_calls::{fold, ToolCallLedger, ToolCallState};
