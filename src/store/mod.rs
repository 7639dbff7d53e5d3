//! Store Module - run state management
//!
//! Thread-safe storage for task states during one run.
//! Uses DashMap for lock-free concurrent access.
//!
//! Key types:
//! - `StateStore`: task id → state
//! - `TaskState`: Pending, Running, Succeeded, Failed or Skipped

mod state;

pub use state::{StateStore, TaskState};
