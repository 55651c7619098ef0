//! State module for tracking harvest progress
//!
//! # Components
//!
//! - `CategoryState`: lifecycle of a category (discovered, paginating, fetching, aggregating, outcome)
//! - `TaskState`: lifecycle of a single page task (queued, running, settled)

mod category_state;
mod task_state;

pub use category_state::CategoryState;
pub use task_state::TaskState;
