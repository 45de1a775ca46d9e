//! Prompt history budgeting.
//!
//! Pure functions that decide which prior turns are replayed to the model
//! under an entry-count limit and a byte ceiling.

mod budget;

pub use budget::{
    estimate_history_entry_size, plan_history, select_history_for_prompt, HistoryBudget,
    HistoryPlan, HistorySelection, ENTRY_OVERHEAD_BYTES,
};
