//! Size estimation and byte-budgeted history selection.

use serde::Serialize;
use serde_json::Value;

use crate::session::{HistoryEntry, ResponsePayload};

/// Fixed allowance per entry for the labels that frame it in a prompt.
pub const ENTRY_OVERHEAD_BYTES: usize = 1024;

/// Approximate prompt footprint of `entry` in bytes.
pub fn estimate_history_entry_size(entry: &HistoryEntry) -> usize {
    let request = &entry.request;
    let mut size = ENTRY_OVERHEAD_BYTES;

    size += entry.brief.as_deref().map_or(0, str::len);
    size += request.method.len();
    size += request.path.len();
    size += pretty_len(&request.query);
    size += pretty_len(&request.body);
    size += request.instructions.as_deref().map_or(0, str::len);
    size += match &entry.response {
        ResponsePayload::Html(html) => html.len(),
        ResponsePayload::Json(value) => pretty_len(value),
    };
    size += entry.usage.as_ref().map_or(0, pretty_len);
    size += entry
        .rest
        .as_ref()
        .and_then(|rest| rest.raw_response.as_deref())
        .map_or(0, str::len);

    size
}

fn pretty_len(value: &Value) -> usize {
    serde_json::to_string_pretty(value).map_or(0, |s| s.len())
}

/// Entries chosen for the prompt and what was left out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistorySelection {
    /// Selected entries in chronological order.
    pub entries: Vec<HistoryEntry>,
    /// Estimated size of `entries`.
    pub bytes: usize,
    pub omitted_entries: usize,
    pub omitted_bytes: usize,
}

/// Select the most recent entries whose combined size fits in `max_bytes`.
///
/// The walk runs newest to oldest. An entry larger than the whole budget is
/// skipped and the walk continues; the first entry that fits on its own but
/// not alongside those already chosen ends the walk, and it and everything
/// older count as omitted.
pub fn select_history_for_prompt(history: &[HistoryEntry], max_bytes: usize) -> HistorySelection {
    let mut selection = HistorySelection::default();
    let mut chosen = Vec::new();
    let mut stopped = false;

    for entry in history.iter().rev() {
        let size = estimate_history_entry_size(entry);
        if stopped || size > max_bytes {
            selection.omitted_entries += 1;
            selection.omitted_bytes += size;
            continue;
        }
        if selection.bytes + size > max_bytes {
            stopped = true;
            selection.omitted_entries += 1;
            selection.omitted_bytes += size;
            continue;
        }
        selection.bytes += size;
        chosen.push(entry.clone());
    }

    chosen.reverse();
    selection.entries = chosen;
    selection
}

/// Entry-count and byte limits for prompt history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryBudget {
    /// Most recent entries considered; 0 means no limit.
    pub limit: usize,
    pub max_bytes: usize,
}

impl Default for HistoryBudget {
    fn default() -> Self {
        Self {
            limit: 30,
            max_bytes: 200_000,
        }
    }
}

/// Outcome of [`plan_history`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryPlan {
    pub entries: Vec<HistoryEntry>,
    /// Entries in the full history.
    pub total: usize,
    /// Entries dropped by the count limit.
    pub limit_omitted: usize,
    /// Entries dropped by the byte budget.
    pub byte_omitted: usize,
    pub bytes_used: usize,
    pub bytes_omitted: usize,
}

/// Apply the count limit, then the byte budget.
pub fn plan_history(history: &[HistoryEntry], budget: HistoryBudget) -> HistoryPlan {
    let total = history.len();
    let start = match budget.limit {
        0 => 0,
        limit => total.saturating_sub(limit),
    };
    let selection = select_history_for_prompt(&history[start..], budget.max_bytes);

    HistoryPlan {
        entries: selection.entries,
        total,
        limit_omitted: start,
        byte_omitted: selection.omitted_entries,
        bytes_used: selection.bytes,
        bytes_omitted: selection.omitted_bytes,
    }
}
