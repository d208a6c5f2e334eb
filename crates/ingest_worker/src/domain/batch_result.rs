/// Final state of one notification item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Succeeded,
    Failed { reason: String },
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Succeeded)
    }
}

/// Counters for one batch, logged when the batch completes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub items: usize,
    pub storage_events: usize,
    pub lines_read: usize,
    pub records_submitted: usize,
    pub records_delivered: usize,
    pub invalid_lines: usize,
    pub routing_failures: usize,
    pub delivery_failures: usize,
}

/// Per-item outcomes of a batch, in batch order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub outcomes: Vec<ItemOutcome>,
    pub stats: BatchStats,
}

impl BatchResult {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(ItemOutcome::is_success)
    }

    pub fn failed_items(&self) -> impl Iterator<Item = (usize, &str)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(index, outcome)| match outcome {
                ItemOutcome::Failed { reason } => Some((index, reason.as_str())),
                ItemOutcome::Succeeded => None,
            })
    }
}
