use serde::{Deserialize, Serialize};

/// How many passes a recalculation makes over its selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RecalcPolicy {
    /// Exactly one pass in chain order. Deep chains stored out of
    /// dependency order may need another call to settle.
    #[default]
    SinglePass,
    /// Repeat the pass until no value changes, at most `max_passes` times.
    UntilStable { max_passes: u32 },
}

impl RecalcPolicy {
    pub(crate) fn max_passes(&self) -> u32 {
        match self {
            RecalcPolicy::SinglePass => 1,
            RecalcPolicy::UntilStable { max_passes } => (*max_passes).max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkbookConfig {
    /// Collect per-cell statistics during recalculation.
    pub debug: bool,
    pub recalc_policy: RecalcPolicy,
    /// Precompute large groups of SUMIFS/AVERAGEIFS calls before a full
    /// recalculation.
    pub aggregate_batching: bool,
    /// Smallest group the aggregation batcher will take on.
    pub batch_threshold: usize,
    /// Name of the sheet a new workbook starts with.
    pub default_sheet: String,
}

impl Default for WorkbookConfig {
    fn default() -> Self {
        Self {
            debug: false,
            recalc_policy: RecalcPolicy::SinglePass,
            aggregate_batching: true,
            batch_threshold: 10,
            default_sheet: "Sheet1".to_string(),
        }
    }
}

impl WorkbookConfig {
    pub fn debug() -> Self {
        Self {
            debug: true,
            ..Default::default()
        }
    }

    pub fn with_recalc_policy(mut self, policy: RecalcPolicy) -> Self {
        self.recalc_policy = policy;
        self
    }

    pub fn with_batch_threshold(mut self, threshold: usize) -> Self {
        self.batch_threshold = threshold;
        self
    }

    pub fn without_aggregate_batching(mut self) -> Self {
        self.aggregate_batching = false;
        self
    }
}
