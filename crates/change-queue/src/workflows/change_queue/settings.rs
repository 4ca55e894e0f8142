use serde::{Deserialize, Serialize};

/// Paging and export-claim limits for the approval engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeQueueSettings {
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub max_export_claim: usize,
}

impl Default for ChangeQueueSettings {
    fn default() -> Self {
        Self {
            default_page_size: 25,
            max_page_size: 100,
            max_export_claim: 50,
        }
    }
}

impl ChangeQueueSettings {
    /// Requested page size, defaulted and clamped to `1..=max_page_size`.
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }

    pub fn claim_limit(&self, requested: usize) -> usize {
        requested.min(self.max_export_claim)
    }
}
