use crate::model::*;

use super::Engine;

impl Engine {
    /// Number of shifts overlapping `window`.
    pub async fn scheduled_staff(&self, window: Span) -> usize {
        let ledger = self.ledger.read().await;
        ledger.shifts_overlapping(&window).count()
    }

    /// Whether at least `min_staff` shifts overlap `window`.
    pub async fn has_min_staffing(&self, min_staff: usize, window: Span) -> bool {
        self.scheduled_staff(window).await >= min_staff
    }
}
