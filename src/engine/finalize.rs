use ulid::Ulid;

use crate::model::*;
use crate::observability::{
    BOOKINGS_CONFIRMED_TOTAL, PROVISIONALS_BLOCKED_TOTAL, SWEEP_DURATION_SECONDS,
};

use super::{Engine, EngineError, Ledger};

/// Partition the provisionals due at `now` into promotable and blocked.
///
/// Candidates are taken oldest first; each one promoted here counts as
/// confirmed for the ones after it, so a single sweep never confirms two
/// overlapping bookings.
pub(crate) fn plan_promotions(ledger: &Ledger, now: Ms) -> (Vec<Booking>, Vec<Ulid>) {
    let mut due: Vec<&Booking> = ledger.bookings().filter(|b| b.is_due(now)).collect();
    due.sort_by_key(|b| (b.created_at, b.id));

    let mut promoted: Vec<Booking> = Vec::new();
    let mut blocked = Vec::new();

    for candidate in due {
        let conflict = ledger
            .overlapping(&candidate.span)
            .any(|other| other.id != candidate.id && other.is_confirmed())
            || promoted.iter().any(|p| p.span.overlaps(&candidate.span));
        if conflict {
            blocked.push(candidate.id);
        } else {
            promoted.push(candidate.clone());
        }
    }

    (promoted, blocked)
}

impl Engine {
    /// Confirm every provisional whose hold window has elapsed at `now` and
    /// that no confirmed booking overlaps. Idempotent.
    ///
    /// Promoted bookings with an email contact are handed to the dispatcher
    /// after the ledger lock is released; delivery never affects the result.
    pub async fn finalize(&self, now: Ms) -> Result<FinalizeReport, EngineError> {
        let started = std::time::Instant::now();

        let (promoted, blocked) = {
            let mut ledger = self.ledger.write().await;
            let (promoted, blocked) = plan_promotions(&ledger, now);

            if !blocked.is_empty() {
                tracing::warn!(
                    count = blocked.len(),
                    ids = ?blocked,
                    "expired provisionals overlap a confirmed booking; left pending"
                );
            }
            metrics::counter!(PROVISIONALS_BLOCKED_TOTAL).increment(blocked.len() as u64);

            if !promoted.is_empty() {
                let ids: Vec<Ulid> = promoted.iter().map(|b| b.id).collect();
                self.persist_and_apply(&mut ledger, Event::ProvisionalsConfirmed { ids })
                    .await?;
            }

            metrics::histogram!(SWEEP_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
            (promoted, blocked)
        };

        for booking in &promoted {
            tracing::info!(id = %booking.id, start = booking.span.start, "booking confirmed");
            self.dispatcher.booking_confirmed(booking);
        }
        metrics::counter!(BOOKINGS_CONFIRMED_TOTAL).increment(promoted.len() as u64);

        Ok(FinalizeReport {
            promoted: promoted.into_iter().map(|b| b.id).collect(),
            blocked,
        })
    }
}
