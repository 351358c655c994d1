use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{ADMISSIONS_TOTAL, BOOKINGS_SUPERSEDED_TOTAL};

use super::{now_ms, validate_customer, validate_span, Engine, EngineError, Ledger};

/// Decide whether `span` may be held for a party of `party_size` at `now`.
///
/// Returns the active provisionals the new hold supersedes.
pub(crate) fn check_admission(
    ledger: &Ledger,
    span: &Span,
    party_size: u32,
    now: Ms,
) -> Result<Vec<Ulid>, EngineError> {
    let overlapping: Vec<&Booking> = ledger.overlapping(span).collect();

    if let Some(confirmed) = overlapping.iter().find(|b| b.is_confirmed()) {
        return Err(EngineError::ConflictWithConfirmed(confirmed.id));
    }

    // Expired-but-unfinalized provisionals are inactive here; the sweep settles them.
    let active: Vec<&Booking> = overlapping
        .into_iter()
        .filter(|b| b.is_active_hold(now))
        .collect();

    if let Some(holder) = active.iter().find(|b| b.party_size >= party_size) {
        return Err(EngineError::HeldByLargerOrEqualParty {
            holder: holder.id,
            party_size: holder.party_size,
        });
    }

    Ok(active.iter().map(|b| b.id).collect())
}

/// Any overlapping booking blocks a legacy request, whatever its status.
pub(crate) fn check_legacy_admission(ledger: &Ledger, span: &Span) -> Result<(), EngineError> {
    match ledger.overlapping(span).next() {
        Some(b) if b.is_confirmed() => Err(EngineError::ConflictWithConfirmed(b.id)),
        Some(b) => Err(EngineError::OverlapsExisting(b.id)),
        None => Ok(()),
    }
}

impl Engine {
    pub async fn admit(&self, request: BookingRequest) -> Result<Booking, EngineError> {
        self.admit_at(request, now_ms()).await
    }

    /// Admit a windowed request as a provisional hold, superseding smaller active holds.
    pub async fn admit_at(&self, request: BookingRequest, now: Ms) -> Result<Booking, EngineError> {
        let result = self.admit_inner(request, now).await;
        record_admission("windowed", &result);
        result
    }

    async fn admit_inner(&self, request: BookingRequest, now: Ms) -> Result<Booking, EngineError> {
        let span = validate_span(request.start, request.end)?;
        if request.party_size == 0 {
            return Err(EngineError::InvalidPartySize(0));
        }
        if request.party_size > MAX_PARTY_SIZE {
            return Err(EngineError::LimitExceeded("party too large"));
        }
        validate_customer(
            &request.customer_name,
            request.contact.as_deref(),
            request.notes.as_deref(),
        )?;

        let mut ledger = self.ledger.write().await;
        if ledger.len() >= MAX_BOOKINGS_PER_VENUE {
            return Err(EngineError::LimitExceeded("too many bookings"));
        }

        let superseded = check_admission(&ledger, &span, request.party_size, now)?;

        let booking = Booking {
            id: Ulid::new(),
            customer_name: request.customer_name,
            contact: request.contact,
            notes: request.notes,
            span,
            party_size: request.party_size,
            status: BookingStatus::Provisional,
            created_at: now,
            provisional_expires_at: Some(now + self.config.provisional_window),
        };

        for loser in &superseded {
            tracing::info!(
                superseded = %loser,
                by = %booking.id,
                party_size = booking.party_size,
                "provisional superseded by larger party"
            );
        }
        metrics::counter!(BOOKINGS_SUPERSEDED_TOTAL).increment(superseded.len() as u64);

        let event = Event::BookingAdmitted {
            booking: booking.clone(),
            superseded,
        };
        self.persist_and_apply(&mut ledger, event).await?;
        Ok(booking)
    }

    pub async fn admit_legacy(&self, request: LegacyRequest) -> Result<Booking, EngineError> {
        self.admit_legacy_at(request, now_ms()).await
    }

    /// Book `[now, now + legacy_slot)` directly as confirmed.
    pub async fn admit_legacy_at(
        &self,
        request: LegacyRequest,
        now: Ms,
    ) -> Result<Booking, EngineError> {
        let result = self.admit_legacy_inner(request, now).await;
        record_admission("legacy", &result);
        result
    }

    async fn admit_legacy_inner(
        &self,
        request: LegacyRequest,
        now: Ms,
    ) -> Result<Booking, EngineError> {
        let span = validate_span(now, now + self.config.legacy_slot)?;
        validate_customer(
            &request.customer_name,
            request.contact.as_deref(),
            request.notes.as_deref(),
        )?;

        let mut ledger = self.ledger.write().await;
        if ledger.len() >= MAX_BOOKINGS_PER_VENUE {
            return Err(EngineError::LimitExceeded("too many bookings"));
        }
        check_legacy_admission(&ledger, &span)?;

        let booking = Booking {
            id: Ulid::new(),
            customer_name: request.customer_name,
            contact: request.contact,
            notes: request.notes,
            span,
            party_size: 1,
            status: BookingStatus::Confirmed,
            created_at: now,
            provisional_expires_at: None,
        };
        let event = Event::BookingAdmitted {
            booking: booking.clone(),
            superseded: Vec::new(),
        };
        self.persist_and_apply(&mut ledger, event).await?;
        Ok(booking)
    }

    /// Route a possibly incomplete request to the windowed or legacy path.
    pub async fn submit(&self, intake: BookingIntake) -> Result<Booking, EngineError> {
        self.submit_at(intake, now_ms()).await
    }

    pub async fn submit_at(&self, intake: BookingIntake, now: Ms) -> Result<Booking, EngineError> {
        match intake.into_admission() {
            Admission::Windowed(request) => self.admit_at(request, now).await,
            Admission::Legacy(request) => self.admit_legacy_at(request, now).await,
        }
    }
}

fn record_admission(path: &'static str, result: &Result<Booking, EngineError>) {
    match result {
        Ok(booking) => {
            tracing::info!(
                id = %booking.id,
                path,
                status = %booking.status,
                party_size = booking.party_size,
                start = booking.span.start,
                end = booking.span.end,
                "booking admitted"
            );
            metrics::counter!(ADMISSIONS_TOTAL, "path" => path, "outcome" => "admitted")
                .increment(1);
        }
        Err(e) => {
            tracing::debug!(path, reason = e.reason(), "booking rejected: {e}");
            metrics::counter!(ADMISSIONS_TOTAL, "path" => path, "outcome" => e.reason())
                .increment(1);
        }
    }
}
