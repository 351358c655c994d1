mod admission;
mod error;
mod finalize;
pub mod ledger;
mod queries;
mod roster;
mod staffing;

pub use error::EngineError;
pub use ledger::Ledger;

use std::path::PathBuf;

use tokio::sync::{RwLock, RwLockWriteGuard};

use crate::limits::*;
use crate::model::*;
use crate::notify::Dispatcher;
use crate::wal::{Wal, WalHandle};

/// Durations that shape admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long a provisional hold stays active before the sweep may confirm it.
    pub provisional_window: Ms,
    /// Slot length for requests that arrive without a time window.
    pub legacy_slot: Ms,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provisional_window: 60_000,
            legacy_slot: 3_600_000,
        }
    }
}

/// Reconciliation engine for one venue.
///
/// Every mutating operation holds the ledger write lock across its whole
/// read-decide-persist-apply sequence, so concurrent admissions for
/// overlapping windows are strictly ordered.
pub struct Engine {
    ledger: RwLock<Ledger>,
    wal: WalHandle,
    dispatcher: Dispatcher,
    config: EngineConfig,
}

impl Engine {
    /// Replay the WAL at `wal_path` into a fresh ledger and start its writer task.
    pub fn new(
        wal_path: PathBuf,
        config: EngineConfig,
        dispatcher: Dispatcher,
    ) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let mut ledger = Ledger::new();
        for event in &events {
            ledger.apply(event);
        }
        let wal = WalHandle::spawn(Wal::open(&wal_path)?);

        tracing::debug!(
            path = %wal_path.display(),
            events = events.len(),
            bookings = ledger.len(),
            "ledger replayed"
        );

        Ok(Self {
            ledger: RwLock::new(ledger),
            wal,
            dispatcher,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Durably append, then apply. The caller holds the write lock.
    async fn persist_and_apply(
        &self,
        ledger: &mut RwLockWriteGuard<'_, Ledger>,
        event: Event,
    ) -> Result<(), EngineError> {
        self.wal.append(event.clone()).await?;
        ledger.apply(&event);
        Ok(())
    }

    /// Rewrite the WAL with only the events needed to recreate the current ledger.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // Holding the read lock keeps writers out while the snapshot is swapped in.
        let ledger = self.ledger.read().await;
        let events = ledger.snapshot_events();
        self.wal.compact(events).await?;
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        self.wal.appends_since_compact().await
    }
}

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

pub(crate) fn validate_span(start: Ms, end: Ms) -> Result<Span, EngineError> {
    if end <= start {
        return Err(EngineError::InvalidSpan { start, end });
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if end - start > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(Span::new(start, end))
}

pub(crate) fn validate_customer(
    name: &str,
    contact: Option<&str>,
    notes: Option<&str>,
) -> Result<(), EngineError> {
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("customer name too long"));
    }
    if contact.is_some_and(|c| c.len() > MAX_CONTACT_LEN) {
        return Err(EngineError::LimitExceeded("contact too long"));
    }
    if notes.is_some_and(|n| n.len() > MAX_NOTES_LEN) {
        return Err(EngineError::LimitExceeded("notes too long"));
    }
    Ok(())
}
