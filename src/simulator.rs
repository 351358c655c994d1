use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::engine::{now_ms, Engine};
use crate::model::*;
use crate::sweeper::TaskHandle;

const MINUTE_MS: Ms = 60_000;
const HOUR_MS: Ms = 60 * MINUTE_MS;

/// Demo traffic generator. Each tick admits one simulated party, makes sure
/// someone is on shift for it, runs a finalize pass and rotates standby.
pub fn spawn_simulator(engine: Arc<Engine>, every: Duration) -> TaskHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handle = tokio::spawn(async move {
        tracing::info!(interval_ms = every.as_millis() as u64, "simulator started");
        let mut interval = tokio::time::interval(every);
        let mut tick: u64 = 0;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    tick += 1;
                    step(&engine, tick, now_ms()).await;
                }
                _ = token.cancelled() => {
                    tracing::info!("simulator stopped");
                    return;
                }
            }
        }
    });
    TaskHandle::new(cancel, handle)
}

/// One-hour window starting somewhere between one and two hours after `now`.
fn window_for(tick: u64, now: Ms) -> Span {
    let offset = HOUR_MS + ((tick * 17) % 60) as Ms * MINUTE_MS;
    let start = (now + offset) / MINUTE_MS * MINUTE_MS;
    Span::new(start, start + HOUR_MS)
}

async fn step(engine: &Engine, tick: u64, now: Ms) {
    let window = window_for(tick, now);

    let request = BookingRequest::new(format!("SimUser-{tick}"), window.start, window.end, 2)
        .with_notes("simulated");
    match engine.admit_at(request, now).await {
        Ok(booking) => tracing::debug!(id = %booking.id, tick, "simulated booking admitted"),
        Err(e) => tracing::debug!(tick, "simulated booking rejected: {e}"),
    }

    if !engine.has_min_staffing(1, window).await {
        match engine.create_employee(format!("SimEmp-{tick}")).await {
            Ok(employee) => {
                if let Err(e) = engine.create_shift(employee.id, window.start, window.end).await {
                    tracing::warn!(tick, "simulated shift failed: {e}");
                }
            }
            Err(e) => tracing::warn!(tick, "simulated employee failed: {e}"),
        }
    }

    if let Err(e) = engine.finalize(now).await {
        tracing::warn!(tick, "simulated finalize failed: {e}");
    }

    let employees = engine.list_employees().await;
    if !employees.is_empty() {
        let next = &employees[(tick as usize) % employees.len()];
        if let Err(e) = engine.set_standby(next.id, !next.standby).await {
            tracing::warn!(tick, "simulated standby toggle failed: {e}");
        }
    }
}
