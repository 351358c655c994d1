use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::{now_ms, Engine};

/// A background loop that stops when its token is cancelled.
pub struct TaskHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl TaskHandle {
    pub(crate) fn new(cancel: CancellationToken, handle: JoinHandle<()>) -> Self {
        Self { cancel, handle }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel and wait for the loop to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!("background task ended abnormally: {e}");
        }
    }
}

/// Periodically confirm provisionals whose hold window has elapsed.
pub fn spawn_sweeper(engine: Arc<Engine>, every: Duration) -> TaskHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match engine.finalize(now_ms()).await {
                        Ok(report) if !report.promoted.is_empty() => {
                            info!(promoted = report.promoted.len(), "sweep confirmed provisionals");
                        }
                        Ok(_) => {}
                        // Next tick retries; nothing was applied.
                        Err(e) => tracing::error!("sweep failed: {e}"),
                    }
                }
                _ = token.cancelled() => {
                    tracing::debug!("sweeper stopped");
                    return;
                }
            }
        }
    });
    TaskHandle::new(cancel, handle)
}

/// Compact the WAL whenever more than `threshold` appends have piled up since the last rewrite.
pub fn spawn_compactor(engine: Arc<Engine>, threshold: u64, every: Duration) -> TaskHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let appends = engine.wal_appends_since_compact().await;
                    if appends < threshold {
                        continue;
                    }
                    match engine.compact_wal().await {
                        Ok(()) => info!(appends, "WAL compacted"),
                        Err(e) => tracing::error!("WAL compaction failed: {e}"),
                    }
                }
                _ = token.cancelled() => {
                    tracing::debug!("compactor stopped");
                    return;
                }
            }
        }
    });
    TaskHandle::new(cancel, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::model::*;
    use crate::notify::Dispatcher;
    use crate::wal::Wal;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("bookd_test_sweeper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn engine(name: &str, window: Ms) -> Arc<Engine> {
        let config = EngineConfig {
            provisional_window: window,
            ..EngineConfig::default()
        };
        Arc::new(Engine::new(test_wal_path(name), config, Dispatcher::from_name("none").unwrap()).unwrap())
    }

    #[tokio::test]
    async fn sweeper_confirms_elapsed_holds() {
        let engine = engine("sweep_confirms.wal", 1);
        let now = now_ms();
        let booking = engine
            .admit_at(BookingRequest::new("Ada", now + 3_600_000, now + 7_200_000, 2), now - 10)
            .await
            .unwrap();

        let task = spawn_sweeper(engine.clone(), Duration::from_millis(10));
        let mut confirmed = false;
        for _ in 0..100 {
            if engine.get_booking(booking.id).await.unwrap().is_confirmed() {
                confirmed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        task.shutdown().await;
        assert!(confirmed, "sweeper should have promoted the elapsed hold");
    }

    #[tokio::test]
    async fn sweeper_leaves_active_holds() {
        let engine = engine("sweep_active.wal", 3_600_000);
        let now = now_ms();
        let booking = engine
            .admit_at(BookingRequest::new("Ada", now + 3_600_000, now + 7_200_000, 2), now)
            .await
            .unwrap();

        let task = spawn_sweeper(engine.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        task.shutdown().await;

        let b = engine.get_booking(booking.id).await.unwrap();
        assert_eq!(b.status, BookingStatus::Provisional);
    }

    #[tokio::test]
    async fn compactor_rewrites_past_threshold() {
        let path = test_wal_path("compactor.wal");
        let engine = Arc::new(
            Engine::new(path.clone(), EngineConfig::default(), Dispatcher::from_name("none").unwrap())
                .unwrap(),
        );
        let emp = engine.create_employee("Grace").await.unwrap();
        for i in 0..5 {
            engine.set_standby(emp.id, i % 2 == 0).await.unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap().len(), 6);

        let task = spawn_compactor(engine.clone(), 3, Duration::from_millis(10));
        let mut compacted = false;
        for _ in 0..100 {
            if engine.wal_appends_since_compact().await == 0 {
                compacted = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        task.shutdown().await;
        assert!(compacted);

        // One employee record, standby already folded in.
        let events = Wal::replay(&path).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::EmployeeCreated { employee } => assert!(employee.standby),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_task_exits() {
        let engine = engine("cancel.wal", 60_000);
        let task = spawn_sweeper(engine, Duration::from_secs(3600));
        tokio::time::timeout(Duration::from_secs(1), task.shutdown())
            .await
            .expect("shutdown should not hang");
    }
}
