use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::engine::{Engine, EngineConfig};
use crate::limits::*;
use crate::notify::Dispatcher;
use crate::observability::VENUES_ACTIVE;
use crate::simulator;
use crate::sweeper::{self, TaskHandle};

const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background loop timing shared by every venue.
#[derive(Debug, Clone, Copy)]
pub struct VenueTasks {
    pub sweep_interval: Duration,
    pub compact_threshold: u64,
    pub compact_interval: Duration,
    pub simulator_interval: Option<Duration>,
}

impl Default for VenueTasks {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(5),
            compact_threshold: 1000,
            compact_interval: COMPACT_CHECK_INTERVAL,
            simulator_interval: None,
        }
    }
}

/// Per-venue engines. Each venue gets its own Engine, WAL and background tasks.
/// Venue = database name from the pgwire connection.
pub struct VenueManager {
    engines: DashMap<String, Arc<Engine>>,
    tasks: Mutex<Vec<TaskHandle>>,
    data_dir: PathBuf,
    engine_config: EngineConfig,
    dispatcher: Dispatcher,
    schedule: VenueTasks,
}

impl VenueManager {
    pub fn new(
        data_dir: PathBuf,
        engine_config: EngineConfig,
        dispatcher: Dispatcher,
        schedule: VenueTasks,
    ) -> Self {
        Self {
            engines: DashMap::new(),
            tasks: Mutex::new(Vec::new()),
            data_dir,
            engine_config,
            dispatcher,
            schedule,
        }
    }

    /// Get or lazily open the engine for `venue`.
    ///
    /// Engines are keyed by the sanitized name, so names that differ only in
    /// stripped characters share one engine and one WAL.
    pub fn get_or_create(&self, venue: &str) -> std::io::Result<Arc<Engine>> {
        if venue.len() > MAX_VENUE_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "venue name too long",
            ));
        }

        // Sanitize to keep the WAL inside data_dir
        let safe_name: String = venue
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty venue name",
            ));
        }

        if let Some(engine) = self.engines.get(&safe_name) {
            return Ok(engine.value().clone());
        }
        if self.engines.len() >= MAX_VENUES {
            return Err(std::io::Error::other("too many venues"));
        }

        // Entry lock: two first connections to one venue must not open its WAL twice.
        let entry = match self.engines.entry(safe_name.clone()) {
            Entry::Occupied(e) => return Ok(e.get().clone()),
            Entry::Vacant(e) => e,
        };

        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let engine = Arc::new(Engine::new(
            wal_path,
            self.engine_config,
            self.dispatcher.clone(),
        )?);
        entry.insert(engine.clone());

        let mut handles = vec![
            sweeper::spawn_sweeper(engine.clone(), self.schedule.sweep_interval),
            sweeper::spawn_compactor(
                engine.clone(),
                self.schedule.compact_threshold,
                self.schedule.compact_interval,
            ),
        ];
        if let Some(every) = self.schedule.simulator_interval {
            handles.push(simulator::spawn_simulator(engine.clone(), every));
        }
        self.tasks
            .lock()
            .map_err(|_| std::io::Error::other("venue task registry poisoned"))?
            .extend(handles);

        tracing::info!(venue = %safe_name, "venue opened");
        metrics::gauge!(VENUES_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }

    pub fn venue_count(&self) -> usize {
        self.engines.len()
    }

    /// Stop every venue's background loops and wait for them to exit.
    pub async fn shutdown(&self) {
        let handles: Vec<TaskHandle> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        let count = handles.len();
        for handle in handles {
            handle.shutdown().await;
        }
        tracing::info!(tasks = count, "venue background tasks stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use std::fs;

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("bookd_test_venue").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn manager(dir: PathBuf) -> VenueManager {
        VenueManager::new(
            dir,
            EngineConfig::default(),
            Dispatcher::from_name("none").unwrap(),
            VenueTasks::default(),
        )
    }

    const T0: Ms = 1_750_000_000_000;
    const HOUR: Ms = 3_600_000;

    #[tokio::test]
    async fn venue_isolation() {
        let vm = manager(test_data_dir("isolation"));
        let a = vm.get_or_create("venue_a").unwrap();
        let b = vm.get_or_create("venue_b").unwrap();

        a.admit_at(BookingRequest::new("Ada", T0 + HOUR, T0 + 2 * HOUR, 2), T0)
            .await
            .unwrap();

        assert_eq!(a.list_all().await.len(), 1);
        assert!(b.list_all().await.is_empty());
        // Same window is free in the other venue.
        b.admit_at(BookingRequest::new("Bob", T0 + HOUR, T0 + 2 * HOUR, 1), T0)
            .await
            .unwrap();
        vm.shutdown().await;
    }

    #[tokio::test]
    async fn venue_lazy_creation() {
        let dir = test_data_dir("lazy");
        let vm = manager(dir.clone());

        let entries: Vec<_> = fs::read_dir(&dir).unwrap().collect();
        assert!(entries.is_empty());

        let _engine = vm.get_or_create("bistro").unwrap();
        assert!(dir.join("bistro.wal").exists());
        vm.shutdown().await;
    }

    #[tokio::test]
    async fn same_engine_returned() {
        let vm = manager(test_data_dir("same"));
        let e1 = vm.get_or_create("foo").unwrap();
        let e2 = vm.get_or_create("foo").unwrap();
        assert!(Arc::ptr_eq(&e1, &e2));
        assert_eq!(vm.venue_count(), 1);
        vm.shutdown().await;
    }

    #[tokio::test]
    async fn venue_name_sanitized() {
        let dir = test_data_dir("sanitize");
        let vm = manager(dir.clone());

        let _engine = vm.get_or_create("../evil").unwrap();
        assert!(dir.join("evil.wal").exists());
        assert!(vm.get_or_create("../..").is_err());
        vm.shutdown().await;
    }

    #[tokio::test]
    async fn names_sanitizing_alike_share_one_engine() {
        let dir = test_data_dir("alias");
        let vm = manager(dir.clone());
        let a = vm.get_or_create("bistro").unwrap();
        let b = vm.get_or_create("bis.tro").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(vm.venue_count(), 1);

        let walk_in = |name: &str| LegacyRequest {
            customer_name: name.into(),
            contact: None,
            notes: None,
        };
        a.admit_legacy_at(walk_in("Ada"), T0).await.unwrap();
        let err = b.admit_legacy_at(walk_in("Bob"), T0).await.unwrap_err();
        assert!(matches!(err, crate::engine::EngineError::ConflictWithConfirmed(_)));
        vm.shutdown().await;
        drop((a, b, vm));

        let vm = manager(dir);
        let confirmed = vm
            .get_or_create("bistro")
            .unwrap()
            .list_by_status(BookingStatus::Confirmed)
            .await;
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].customer_name, "Ada");
        vm.shutdown().await;
    }

    #[tokio::test]
    async fn venue_name_too_long() {
        let vm = manager(test_data_dir("too_long"));
        let err = vm
            .get_or_create(&"x".repeat(MAX_VENUE_NAME_LEN + 1))
            .err()
            .unwrap();
        assert!(err.to_string().contains("venue name too long"));
    }

    #[tokio::test]
    async fn reopen_replays_wal() {
        let dir = test_data_dir("reopen");
        let vm = manager(dir.clone());
        let engine = vm.get_or_create("bistro").unwrap();
        // Current clock so the running sweeper leaves the hold alone.
        let now = crate::engine::now_ms();
        let booking = engine
            .admit_at(BookingRequest::new("Ada", now + HOUR, now + 2 * HOUR, 3), now)
            .await
            .unwrap();
        vm.shutdown().await;
        drop(engine);
        drop(vm);

        let vm = manager(dir);
        let engine = vm.get_or_create("bistro").unwrap();
        let restored = engine.get_booking(booking.id).await.unwrap();
        assert_eq!(restored, booking);
        vm.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_all_tasks() {
        let vm = VenueManager::new(
            test_data_dir("shutdown"),
            EngineConfig::default(),
            Dispatcher::from_name("none").unwrap(),
            VenueTasks {
                simulator_interval: Some(Duration::from_secs(3600)),
                ..VenueTasks::default()
            },
        );
        vm.get_or_create("one").unwrap();
        vm.get_or_create("two").unwrap();
        assert_eq!(vm.tasks.lock().unwrap().len(), 6);

        tokio::time::timeout(Duration::from_secs(2), vm.shutdown())
            .await
            .expect("shutdown should finish");
        assert!(vm.tasks.lock().unwrap().is_empty());
    }
}
