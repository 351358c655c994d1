use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::EngineConfig;
use crate::limits::MAX_SPAN_DURATION_MS;
use crate::model::Ms;
use crate::notify::Dispatcher;

/// Server configuration, read from `BOOKD_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    /// WAL appends before the compactor rewrites a venue's log.
    pub compact_threshold: u64,
    pub engine: EngineConfig,
    pub sweep_interval: Duration,
    /// Demo booking generator; off unless set.
    pub simulator_interval: Option<Duration>,
    /// `log` or `none`.
    pub notifier: String,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5433,
            data_dir: PathBuf::from("./data"),
            max_connections: 256,
            compact_threshold: 1000,
            engine: EngineConfig::default(),
            sweep_interval: Duration::from_millis(5000),
            simulator_interval: None,
            notifier: "log".into(),
            metrics_port: None,
            tls_cert: None,
            tls_key: None,
        }
    }
}

impl Config {
    pub fn from_env() -> io::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> io::Result<Self> {
        let d = Self::default();
        let parse = |key: &'static str| -> io::Result<Option<u64>> {
            match lookup(key) {
                None => Ok(None),
                Some(v) => v.trim().parse::<u64>().map(Some).map_err(|e| {
                    io::Error::new(io::ErrorKind::InvalidInput, format!("{key}: {e}"))
                }),
            }
        };

        let port = match parse("BOOKD_PORT")? {
            Some(p) => u16::try_from(p).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, "BOOKD_PORT out of range")
            })?,
            None => d.port,
        };
        let metrics_port = parse("BOOKD_METRICS_PORT")?
            .map(|p| {
                u16::try_from(p).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "BOOKD_METRICS_PORT out of range")
                })
            })
            .transpose()?;

        // Both engine durations feed `now + d` arithmetic and must fit a span.
        let engine_ms = |key: &'static str, default: Ms| -> io::Result<Ms> {
            let Some(v) = parse(key)? else {
                return Ok(default);
            };
            match Ms::try_from(v) {
                Ok(ms) if ms > 0 && ms <= MAX_SPAN_DURATION_MS => Ok(ms),
                _ => Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{key} must be between 1 and {MAX_SPAN_DURATION_MS}"),
                )),
            }
        };
        let provisional_window =
            engine_ms("BOOKD_PROVISIONAL_WINDOW_MS", d.engine.provisional_window)?;
        let legacy_slot = engine_ms("BOOKD_LEGACY_SLOT_MS", d.engine.legacy_slot)?;

        let notifier = lookup("BOOKD_NOTIFIER").unwrap_or(d.notifier);
        if Dispatcher::from_name(&notifier).is_none() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("BOOKD_NOTIFIER: unknown notifier {notifier:?} (expected log or none)"),
            ));
        }

        Ok(Self {
            bind: lookup("BOOKD_BIND").unwrap_or(d.bind),
            port,
            data_dir: lookup("BOOKD_DATA_DIR").map_or(d.data_dir, PathBuf::from),
            max_connections: parse("BOOKD_MAX_CONNECTIONS")?
                .map_or(d.max_connections, |v| v.max(1) as usize),
            compact_threshold: parse("BOOKD_COMPACT_THRESHOLD")?.unwrap_or(d.compact_threshold),
            engine: EngineConfig {
                provisional_window,
                legacy_slot,
            },
            sweep_interval: parse("BOOKD_SWEEP_INTERVAL_MS")?
                .map_or(d.sweep_interval, |v| Duration::from_millis(v.max(10))),
            simulator_interval: parse("BOOKD_SIMULATOR_INTERVAL_MS")?
                .map(|v| Duration::from_millis(v.max(10))),
            notifier,
            metrics_port,
            tls_cert: lookup("BOOKD_TLS_CERT"),
            tls_key: lookup("BOOKD_TLS_KEY"),
        })
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::from_name(&self.notifier).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.port, 5433);
        assert_eq!(config.engine.provisional_window, 60_000);
        assert_eq!(config.engine.legacy_slot, 3_600_000);
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert!(config.simulator_interval.is_none());
        assert_eq!(config.notifier, "log");
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("BOOKD_PORT", "6000"),
            ("BOOKD_PROVISIONAL_WINDOW_MS", "30000"),
            ("BOOKD_SIMULATOR_INTERVAL_MS", "10000"),
            ("BOOKD_NOTIFIER", "none"),
            ("BOOKD_DATA_DIR", "/var/lib/bookd"),
        ]))
        .unwrap();
        assert_eq!(config.port, 6000);
        assert_eq!(config.engine.provisional_window, 30_000);
        assert_eq!(config.simulator_interval, Some(Duration::from_secs(10)));
        assert_eq!(config.notifier, "none");
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/bookd"));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(Config::from_lookup(lookup(&[("BOOKD_PORT", "70000")])).is_err());
        assert!(Config::from_lookup(lookup(&[("BOOKD_SWEEP_INTERVAL_MS", "soon")])).is_err());
        assert!(Config::from_lookup(lookup(&[("BOOKD_NOTIFIER", "carrier-pigeon")])).is_err());
        assert!(Config::from_lookup(lookup(&[("BOOKD_LEGACY_SLOT_MS", "0")])).is_err());
    }

    #[test]
    fn engine_durations_must_fit_a_span() {
        for window in ["0", "18446744073709551615", "9223372036854775807"] {
            let err = Config::from_lookup(lookup(&[("BOOKD_PROVISIONAL_WINDOW_MS", window)]))
                .unwrap_err();
            assert!(err.to_string().contains("BOOKD_PROVISIONAL_WINDOW_MS"));
        }

        let too_wide = (MAX_SPAN_DURATION_MS + 1).to_string();
        assert!(Config::from_lookup(lookup(&[("BOOKD_LEGACY_SLOT_MS", too_wide.as_str())])).is_err());

        let widest = MAX_SPAN_DURATION_MS.to_string();
        let config = Config::from_lookup(lookup(&[
            ("BOOKD_LEGACY_SLOT_MS", widest.as_str()),
            ("BOOKD_PROVISIONAL_WINDOW_MS", "1"),
        ]))
        .unwrap();
        assert_eq!(config.engine.legacy_slot, MAX_SPAN_DURATION_MS);
        assert_eq!(config.engine.provisional_window, 1);
    }
}
