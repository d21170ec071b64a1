use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::EngineSettings;
use crate::limits::*;

const ENV_PREFIX: &str = "TABLEBOOK_";

/// Server configuration, read from `TABLEBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    /// Prometheus exporter port; exporter disabled when unset.
    pub metrics_port: Option<u16>,
    pub max_connections: usize,
    /// WAL appends after which the log is rewritten.
    pub compact_threshold: u64,
    /// Volatile table, nothing written to `data_dir`.
    pub in_memory: bool,
    pub engine: EngineSettings,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Build from any key → value source. Keys are given without the prefix.
    /// Unparseable values fall back to the default.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            get(key).and_then(|v| v.trim().parse().ok())
        }

        let data_dir = get("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data"));
        let in_memory = get("IN_MEMORY")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);

        let engine = EngineSettings {
            slot_minutes: parsed(&get, "SLOT_MINUTES")
                .filter(|m: &i32| *m > 0)
                .unwrap_or(DEFAULT_SLOT_MINUTES),
            create_lock_wait: Duration::from_millis(
                parsed(&get, "CREATE_LOCK_WAIT_MS").unwrap_or(DEFAULT_CREATE_LOCK_WAIT_MS),
            ),
            lock_wait: Duration::from_millis(
                parsed(&get, "LOCK_WAIT_MS").unwrap_or(DEFAULT_LOCK_WAIT_MS),
            ),
        };

        Self {
            port: parsed(&get, "PORT").unwrap_or(7878),
            bind: get("BIND").unwrap_or_else(|| "0.0.0.0".into()),
            data_dir,
            metrics_port: parsed(&get, "METRICS_PORT"),
            max_connections: parsed(&get, "MAX_CONNECTIONS").unwrap_or(256),
            compact_threshold: parsed(&get, "COMPACT_THRESHOLD").unwrap_or(1000),
            in_memory,
            engine,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("bookings.wal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]);
        assert_eq!(c.addr(), "0.0.0.0:7878");
        assert_eq!(c.data_dir, PathBuf::from("./data"));
        assert_eq!(c.metrics_port, None);
        assert_eq!(c.max_connections, 256);
        assert_eq!(c.compact_threshold, 1000);
        assert!(!c.in_memory);
        assert_eq!(c.engine, EngineSettings::default());
    }

    #[test]
    fn overrides() {
        let c = config(&[
            ("PORT", "9000"),
            ("DATA_DIR", "/var/lib/tablebook"),
            ("METRICS_PORT", "9100"),
            ("SLOT_MINUTES", "90"),
            ("LOCK_WAIT_MS", "250"),
            ("IN_MEMORY", "TRUE"),
        ]);
        assert_eq!(c.port, 9000);
        assert_eq!(c.metrics_port, Some(9100));
        assert_eq!(c.engine.slot_minutes, 90);
        assert_eq!(c.engine.lock_wait, Duration::from_millis(250));
        assert_eq!(c.engine.create_lock_wait, Duration::from_millis(30_000));
        assert_eq!(c.wal_path(), PathBuf::from("/var/lib/tablebook/bookings.wal"));
        assert!(c.in_memory);
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let c = config(&[("PORT", "eighty"), ("SLOT_MINUTES", "-5")]);
        assert_eq!(c.port, 7878);
        assert_eq!(c.engine.slot_minutes, DEFAULT_SLOT_MINUTES);
    }
}
