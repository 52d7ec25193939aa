//! SQLite database store implementation.
//!
//! One background sampler writes while request handlers read from the same
//! file. Writes are serialized by the connection mutex; WAL plus a generous
//! busy timeout keeps readers from hard-failing during a writer transaction.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, Result as SqlResult};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

use super::models::*;

const WRITE_RETRIES: u32 = 3;
const WRITE_BACKOFF: Duration = Duration::from_millis(100);

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database. Safe to call repeatedly.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;

        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;

        Ok(())
    }

    // --- Writes ---

    /// Insert one network-wide sample.
    pub fn append_sample(&self, sample: &Sample) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        with_busy_retry(|| {
            conn.execute(
                "INSERT INTO metrics (timestamp, latency, packet_loss, rx_bytes, tx_bytes)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    format_db_time(sample.timestamp),
                    sample.latency_ms,
                    sample.packet_loss_pct,
                    sample.rx_bytes as i64,
                    sample.tx_bytes as i64,
                ],
            )
        })?;
        Ok(())
    }

    /// Insert one per-device sample, upserting the device row first.
    ///
    /// The upsert and the insert commit together so other writers never see
    /// a device sample without its device. `last_seen` never moves backward.
    pub fn append_device_sample(
        &self,
        device: &DiscoveredDevice,
        sample: &DeviceSample,
    ) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        with_busy_retry(|| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO devices (ip, mac, hostname, last_seen) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(ip) DO UPDATE SET
                 mac = COALESCE(excluded.mac, mac),
                 hostname = COALESCE(excluded.hostname, hostname),
                 last_seen = MAX(COALESCE(last_seen, ''), excluded.last_seen)",
                params![
                    device.ip,
                    device.mac,
                    device.hostname,
                    format_db_time(sample.timestamp),
                ],
            )?;
            tx.execute(
                "INSERT INTO device_metrics (device_ip, timestamp, latency, packet_loss, up, rx_bytes, tx_bytes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    sample.device_ip,
                    format_db_time(sample.timestamp),
                    sample.latency_ms,
                    sample.packet_loss_pct,
                    sample.up,
                    sample.rx_bytes.map(|v| v as i64),
                    sample.tx_bytes.map(|v| v as i64),
                ],
            )?;
            tx.commit()?;
            Ok(0)
        })?;
        Ok(())
    }

    /// Delete samples older than the cutoff. Returns (metrics, device_metrics) rows removed.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<(usize, usize), DbError> {
        let conn = self.conn.lock().unwrap();
        let cutoff_str = format_db_time(cutoff);
        let metrics = with_busy_retry(|| {
            conn.execute("DELETE FROM metrics WHERE timestamp < ?1", params![cutoff_str])
        })?;
        let device_metrics = with_busy_retry(|| {
            conn.execute(
                "DELETE FROM device_metrics WHERE timestamp < ?1",
                params![cutoff_str],
            )
        })?;
        Ok((metrics, device_metrics))
    }

    // --- Reads ---

    /// Get network-wide samples since the cutoff, most recent first.
    pub fn samples_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Sample>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT timestamp, latency, packet_loss, rx_bytes, tx_bytes
             FROM metrics WHERE timestamp >= ?1 ORDER BY timestamp DESC",
        )?;

        let samples = stmt
            .query_map(params![format_db_time(cutoff)], |row| {
                let time_str: String = row.get(0)?;
                Ok(Sample {
                    timestamp: parse_db_time(&time_str).unwrap_or_else(Utc::now),
                    latency_ms: row.get(1)?,
                    packet_loss_pct: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                    rx_bytes: row.get::<_, Option<i64>>(3)?.unwrap_or(0) as u64,
                    tx_bytes: row.get::<_, Option<i64>>(4)?.unwrap_or(0) as u64,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(samples)
    }

    /// Mean latency over samples since the cutoff, or None with no history.
    pub fn baseline_latency(&self, cutoff: DateTime<Utc>) -> Result<Option<f64>, DbError> {
        let conn = self.conn.lock().unwrap();
        let avg: Option<f64> = conn.query_row(
            "SELECT AVG(latency) FROM metrics WHERE timestamp >= ?1",
            params![format_db_time(cutoff)],
            |row| row.get(0),
        )?;
        Ok(avg)
    }

    /// Get samples for one device since the cutoff, most recent first.
    pub fn device_samples_since(
        &self,
        ip: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<DeviceSample>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT device_ip, timestamp, latency, packet_loss, up, rx_bytes, tx_bytes
             FROM device_metrics
             WHERE device_ip = ?1 AND timestamp > ?2 ORDER BY timestamp DESC",
        )?;

        let samples = stmt
            .query_map(params![ip, format_db_time(cutoff)], map_device_sample_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(samples)
    }

    /// Get the most recent N samples for one device.
    pub fn recent_device_samples(
        &self,
        ip: &str,
        limit: u32,
    ) -> Result<Vec<DeviceSample>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT device_ip, timestamp, latency, packet_loss, up, rx_bytes, tx_bytes
             FROM device_metrics
             WHERE device_ip = ?1 ORDER BY timestamp DESC LIMIT ?2",
        )?;

        let samples = stmt
            .query_map(params![ip, limit], map_device_sample_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(samples)
    }

    /// Get all known devices.
    pub fn devices(&self) -> Result<Vec<Device>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT ip, mac, hostname, last_seen FROM devices ORDER BY ip")?;

        let devices = stmt
            .query_map([], |row| {
                let last_seen: Option<String> = row.get(3)?;
                Ok(Device {
                    ip: row.get(0)?,
                    mac: row.get(1)?,
                    hostname: row.get(2)?,
                    last_seen: last_seen.as_deref().and_then(parse_db_time),
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(devices)
    }
}

fn map_device_sample_row(row: &rusqlite::Row<'_>) -> SqlResult<DeviceSample> {
    let time_str: String = row.get(1)?;
    Ok(DeviceSample {
        device_ip: row.get(0)?,
        timestamp: parse_db_time(&time_str).unwrap_or_else(Utc::now),
        latency_ms: row.get(2)?,
        packet_loss_pct: row.get(3)?,
        up: row.get(4)?,
        rx_bytes: row.get::<_, Option<i64>>(5)?.map(|v| v as u64),
        tx_bytes: row.get::<_, Option<i64>>(6)?.map(|v| v as u64),
    })
}

/// Run a write, retrying briefly on lock contention. Any other error class
/// propagates immediately; after the last attempt the busy error propagates
/// too and the caller drops the sample rather than blocking its loop.
fn with_busy_retry<T>(mut op: impl FnMut() -> SqlResult<T>) -> Result<T, DbError> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if is_busy(&e) && attempt < WRITE_RETRIES => {
                attempt += 1;
                tracing::warn!("Database busy, retrying write (attempt {})", attempt);
                std::thread::sleep(WRITE_BACKOFF);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == ErrorCode::DatabaseBusy || err.code == ErrorCode::DatabaseLocked
    )
}

/// Format a datetime for storage. Lexicographic order matches time order.
pub fn format_db_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S%.9f").to_string()
}

/// Parse a datetime string from the database.
pub fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [
        "%Y-%m-%d %H:%M:%S%.9f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.9fZ",
        "%Y-%m-%dT%H:%M:%SZ",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::NamedTempFile;

    fn sample_at(t: DateTime<Utc>, latency: f64) -> Sample {
        Sample {
            timestamp: t,
            latency_ms: Some(latency),
            packet_loss_pct: 0.0,
            rx_bytes: 1000,
            tx_bytes: 2000,
        }
    }

    fn device_sample_at(ip: &str, t: DateTime<Utc>, latency: Option<f64>) -> DeviceSample {
        DeviceSample {
            device_ip: ip.to_string(),
            timestamp: t,
            latency_ms: latency,
            packet_loss_pct: Some(0.0),
            up: latency.is_some(),
            rx_bytes: None,
            tx_bytes: None,
        }
    }

    fn discovered(ip: &str) -> DiscoveredDevice {
        DiscoveredDevice {
            ip: ip.to_string(),
            mac: Some("aa:bb:cc:dd:ee:ff".to_string()),
            hostname: Some("test-host".to_string()),
        }
    }

    #[test]
    fn test_init_is_idempotent() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        store.append_sample(&sample_at(Utc::now(), 10.0)).unwrap();

        // Re-running init must not drop data or duplicate tables.
        store.init().unwrap();
        let samples = store
            .samples_since(Utc::now() - ChronoDuration::seconds(60))
            .unwrap();
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn test_samples_ordered_most_recent_first() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let now = Utc::now();

        store
            .append_sample(&sample_at(now - ChronoDuration::seconds(10), 10.0))
            .unwrap();
        store.append_sample(&sample_at(now, 20.0)).unwrap();

        let samples = store
            .samples_since(now - ChronoDuration::seconds(60))
            .unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].latency_ms, Some(20.0));
        assert_eq!(samples[1].latency_ms, Some(10.0));
    }

    #[test]
    fn test_baseline_latency_empty_is_none() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let baseline = store
            .baseline_latency(Utc::now() - ChronoDuration::seconds(300))
            .unwrap();
        assert!(baseline.is_none());
    }

    #[test]
    fn test_baseline_latency_is_mean() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let now = Utc::now();

        store
            .append_sample(&sample_at(now - ChronoDuration::seconds(10), 30.0))
            .unwrap();
        store.append_sample(&sample_at(now, 50.0)).unwrap();

        let baseline = store
            .baseline_latency(now - ChronoDuration::seconds(300))
            .unwrap()
            .unwrap();
        assert!((baseline - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_device_upsert_advances_last_seen() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let now = Utc::now();
        let dev = discovered("192.168.1.10");

        store
            .append_device_sample(&dev, &device_sample_at(&dev.ip, now, Some(5.0)))
            .unwrap();
        // An out-of-order older sighting must not move last_seen backward.
        store
            .append_device_sample(
                &dev,
                &device_sample_at(&dev.ip, now - ChronoDuration::seconds(60), Some(5.0)),
            )
            .unwrap();

        let devices = store.devices().unwrap();
        assert_eq!(devices.len(), 1);
        let seen = devices[0].last_seen.unwrap();
        assert!((seen - now).num_milliseconds().abs() < 10);
    }

    #[test]
    fn test_device_upsert_keeps_known_mac_and_hostname() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let now = Utc::now();
        let dev = discovered("192.168.1.10");

        store
            .append_device_sample(&dev, &device_sample_at(&dev.ip, now, Some(5.0)))
            .unwrap();
        // Later sightings may lose the MAC or hostname; keep the known ones.
        let anonymous = DiscoveredDevice {
            ip: dev.ip.clone(),
            mac: None,
            hostname: None,
        };
        store
            .append_device_sample(
                &anonymous,
                &device_sample_at(&dev.ip, now + ChronoDuration::seconds(5), Some(5.0)),
            )
            .unwrap();

        let devices = store.devices().unwrap();
        assert_eq!(devices[0].mac.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(devices[0].hostname.as_deref(), Some("test-host"));
    }

    #[test]
    fn test_recent_device_samples_limit() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let now = Utc::now();
        let dev = discovered("10.0.0.5");

        for i in 0..5 {
            store
                .append_device_sample(
                    &dev,
                    &device_sample_at(
                        &dev.ip,
                        now - ChronoDuration::seconds(i * 5),
                        Some(i as f64),
                    ),
                )
                .unwrap();
        }

        let recent = store.recent_device_samples(&dev.ip, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].latency_ms, Some(0.0));
        assert_eq!(recent[1].latency_ms, Some(1.0));
    }

    #[test]
    fn test_down_device_sample_is_recorded() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let dev = discovered("10.0.0.9");

        store
            .append_device_sample(&dev, &device_sample_at(&dev.ip, Utc::now(), None))
            .unwrap();

        let recent = store.recent_device_samples(&dev.ip, 1).unwrap();
        assert_eq!(recent.len(), 1);
        assert!(!recent[0].up);
        assert!(recent[0].latency_ms.is_none());
    }

    #[test]
    fn test_prune_before() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let now = Utc::now();
        let dev = discovered("10.0.0.7");

        store
            .append_sample(&sample_at(now - ChronoDuration::hours(2), 10.0))
            .unwrap();
        store.append_sample(&sample_at(now, 20.0)).unwrap();
        store
            .append_device_sample(
                &dev,
                &device_sample_at(&dev.ip, now - ChronoDuration::hours(2), Some(1.0)),
            )
            .unwrap();

        let (m, dm) = store.prune_before(now - ChronoDuration::hours(1)).unwrap();
        assert_eq!(m, 1);
        assert_eq!(dm, 1);

        let samples = store
            .samples_since(now - ChronoDuration::hours(3))
            .unwrap();
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn test_parse_db_time_roundtrip() {
        let now = Utc::now();
        let parsed = parse_db_time(&format_db_time(now)).unwrap();
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }
}
