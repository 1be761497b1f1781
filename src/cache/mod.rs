//! Atomic per-key JSON cache plus the rolling billing history store
//! (SPEC_FULL §3.3, §4.4).
//!
//! The write-to-`.tmp`-then-rename discipline and the `CacheResult`
//! tri-state are carried over from the tokscale TUI cache
//! (`other_examples/...tokscale-cli-src-tui-cache.rs.rs`).

pub mod history;

use crate::error::CacheError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, PartialEq)]
pub enum CacheResult<T> {
    Fresh(T),
    Stale(T),
    Miss,
}

#[derive(Default, serde::Serialize, serde::Deserialize)]
struct Meta {
    #[serde(default)]
    last_write: HashMap<String, DateTime<Utc>>,
}

/// Atomic single-writer/multi-reader cache directory.
pub struct CacheStore {
    dir: PathBuf,
    meta_lock: Mutex<()>,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            meta_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join("meta.json")
    }

    /// Writes `value` under `name`, then records `name`'s write time in
    /// `meta.json`. Both writes go through the temp-then-rename discipline
    /// so readers never observe a partial file.
    pub async fn set<T: Serialize>(&self, name: &str, value: &T) -> Result<(), CacheError> {
        let path = self.blob_path(name);
        atomic_write_json(&path, value).map_err(|source| CacheError::Write {
            key: name.to_string(),
            source,
        })?;

        let _guard = self.meta_lock.lock().await;
        let meta_path = self.meta_path();
        let mut meta: Meta = read_json(&meta_path).unwrap_or_default();
        meta.last_write.insert(name.to_string(), Utc::now());
        atomic_write_json(&meta_path, &meta).map_err(|source| CacheError::Write {
            key: "meta".to_string(),
            source,
        })?;
        Ok(())
    }

    /// Returns the parsed value for `name` unless the file is missing,
    /// unparseable, or older than `max_age` — all three collapse to `None`
    /// so readers degrade gracefully rather than erroring.
    pub fn get<T: DeserializeOwned>(&self, name: &str, max_age: Duration) -> Option<T> {
        match self.get_with_freshness::<T>(name, max_age) {
            CacheResult::Fresh(v) => Some(v),
            CacheResult::Stale(_) | CacheResult::Miss => None,
        }
    }

    pub fn get_with_freshness<T: DeserializeOwned>(&self, name: &str, max_age: Duration) -> CacheResult<T> {
        let path = self.blob_path(name);
        let value: T = match read_json(&path) {
            Some(v) => v,
            None => return CacheResult::Miss,
        };
        let meta: Meta = read_json(&self.meta_path()).unwrap_or_default();
        let age = meta
            .last_write
            .get(name)
            .map(|t| Utc::now().signed_duration_since(*t));
        match age {
            Some(age) if age.to_std().map(|a| a <= max_age).unwrap_or(false) => CacheResult::Fresh(value),
            Some(_) => CacheResult::Stale(value),
            None => CacheResult::Stale(value),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let meta: Meta = read_json(&self.meta_path()).unwrap_or_default();
        meta.last_write.keys().cloned().collect()
    }

    pub fn meta(&self) -> HashMap<String, DateTime<Utc>> {
        let meta: Meta = read_json(&self.meta_path()).unwrap_or_default();
        meta.last_write
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let file = fs::File::open(path).ok()?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).ok()
}

fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    {
        let file = fs::File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
    }
    if fs::rename(&tmp_path, path).is_err() {
        fs::copy(&tmp_path, path)?;
        fs::remove_file(&tmp_path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path()).unwrap();
        store.set("widget", &42u32).await.unwrap();
        let got: Option<u32> = store.get("widget", Duration::from_secs(60));
        assert_eq!(got, Some(42));
    }

    #[tokio::test]
    async fn missing_key_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path()).unwrap();
        let got: Option<u32> = store.get("nope", Duration::from_secs(60));
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn stale_entry_is_not_returned_as_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path()).unwrap();
        store.set("widget", &1u32).await.unwrap();
        let got: Option<u32> = store.get("widget", Duration::from_millis(0));
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn corrupt_blob_is_a_miss_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path()).unwrap();
        fs::write(dir.path().join("widget.json"), b"{not json").unwrap();
        let got: Option<u32> = store.get("widget", Duration::from_secs(60));
        assert_eq!(got, None);
    }
}
