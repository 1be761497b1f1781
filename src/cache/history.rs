//! Rolling 30-day billing history used for sparkline rendering
//! (SPEC_FULL §3.3, §4.4).

use crate::error::CacheError;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

const WINDOW_DAYS: i64 = 30;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DaySpend {
    /// Always `YYYY-MM-DD`; pruning and sorting rely on lexicographic
    /// comparison matching chronological order, which only holds for this
    /// exact format.
    pub date: String,
    pub spend_usd: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BillingHistory {
    #[serde(default)]
    pub provider_history: HashMap<String, Vec<DaySpend>>,
    #[serde(default)]
    pub total_history: Vec<DaySpend>,
    #[serde(default = "Utc::now")]
    pub last_updated: chrono::DateTime<Utc>,
}

pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            path: cache_dir.as_ref().join("billing_history.json"),
        }
    }

    /// Returns an empty, initialized structure on a missing or corrupt
    /// file rather than erroring — history is best-effort.
    pub fn load(&self) -> BillingHistory {
        fs::File::open(&self.path)
            .ok()
            .and_then(|f| serde_json::from_reader(BufReader::new(f)).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, history: &BillingHistory) -> Result<(), CacheError> {
        let tmp = self.path.with_extension("json.tmp");
        {
            let file = fs::File::create(&tmp).map_err(|source| CacheError::Write {
                key: "billing_history".to_string(),
                source,
            })?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, history).map_err(|source| CacheError::Serialize {
                key: "billing_history".to_string(),
                source,
            })?;
        }
        if fs::rename(&tmp, &self.path).is_err() {
            fs::copy(&tmp, &self.path).and_then(|_| fs::remove_file(&tmp)).map_err(|source| {
                CacheError::Write {
                    key: "billing_history".to_string(),
                    source,
                }
            })?;
        }
        Ok(())
    }

    /// Merges today's per-provider totals into `history`: same-date entries
    /// are overwritten in place, the day's aggregate is recomputed from
    /// non-error providers only, then the whole history is sorted and
    /// pruned to the 30-day window.
    pub fn update(&self, history: &mut BillingHistory, today: NaiveDate, per_provider_usd: &[(String, f64)]) {
        let date_str = today.format("%Y-%m-%d").to_string();

        for (provider, spend) in per_provider_usd {
            let entries = history.provider_history.entry(provider.clone()).or_default();
            upsert_day(entries, &date_str, *spend);
        }

        let total_today: f64 = per_provider_usd.iter().map(|(_, v)| v).sum();
        upsert_day(&mut history.total_history, &date_str, total_today);

        let cutoff = (Utc::now().date_naive() - ChronoDuration::days(WINDOW_DAYS))
            .format("%Y-%m-%d")
            .to_string();
        for entries in history.provider_history.values_mut() {
            prune_before(entries, &cutoff);
        }
        prune_before(&mut history.total_history, &cutoff);

        history.last_updated = Utc::now();
    }
}

fn upsert_day(entries: &mut Vec<DaySpend>, date: &str, spend_usd: f64) {
    if let Some(existing) = entries.iter_mut().find(|e| e.date == date) {
        existing.spend_usd = spend_usd;
    } else {
        entries.push(DaySpend {
            date: date.to_string(),
            spend_usd,
        });
    }
    entries.sort_by(|a, b| a.date.cmp(&b.date));
}

fn prune_before(entries: &mut Vec<DaySpend>, cutoff: &str) {
    entries.retain(|e| e.date.as_str() >= cutoff);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_day_update_overwrites_in_place() {
        let mut history = BillingHistory::default();
        let store = HistoryStore::new(std::env::temp_dir());
        let day = NaiveDate::from_ymd_opt(2026, 7, 31).unwrap();
        store.update(&mut history, day, &[("civo".to_string(), 1.0)]);
        store.update(&mut history, day, &[("civo".to_string(), 2.0)]);
        let entries = &history.provider_history["civo"];
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].spend_usd, 2.0);
    }

    #[test]
    fn prunes_entries_older_than_30_days() {
        let mut history = BillingHistory::default();
        history.provider_history.insert(
            "civo".to_string(),
            vec![DaySpend {
                date: "2000-01-01".to_string(),
                spend_usd: 5.0,
            }],
        );
        let store = HistoryStore::new(std::env::temp_dir());
        let today = Utc::now().date_naive();
        store.update(&mut history, today, &[("civo".to_string(), 1.0)]);
        assert_eq!(history.provider_history["civo"].len(), 1);
        assert_eq!(history.provider_history["civo"][0].date, today.format("%Y-%m-%d").to_string());
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        let mut history = BillingHistory::default();
        let day = NaiveDate::from_ymd_opt(2026, 7, 31).unwrap();
        store.update(&mut history, day, &[("civo".to_string(), 3.5)]);
        store.save(&history).unwrap();
        let loaded = store.load();
        assert_eq!(loaded.provider_history["civo"][0].spend_usd, 3.5);
    }

    #[test]
    fn load_on_missing_file_is_empty_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        let history = store.load();
        assert!(history.provider_history.is_empty());
        assert!(history.total_history.is_empty());
    }
}
