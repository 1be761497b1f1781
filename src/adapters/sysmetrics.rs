//! Local OS metrics adapter (SPEC_FULL §4.2), grounded in the monitoring
//! harness's `/proc/stat` delta-sampling CPU sampler
//! (`other_examples/...-proxy-src-metrics.rs.rs`). All file reads and the
//! `statvfs` syscall go through the `SysSource` trait so tests can supply
//! fixed fixture text instead of touching the real machine. Ring buffers
//! are seeded from the previously cached `SysMetrics` blob at
//! construction time so samples survive a daemon restart; the CPU delta
//! counters themselves are not persisted, so the first post-restart
//! sample always reports 0.

use crate::collector::Collector;
use crate::error::CollectorError;
use crate::model::{CollectResult, CollectedData, SysMetrics};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const HISTORY_CAPACITY: usize = 60;

pub trait SysSource: Send + Sync {
    fn read_stat(&self) -> std::io::Result<String>;
    fn read_meminfo(&self) -> std::io::Result<String>;
    fn read_loadavg(&self) -> std::io::Result<String>;
    fn read_uptime(&self) -> std::io::Result<String>;
    fn statvfs_root(&self) -> std::io::Result<(u64, u64)>;
}

pub struct OsSysSource;

impl SysSource for OsSysSource {
    fn read_stat(&self) -> std::io::Result<String> {
        std::fs::read_to_string("/proc/stat")
    }

    fn read_meminfo(&self) -> std::io::Result<String> {
        std::fs::read_to_string("/proc/meminfo")
    }

    fn read_loadavg(&self) -> std::io::Result<String> {
        std::fs::read_to_string("/proc/loadavg")
    }

    fn read_uptime(&self) -> std::io::Result<String> {
        std::fs::read_to_string("/proc/uptime")
    }

    fn statvfs_root(&self) -> std::io::Result<(u64, u64)> {
        let stat = nix::sys::statvfs::statvfs("/").map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
        let total = stat.blocks() * stat.fragment_size();
        let free = stat.blocks_available() * stat.fragment_size();
        Ok((total, free))
    }
}

struct CpuTimes {
    idle: u64,
    total: u64,
}

struct State {
    prev_cpu: Option<CpuTimes>,
    cpu_history: VecDeque<f64>,
    ram_history: VecDeque<f64>,
    disk_history: VecDeque<f64>,
}

pub struct SysMetricsCollector {
    source: Box<dyn SysSource>,
    interval: Duration,
    state: Mutex<State>,
}

impl SysMetricsCollector {
    /// `seed` is the previously cached `SysMetrics` blob, if any, read by
    /// the caller before constructing this collector so ring buffers
    /// survive a daemon restart.
    pub fn new(source: Box<dyn SysSource>, seed: Option<SysMetrics>, interval: Duration) -> Self {
        let (cpu_history, ram_history, disk_history) = match seed {
            Some(s) => (capped(s.cpu_history), capped(s.ram_history), capped(s.disk_history)),
            None => (VecDeque::new(), VecDeque::new(), VecDeque::new()),
        };
        Self {
            source,
            interval,
            state: Mutex::new(State {
                prev_cpu: None,
                cpu_history,
                ram_history,
                disk_history,
            }),
        }
    }

    fn sample_cpu_pct(&self, state: &mut State) -> f64 {
        let Ok(contents) = self.source.read_stat() else {
            return 0.0;
        };
        let Some(line) = contents.lines().find(|l| l.starts_with("cpu ")) else {
            return 0.0;
        };
        let fields: Vec<u64> = line.split_whitespace().skip(1).take(8).filter_map(|s| s.parse().ok()).collect();
        if fields.len() < 4 {
            return 0.0;
        }
        let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
        let total: u64 = fields.iter().sum();
        let current = CpuTimes { idle, total };

        let pct = match &state.prev_cpu {
            Some(prev) => {
                let d_total = current.total.saturating_sub(prev.total);
                let d_idle = current.idle.saturating_sub(prev.idle);
                if d_total == 0 {
                    0.0
                } else {
                    ((d_total - d_idle) as f64 / d_total as f64) * 100.0
                }
            }
            None => 0.0,
        };
        state.prev_cpu = Some(current);
        round1(pct)
    }

    fn sample_ram_pct(&self) -> f64 {
        let Ok(contents) = self.source.read_meminfo() else {
            return 0.0;
        };
        let mut total_kb = None;
        let mut available_kb = None;
        for line in contents.lines() {
            if let Some(v) = line.strip_prefix("MemTotal:") {
                total_kb = v.trim().split_whitespace().next().and_then(|n| n.parse::<f64>().ok());
            } else if let Some(v) = line.strip_prefix("MemAvailable:") {
                available_kb = v.trim().split_whitespace().next().and_then(|n| n.parse::<f64>().ok());
            }
        }
        match (total_kb, available_kb) {
            (Some(total), Some(available)) if total > 0.0 => round1(((total - available) / total) * 100.0),
            _ => 0.0,
        }
    }

    fn sample_loadavg(&self) -> (f64, f64, f64) {
        let Ok(contents) = self.source.read_loadavg() else {
            return (0.0, 0.0, 0.0);
        };
        let fields: Vec<f64> = contents.split_whitespace().take(3).filter_map(|s| s.parse().ok()).collect();
        match fields.as_slice() {
            [a, b, c] => (*a, *b, *c),
            _ => (0.0, 0.0, 0.0),
        }
    }

    fn sample_uptime_secs(&self) -> u64 {
        self.source
            .read_uptime()
            .ok()
            .and_then(|s| s.split_whitespace().next().and_then(|n| n.parse::<f64>().ok()))
            .map(|secs| secs as u64)
            .unwrap_or(0)
    }

    fn sample_disk_pct(&self) -> f64 {
        match self.source.statvfs_root() {
            Ok((total, free)) if total > 0 => round1(((total - free) as f64 / total as f64) * 100.0),
            _ => 0.0,
        }
    }
}

#[async_trait]
impl Collector for SysMetricsCollector {
    fn name(&self) -> &str {
        "sysmetrics"
    }

    fn description(&self) -> &str {
        "Local CPU, RAM, disk, and load metrics"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn collect(&self, ctx: &CancellationToken) -> Result<CollectResult, CollectorError> {
        if ctx.is_cancelled() {
            return Err(CollectorError::Cancelled {
                collector: self.name().to_string(),
            });
        }

        let ram_pct = self.sample_ram_pct();
        let disk_pct = self.sample_disk_pct();
        let (load_1, load_5, load_15) = self.sample_loadavg();
        let uptime_secs = self.sample_uptime_secs();

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let cpu_pct = self.sample_cpu_pct(&mut state);

        push_capped(&mut state.cpu_history, cpu_pct);
        push_capped(&mut state.ram_history, ram_pct);
        push_capped(&mut state.disk_history, disk_pct);

        let metrics = SysMetrics {
            cpu_pct,
            ram_pct,
            disk_pct,
            load_1,
            load_5,
            load_15,
            uptime_secs,
            cpu_history: state.cpu_history.iter().copied().collect(),
            ram_history: state.ram_history.iter().copied().collect(),
            disk_history: state.disk_history.iter().copied().collect(),
        };
        drop(state);

        Ok(CollectResult {
            collector: self.name().to_string(),
            timestamp: Utc::now(),
            data: CollectedData::SysMetrics(metrics),
            warnings: Vec::new(),
        })
    }
}

fn capped(values: Vec<f64>) -> VecDeque<f64> {
    let mut deque: VecDeque<f64> = values.into();
    while deque.len() > HISTORY_CAPACITY {
        deque.pop_front();
    }
    deque
}

fn push_capped(buffer: &mut VecDeque<f64>, value: f64) {
    if buffer.len() >= HISTORY_CAPACITY {
        buffer.pop_front();
    }
    buffer.push_back(value);
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct FixtureSource {
        stat: StdMutex<Vec<String>>,
        meminfo: String,
        loadavg: String,
        uptime: String,
        disk: (u64, u64),
    }

    impl SysSource for FixtureSource {
        fn read_stat(&self) -> std::io::Result<String> {
            let mut samples = self.stat.lock().unwrap();
            if samples.len() > 1 {
                Ok(samples.remove(0))
            } else {
                Ok(samples[0].clone())
            }
        }
        fn read_meminfo(&self) -> std::io::Result<String> {
            Ok(self.meminfo.clone())
        }
        fn read_loadavg(&self) -> std::io::Result<String> {
            Ok(self.loadavg.clone())
        }
        fn read_uptime(&self) -> std::io::Result<String> {
            Ok(self.uptime.clone())
        }
        fn statvfs_root(&self) -> std::io::Result<(u64, u64)> {
            Ok(self.disk)
        }
    }

    fn fixture() -> FixtureSource {
        FixtureSource {
            stat: StdMutex::new(vec![
                "cpu  1000 0 1000 8000 0 0 0 0\n".to_string(),
                "cpu  2000 0 2000 8000 0 0 0 0\n".to_string(),
            ]),
            meminfo: "MemTotal:       16000000 kB\nMemAvailable:    8000000 kB\n".to_string(),
            loadavg: "0.50 0.75 1.00 1/200 12345\n".to_string(),
            uptime: "123456.78 98765.43\n".to_string(),
            disk: (1000, 500),
        }
    }

    #[tokio::test]
    async fn first_sample_reports_zero_cpu() {
        let collector = SysMetricsCollector::new(Box::new(fixture()), None, Duration::from_secs(5));
        let ctx = CancellationToken::new();
        let result = collector.collect(&ctx).await.unwrap();
        let CollectedData::SysMetrics(metrics) = result.data else {
            panic!("expected sysmetrics data");
        };
        assert_eq!(metrics.cpu_pct, 0.0);
        assert_eq!(metrics.ram_pct, 50.0);
        assert_eq!(metrics.disk_pct, 50.0);
        assert_eq!(metrics.load_1, 0.50);
    }

    #[tokio::test]
    async fn second_sample_computes_delta_cpu() {
        let collector = SysMetricsCollector::new(Box::new(fixture()), None, Duration::from_secs(5));
        let ctx = CancellationToken::new();
        let _ = collector.collect(&ctx).await.unwrap();
        let result = collector.collect(&ctx).await.unwrap();
        let CollectedData::SysMetrics(metrics) = result.data else {
            panic!("expected sysmetrics data");
        };
        assert!(metrics.cpu_pct > 0.0);
        assert_eq!(metrics.cpu_history.len(), 2);
    }

    #[tokio::test]
    async fn restart_reload_seeds_history_and_zeroes_first_cpu_sample() {
        let seed = SysMetrics {
            cpu_pct: 15.0,
            ram_pct: 40.0,
            disk_pct: 30.0,
            load_1: 0.1,
            load_5: 0.1,
            load_15: 0.1,
            uptime_secs: 10,
            cpu_history: vec![5.0, 10.0, 15.0],
            ram_history: vec![40.0],
            disk_history: vec![30.0],
        };
        let collector = SysMetricsCollector::new(Box::new(fixture()), Some(seed), Duration::from_secs(5));
        let ctx = CancellationToken::new();
        let result = collector.collect(&ctx).await.unwrap();
        let CollectedData::SysMetrics(metrics) = result.data else {
            panic!("expected sysmetrics data");
        };
        assert_eq!(metrics.cpu_pct, 0.0);
        assert_eq!(metrics.cpu_history, vec![5.0, 10.0, 15.0, 0.0]);
    }

    #[test]
    fn push_capped_discards_oldest_when_full() {
        let mut buffer: VecDeque<f64> = (0..HISTORY_CAPACITY).map(|i| i as f64).collect();
        push_capped(&mut buffer, 999.0);
        assert_eq!(buffer.len(), HISTORY_CAPACITY);
        assert_eq!(*buffer.back().unwrap(), 999.0);
        assert_eq!(*buffer.front().unwrap(), 1.0);
    }
}
