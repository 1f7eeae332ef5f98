// SPDX-License-Identifier: GPL-2.0-or-later

//! Optional performance logging (`spec.md` §6 "Performance logs"): every
//! 100ms, a general CSV (`time;count;size`), a one-time catalog
//! (`file;info`), one CSV per node, and a one-character stderr heartbeat per
//! node per tick. Gated behind `ParallelExecutorConfig::enable_performance_logging`
//! (mirrors `ParallelGraph::Config::enablePerformanceLogging` in the
//! original), since it is pure diagnostics and never feeds back into
//! scheduling decisions.

use crate::shared::Shared;
use common::global_data_allocations;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const TICK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Default)]
struct NodeSnapshot {
    input_calls: u64,
    output_emissions: u64,
}

pub struct PerformanceLog {
    dir: PathBuf,
    start: Instant,
    state: Mutex<State>,
}

struct State {
    last_tick: Instant,
    wrote_catalog: bool,
    snapshots: Vec<NodeSnapshot>,
}

impl PerformanceLog {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            start: Instant::now(),
            state: Mutex::new(State {
                last_tick: Instant::now() - TICK_INTERVAL,
                wrote_catalog: false,
                snapshots: Vec::new(),
            }),
        })
    }

    /// Writes one tick's worth of diagnostics if at least `TICK_INTERVAL`
    /// has elapsed since the last one; a no-op otherwise so callers can
    /// invoke this on every `step()` without throttling it themselves.
    pub fn maybe_tick(&self, shared: &Shared, node_names: &[String]) {
        let mut state = self.state.lock().expect("perf log mutex poisoned");
        let now = Instant::now();
        if now.duration_since(state.last_tick) < TICK_INTERVAL {
            return;
        }
        state.last_tick = now;
        if state.snapshots.len() < node_names.len() {
            state.snapshots.resize(node_names.len(), NodeSnapshot::default());
        }

        if !state.wrote_catalog {
            self.write_catalog(node_names);
            state.wrote_catalog = true;
        }

        let elapsed_secs = now.duration_since(self.start).as_secs_f64();
        let alloc = global_data_allocations();
        self.append(
            "general.csv",
            &format!("{elapsed_secs:.3};{};{}\n", alloc.count, alloc.bytes),
        );

        let mut heartbeat = String::with_capacity(node_names.len());
        for (idx, name) in node_names.iter().enumerate() {
            let Some(info_lock) = shared.infos.get(idx) else {
                continue;
            };
            let info = info_lock.lock().expect("node info mutex poisoned");
            let age = info
                .oldest_enqueued_data
                .map(|v| v.to_string())
                .unwrap_or_default();
            self.append(
                &format!("node_{idx}_{}.csv", sanitize(name)),
                &format!(
                    "{elapsed_secs:.3},{},{},{},{},{},{},{},{}\n",
                    info.runtime_secs,
                    info.enqueued.len(),
                    u8::from(info.running),
                    info.num_blocked_outputs,
                    age,
                    u8::from(info.set_parent_blocked),
                    info.input_calls,
                    info.output_emissions,
                    info.num_output_nodes,
                ),
            );

            let prev = state.snapshots[idx];
            let produced = info.output_emissions > prev.output_emissions;
            let consumed = info.input_calls > prev.input_calls;
            heartbeat.push(if info.running {
                '@'
            } else if produced && consumed {
                '='
            } else if consumed {
                '<'
            } else if produced {
                '>'
            } else {
                '.'
            });
            state.snapshots[idx] = NodeSnapshot {
                input_calls: info.input_calls,
                output_emissions: info.output_emissions,
            };
        }
        eprintln!("{heartbeat}");
    }

    fn write_catalog(&self, node_names: &[String]) {
        let path = self.dir.join("catalog.csv");
        let Ok(mut file) = File::create(path) else {
            return;
        };
        let _ = writeln!(file, "file;info");
        let _ = writeln!(file, "general.csv;allocation counters");
        for (idx, name) in node_names.iter().enumerate() {
            let _ = writeln!(
                file,
                "node_{idx}_{}.csv;per-node scheduling state for {name}",
                sanitize(name)
            );
        }
    }

    fn append(&self, file_name: &str, line: &str) {
        let path = self.dir.join(file_name);
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = file.write_all(line.as_bytes());
        }
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_non_alnum() {
        assert_eq!(sanitize("tile proxy/1"), "tile_proxy_1");
    }

    #[test]
    fn test_new_creates_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("perf");
        PerformanceLog::new(&path).expect("create perf log");
        assert!(Path::new(&path).is_dir());
    }
}
