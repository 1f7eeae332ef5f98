// SPDX-License-Identifier: GPL-2.0-or-later

//! Multi-threaded work-stealing-style scheduler (`spec.md` §4.3). Keeps
//! worker threads busy on independent nodes while respecting at-most-one-
//! in-flight per processor, output back-pressure, age-fair scheduling, and
//! clean end-of-stream/abort propagation.
//!
//! Unlike [`sequential_executor::SequentialExecutor`], which borrows the
//! `Graph` it steps (everything happens on the caller's own thread, so
//! there is nothing to hand to anyone else), this executor takes ownership
//! of the `Graph` at construction: worker threads need `'static` access to
//! it, and an owned `Arc<Mutex<Graph>>` is the natural way to give several
//! threads that. Call [`ParallelExecutor::into_graph`] to get the `Graph`
//! back (e.g. for a post-run `graphviz()` dump) once stepping is done.

mod node_info;
mod perf;
mod scheduler;
mod shared;
mod worker;

pub use node_info::{presentation_index_of, NodeInfo};
pub use perf::PerformanceLog;

use crate::scheduler::SchedulerState;
use crate::shared::Shared;
use graph::{Executor, Graph, GraphErrors, NodeId, NodeKind};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const STEP_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Construction-time options. Absent a worker count, the pool is sized to
/// [`std::thread::available_parallelism`], matching `spec.md` §4.3's "fixed
/// pool sized to hardware parallelism".
#[derive(Default)]
pub struct ParallelExecutorConfig {
    pub num_workers: Option<usize>,
    pub performance_log_dir: Option<PathBuf>,
}

pub struct ParallelExecutor {
    shared: std::sync::Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    started: bool,
    num_workers: usize,
    node_names: Vec<String>,
}

impl ParallelExecutor {
    #[must_use]
    pub fn new(graph: Graph) -> Self {
        Self::with_config(graph, ParallelExecutorConfig::default())
    }

    #[must_use]
    pub fn with_config(graph: Graph, config: ParallelExecutorConfig) -> Self {
        let arena_len = graph.arena_len();
        let ids = graph.node_ids();

        let mut infos: Vec<Mutex<NodeInfo>> = (0..arena_len)
            .map(|_| Mutex::new(NodeInfo::default()))
            .collect();
        let mut parents: Vec<Vec<NodeId>> = vec![Vec::new(); arena_len];
        let mut node_names = vec![String::new(); arena_len];

        for &id in &ids {
            let out_degree = graph.callbacks(id).len();
            let is_source = matches!(graph.find_node_by_id(id), Some(NodeKind::Source(_)));
            infos[id.as_usize()] = Mutex::new(NodeInfo::new(is_source, out_degree));
            node_names[id.as_usize()] = graph.node_name(id);
            for edge in graph.callbacks(id) {
                parents[edge.target.as_usize()].push(id);
            }
        }

        let perf = config.performance_log_dir.and_then(|dir| {
            PerformanceLog::new(dir)
                .map_err(|e| eprintln!("omaf_parallel_executor: disabling performance log: {e}"))
                .ok()
        });

        let shared = std::sync::Arc::new(Shared {
            graph: Mutex::new(graph),
            infos,
            parents,
            sched: Mutex::new(SchedulerState::default()),
            work_available: Condvar::new(),
            work_ready: Condvar::new(),
            aborted: std::sync::atomic::AtomicBool::new(false),
            quit: std::sync::atomic::AtomicBool::new(false),
            perf,
        });

        let num_workers = config.num_workers.unwrap_or_else(|| {
            thread::available_parallelism()
                .ok()
                .map_or(1, std::num::NonZeroUsize::get)
        });

        Self {
            shared,
            workers: Vec::new(),
            started: false,
            num_workers: num_workers.max(1),
            node_names,
        }
    }

    /// Stops worker threads (if running) and hands the `Graph` back.
    #[must_use]
    pub fn into_graph(mut self) -> Graph {
        self.stop();
        let shared = match std::sync::Arc::try_unwrap(self.shared) {
            Ok(shared) => shared,
            Err(_) => panic!("worker threads outlived ParallelExecutor::stop"),
        };
        shared.graph.into_inner().expect("graph mutex poisoned")
    }

    fn ensure_started(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        {
            let mut graph = self.shared.graph.lock().expect("graph mutex poisoned");
            for id in graph.node_ids() {
                if let Some(kind) = graph.find_node_by_id_mut(id) {
                    kind.graph_started();
                }
            }
        }
        for _ in 0..self.num_workers {
            let shared = std::sync::Arc::clone(&self.shared);
            self.workers
                .push(thread::spawn(move || worker::worker_loop(&shared)));
        }
    }

    /// Re-reads each node's own `isBlocked()` and wakes any parent that was
    /// throttled on account of it becoming unblocked. Run once per `step()`
    /// ahead of driving sources, per `spec.md` §4.3 step (iii).
    fn refresh_internally_blocked(&mut self) {
        let ids: Vec<NodeId> = {
            let graph = self.shared.graph.lock().expect("graph mutex poisoned");
            graph.node_ids()
        };
        for id in ids {
            let blocked = {
                let graph = self.shared.graph.lock().expect("graph mutex poisoned");
                graph.find_node_by_id(id).is_some_and(NodeKind::is_blocked)
            };
            let mut info = self.shared.infos[id.as_usize()]
                .lock()
                .expect("node info mutex poisoned");
            let was_over_employed = info.is_over_employed();
            info.is_internally_blocked = blocked;
            let became_unblocked = was_over_employed && !info.is_over_employed() && info.set_parent_blocked;
            if became_unblocked {
                info.set_parent_blocked = false;
                let parents = self.shared.parents[id.as_usize()].clone();
                drop(info);
                for parent in parents {
                    let mut pinfo = self.shared.infos[parent.as_usize()]
                        .lock()
                        .expect("node info mutex poisoned");
                    pinfo.num_blocked_outputs = pinfo.num_blocked_outputs.saturating_sub(1);
                }
            }
        }
    }

    /// Runs every active source whose outputs are not currently blocked,
    /// inline on the driving thread (`spec.md` §4.3 step (iv): "sources are
    /// run on the step thread, not on workers").
    fn drive_sources(&mut self) {
        let source_ids: Vec<NodeId> = {
            let graph = self.shared.graph.lock().expect("graph mutex poisoned");
            graph.sources().to_vec()
        };
        for source_id in source_ids {
            let active = {
                let graph = self.shared.graph.lock().expect("graph mutex poisoned");
                graph.is_active(source_id)
            };
            if !active {
                continue;
            }
            let blocked = {
                let info = self.shared.infos[source_id.as_usize()]
                    .lock()
                    .expect("node info mutex poisoned");
                info.is_outputs_blocked()
            };
            if blocked {
                continue;
            }

            let Some(mut kind) = ({
                let mut graph = self.shared.graph.lock().expect("graph mutex poisoned");
                graph.take_node(source_id)
            }) else {
                continue;
            };
            let NodeKind::Source(source) = &mut kind else {
                let mut graph = self.shared.graph.lock().expect("graph mutex poisoned");
                graph.return_node(source_id, kind);
                continue;
            };
            let produced = source.produce();
            {
                let mut graph = self.shared.graph.lock().expect("graph mutex poisoned");
                graph.return_node(source_id, kind);
            }

            match produced {
                Ok(bundles) => {
                    let mut went_eos = false;
                    for streams in &bundles {
                        went_eos |= streams.is_end_of_stream();
                        worker::node_has_output(&self.shared, source_id, streams);
                    }
                    if went_eos {
                        let mut graph = self.shared.graph.lock().expect("graph mutex poisoned");
                        graph.set_inactive(source_id);
                    }
                }
                Err(error) => {
                    let node_name = {
                        let graph = self.shared.graph.lock().expect("graph mutex poisoned");
                        graph.node_name(source_id)
                    };
                    let mut sched = self.shared.sched.lock().expect("scheduler mutex poisoned");
                    sched.errors.push(graph::GraphError {
                        node_id: source_id,
                        node_name,
                        error,
                    });
                }
            }
        }
    }

    /// Blocks until either some node becomes busy/idle again or the
    /// 5-second cap elapses, per `spec.md` §4.3 step (v).
    fn wait_for_progress(&self) {
        loop {
            if !self.shared.any_node_busy() && !self.shared.any_source_active() {
                return;
            }
            let sched = self.shared.sched.lock().expect("scheduler mutex poisoned");
            let (_guard, timeout) = self
                .shared
                .work_ready
                .wait_timeout(sched, STEP_WAIT_TIMEOUT)
                .expect("scheduler mutex poisoned");
            if timeout.timed_out() {
                return;
            }
        }
    }

    fn take_errors(&self) -> GraphErrors {
        let mut sched = self.shared.sched.lock().expect("scheduler mutex poisoned");
        GraphErrors(std::mem::take(&mut sched.errors))
    }

    /// Arranges every source to emit end-of-stream next, and lets workers
    /// drain what is still pending: idempotent, matches `spec.md` §5
    /// "Cancellation".
    fn abort(&mut self) {
        if self.shared.aborted.swap(true, Ordering::SeqCst) {
            return;
        }
        let source_ids: Vec<NodeId> = {
            let graph = self.shared.graph.lock().expect("graph mutex poisoned");
            graph.sources().to_vec()
        };
        for id in source_ids {
            let Some(mut kind) = ({
                let mut graph = self.shared.graph.lock().expect("graph mutex poisoned");
                graph.take_node(id)
            }) else {
                continue;
            };
            if let NodeKind::Source(source) = &mut kind {
                source.abort();
            }
            let mut graph = self.shared.graph.lock().expect("graph mutex poisoned");
            graph.return_node(id, kind);
        }
        self.shared.work_available.notify_all();
        self.shared.work_ready.notify_all();
    }
}

impl Executor for ParallelExecutor {
    fn step(&mut self) -> Result<bool, GraphErrors> {
        self.ensure_started();
        self.refresh_internally_blocked();
        self.drive_sources();
        self.wait_for_progress();

        if let Some(perf) = &self.shared.perf {
            perf.maybe_tick(&self.shared, &self.node_names);
        }

        let errors = self.take_errors();
        if !errors.is_empty() {
            {
                let graph = self.shared.graph.lock().expect("graph mutex poisoned");
                graph.set_error_signaled();
            }
            self.abort();
            return Err(errors);
        }

        Ok(self.shared.any_source_active() || self.shared.any_node_busy())
    }

    fn stop(&mut self) {
        self.shared.quit.store(true, Ordering::SeqCst);
        self.shared.work_available.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for ParallelExecutor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests;
