// SPDX-License-Identifier: GPL-2.0-or-later

use crate::node_info::NodeInfo;
use crate::perf::PerformanceLog;
use crate::scheduler::SchedulerState;
use graph::{Graph, NodeId};
use std::sync::atomic::AtomicBool;
use std::sync::{Condvar, Mutex};

/// State shared between the driving thread and every worker thread. A
/// `NodeId`'s position in `infos`/`parents` is its `as_usize()` value, sized
/// to the graph's full arena (`Graph::arena_len`) rather than the live node
/// count so it stays valid even if the graph had nodes eliminated before
/// being handed to the executor.
pub(crate) struct Shared {
    pub graph: Mutex<Graph>,
    pub infos: Vec<Mutex<NodeInfo>>,
    pub parents: Vec<Vec<NodeId>>,
    pub sched: Mutex<SchedulerState>,
    pub work_available: Condvar,
    pub work_ready: Condvar,
    pub aborted: AtomicBool,
    pub quit: AtomicBool,
    pub perf: Option<PerformanceLog>,
}

impl Shared {
    /// True iff some node is currently running or has queued input. Scans
    /// under each node's own lock rather than trusting an incrementally
    /// maintained counter, which would be prone to drift under the
    /// concurrent empty/non-empty transitions `node_has_input` and the
    /// worker loop can both observe for the same node.
    pub fn any_node_busy(&self) -> bool {
        self.infos.iter().any(|m| {
            let info = m.lock().expect("node info mutex poisoned");
            info.running || info.has_work()
        })
    }

    pub fn any_source_active(&self) -> bool {
        let graph = self.graph.lock().expect("graph mutex poisoned");
        graph.sources().iter().any(|&id| graph.is_active(id))
    }
}
