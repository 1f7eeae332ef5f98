// SPDX-License-Identifier: GPL-2.0-or-later

//! The worker thread body (`spec.md` §4.3 "Worker loop") plus the output
//! routing shared between workers and the driving thread's inline source
//! calls (`nodeHasOutput`/`nodeHasInput`).

use crate::shared::Shared;
use common::Streams;
use graph::{GraphError, NodeId, NodeKind};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

/// Forwards `streams` along every outgoing edge of `from`, applying each
/// edge's filter, and delivers the filtered bundle to each target via
/// [`node_has_input`]. Mirrors `nodeHasOutput`.
pub(crate) fn node_has_output(shared: &Shared, from: NodeId, streams: &Streams) {
    let edges = {
        let graph = shared.graph.lock().expect("graph mutex poisoned");
        graph.callbacks(from).to_vec()
    };
    for edge in edges {
        if let Some(filtered) = edge.filter.apply(streams) {
            node_has_input(shared, edge.target, filtered);
        }
    }
}

/// Delivers one frame bundle to `target`'s input queue and updates the
/// back-pressure accounting this may trigger. Mirrors `nodeHasInput`
/// (`spec.md` §4.3): child lock is acquired first and, only while still
/// held, each parent's lock is acquired in turn — the one ordering rule
/// the whole scheduler depends on for deadlock freedom.
pub(crate) fn node_has_input(shared: &Shared, target: NodeId, streams: Streams) {
    let mut info = shared.infos[target.as_usize()].lock().expect("node info mutex poisoned");
    if info.terminated {
        return;
    }
    let was_empty = !info.has_work();
    let was_running = info.running;
    info.push(streams);

    let should_flag_parents = info.is_over_employed() && !info.set_parent_blocked;
    if should_flag_parents {
        info.set_parent_blocked = true;
    }
    let age = info.oldest_enqueued_data;

    if should_flag_parents {
        for &parent in &shared.parents[target.as_usize()] {
            let mut pinfo = shared.infos[parent.as_usize()]
                .lock()
                .expect("node info mutex poisoned");
            pinfo.num_blocked_outputs += 1;
        }
    }
    drop(info);

    if was_empty && !was_running {
        let mut sched = shared.sched.lock().expect("scheduler mutex poisoned");
        if let Some(age) = age {
            sched.insert(age, target);
        }
        drop(sched);
        shared.work_available.notify_all();
    }
}

/// Waits for the scheduler's age index to have an eligible node, or for
/// shutdown. Polls on a bounded timeout rather than relying solely on
/// precise wakeup accounting, so a missed `notify` (e.g. during the brief
/// window between a producer releasing the scheduler lock and a worker
/// re-acquiring it) can never wedge a worker forever.
fn wait_for_node(shared: &Shared) -> Option<NodeId> {
    let mut sched = shared.sched.lock().expect("scheduler mutex poisoned");
    loop {
        if shared.quit.load(Ordering::Relaxed) {
            return None;
        }
        if let Some(id) = sched.pop_next() {
            return Some(id);
        }
        let (guard, _timeout) = shared
            .work_available
            .wait_timeout(sched, Duration::from_millis(200))
            .expect("scheduler mutex poisoned");
        sched = guard;
    }
}

pub(crate) fn worker_loop(shared: &Shared) {
    loop {
        let Some(node_id) = wait_for_node(shared) else {
            return;
        };
        run_node_once(shared, node_id);
    }
}

/// Runs one scheduling turn for `node_id`: re-validates eligibility under
/// lock, checks the node body out of the graph, drains its queue with the
/// lock released, then returns the body and reconciles back-pressure
/// accounting for its parents.
fn run_node_once(shared: &Shared, node_id: NodeId) {
    {
        let mut info = shared.infos[node_id.as_usize()]
            .lock()
            .expect("node info mutex poisoned");
        if info.running || info.terminated || !info.has_work() || info.is_outputs_blocked() {
            return;
        }
        info.running = true;
    }

    let Some(mut node_kind) = ({
        let mut graph = shared.graph.lock().expect("graph mutex poisoned");
        graph.take_node(node_id)
    }) else {
        let mut info = shared.infos[node_id.as_usize()]
            .lock()
            .expect("node info mutex poisoned");
        info.running = false;
        return;
    };

    let start = Instant::now();
    let mut failure = None;
    loop {
        let item = {
            let mut info = shared.infos[node_id.as_usize()]
                .lock()
                .expect("node info mutex poisoned");
            info.pop()
        };
        let Some(item) = item else { break };

        let result = match &mut node_kind {
            NodeKind::Processor(p) => p.has_input(item),
            NodeKind::Sink(s) => s.consume(item).map(|()| Vec::new()),
            NodeKind::Source(_) => {
                unreachable!("a source is never the target of an edge")
            }
        };

        match result {
            Ok(outputs) => {
                {
                    let mut info = shared.infos[node_id.as_usize()]
                        .lock()
                        .expect("node info mutex poisoned");
                    info.output_emissions += outputs.len() as u64;
                }
                for out in &outputs {
                    node_has_output(shared, node_id, out);
                }
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    let elapsed = start.elapsed();

    {
        let mut graph = shared.graph.lock().expect("graph mutex poisoned");
        graph.return_node(node_id, node_kind);
    }

    let node_name = {
        let graph = shared.graph.lock().expect("graph mutex poisoned");
        graph.node_name(node_id)
    };

    let (still_has_work, age, woken_parents) = {
        let mut info = shared.infos[node_id.as_usize()]
            .lock()
            .expect("node info mutex poisoned");
        info.record_runtime(elapsed);
        info.running = false;
        if failure.is_some() {
            info.terminated = true;
        }
        let no_longer_over_employed = !info.is_over_employed();
        let should_wake_parents = no_longer_over_employed && info.set_parent_blocked;
        if should_wake_parents {
            info.set_parent_blocked = false;
        }
        let still_has_work = info.has_work();
        let age = info.oldest_enqueued_data;
        (
            still_has_work,
            age,
            if should_wake_parents {
                shared.parents[node_id.as_usize()].clone()
            } else {
                Vec::new()
            },
        )
    };

    let mut rescheduled_parents = Vec::new();
    for parent in woken_parents {
        let mut pinfo = shared.infos[parent.as_usize()]
            .lock()
            .expect("node info mutex poisoned");
        pinfo.num_blocked_outputs = pinfo.num_blocked_outputs.saturating_sub(1);
        if !pinfo.running && !pinfo.is_outputs_blocked() && pinfo.has_work() {
            if let Some(parent_age) = pinfo.oldest_enqueued_data {
                rescheduled_parents.push((parent, parent_age));
            }
        }
    }

    let mut sched = shared.sched.lock().expect("scheduler mutex poisoned");
    if let Some(error) = failure {
        sched.errors.push(GraphError {
            node_id,
            node_name,
            error,
        });
    }
    if still_has_work {
        if let Some(age) = age {
            sched.insert(age, node_id);
        }
    }
    for (parent, parent_age) in rescheduled_parents {
        sched.insert(parent_age, parent);
    }
    drop(sched);
    shared.work_available.notify_all();
    shared.work_ready.notify_all();
}
