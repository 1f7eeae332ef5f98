// SPDX-License-Identifier: GPL-2.0-or-later

pub mod edge;
pub mod error;
pub mod executor;
pub mod graphviz;
pub mod node;
pub mod node_id;
pub mod stream_filter;

pub use edge::{Edge, EdgeHandle};
pub use error::{GraphError, GraphErrors, NodeError};
pub use executor::{Executor, StopGuard};
pub use node::{NodeBase, Processor, Sink, Source};
pub use node_id::NodeId;
pub use stream_filter::StreamFilter;

use common::ArcMsgLogger;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

/// Tagged variant over the three node capabilities. The executor switches
/// on this tag once at dispatch rather than issuing a virtual call through
/// a common supertrait, per the "avoid per-call dynamic dispatch ambiguity"
/// design note.
pub enum NodeKind {
    Source(Box<dyn Source + Send>),
    Processor(Box<dyn Processor + Send>),
    Sink(Box<dyn Sink + Send>),
}

impl NodeKind {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            NodeKind::Source(n) => n.name(),
            NodeKind::Processor(n) => n.name(),
            NodeKind::Sink(n) => n.name(),
        }
    }

    #[must_use]
    pub fn is_source(&self) -> bool {
        matches!(self, NodeKind::Source(_))
    }

    #[must_use]
    pub fn is_blocked(&self) -> bool {
        match self {
            NodeKind::Source(n) => n.is_blocked(),
            NodeKind::Processor(n) => n.is_blocked(),
            NodeKind::Sink(n) => n.is_blocked(),
        }
    }

    pub fn graph_started(&mut self) {
        match self {
            NodeKind::Source(n) => n.graph_started(),
            NodeKind::Processor(n) => n.graph_started(),
            NodeKind::Sink(n) => n.graph_started(),
        }
    }

    pub fn set_log(&mut self, log: ArcMsgLogger) {
        match self {
            NodeKind::Source(n) => n.set_log(log),
            NodeKind::Processor(n) => n.set_log(log),
            NodeKind::Sink(n) => n.set_log(log),
        }
    }

    #[must_use]
    pub fn graphviz_description(&self) -> String {
        match self {
            NodeKind::Source(n) => n.graphviz_description(),
            NodeKind::Processor(n) => n.graphviz_description(),
            NodeKind::Sink(n) => n.graphviz_description(),
        }
    }
}

struct NodeSlot {
    /// `None` while a worker has temporarily checked the node body out (see
    /// [`Graph::take_node`]); never observed by the sequential executor,
    /// which never checks a node out.
    kind: Option<NodeKind>,
    active: bool,
    callbacks: Vec<Edge>,
}

/// Arena owning every node and edge in one pipeline. Nodes are referenced
/// by stable integer id (`NodeId`) rather than by owning pointer; back-edges
/// (a node's parents) are computed from the callback lists on demand by the
/// executors, not stored here.
#[derive(Default)]
pub struct Graph {
    nodes: Vec<Option<NodeSlot>>,
    sources: Vec<NodeId>,
    error_signaled: AtomicBool,
}

impl Graph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::new(u32::try_from(self.nodes.len()).expect("node arena overflow"));
        let is_source = kind.is_source();
        self.nodes.push(Some(NodeSlot {
            kind: Some(kind),
            active: true,
            callbacks: Vec::new(),
        }));
        if is_source {
            self.sources.push(id);
        }
        id
    }

    pub fn add_source(&mut self, source: Box<dyn Source + Send>) -> NodeId {
        self.push(NodeKind::Source(source))
    }

    pub fn add_processor(&mut self, processor: Box<dyn Processor + Send>) -> NodeId {
        self.push(NodeKind::Processor(processor))
    }

    pub fn add_sink(&mut self, sink: Box<dyn Sink + Send>) -> NodeId {
        self.push(NodeKind::Sink(sink))
    }

    fn slot(&self, id: NodeId) -> &NodeSlot {
        self.nodes[id.index()]
            .as_ref()
            .expect("node id refers to an eliminated node")
    }

    fn slot_mut(&mut self, id: NodeId) -> &mut NodeSlot {
        self.nodes[id.index()]
            .as_mut()
            .expect("node id refers to an eliminated node")
    }

    #[must_use]
    pub fn find_node_by_id(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id.index())?.as_ref()?.kind.as_ref()
    }

    pub fn find_node_by_id_mut(&mut self, id: NodeId) -> Option<&mut NodeKind> {
        self.nodes.get_mut(id.index())?.as_mut()?.kind.as_mut()
    }

    #[must_use]
    pub fn node_name(&self, id: NodeId) -> String {
        self.find_node_by_id(id)
            .map(NodeKind::name)
            .unwrap_or("<eliminated or checked out>")
            .to_owned()
    }

    /// Moves a node's body out of the graph so a parallel-executor worker
    /// can run it without holding the graph lock across the call; the slot
    /// remains registered (edges, active flag) but reports no node body
    /// until [`Graph::return_node`] puts it back. Mirrors the "node bodies
    /// must not hold their own lock across a suspension point" rule by
    /// giving the caller outright ownership instead of a borrow.
    pub fn take_node(&mut self, id: NodeId) -> Option<NodeKind> {
        self.nodes.get_mut(id.index())?.as_mut()?.kind.take()
    }

    pub fn return_node(&mut self, id: NodeId, kind: NodeKind) {
        if let Some(slot) = self.nodes.get_mut(id.index()).and_then(Option::as_mut) {
            slot.kind = Some(kind);
        }
    }

    #[must_use]
    pub fn callbacks(&self, id: NodeId) -> &[Edge] {
        &self.slot(id).callbacks
    }

    #[must_use]
    pub fn sources(&self) -> &[NodeId] {
        &self.sources
    }

    /// Size of the backing arena, including slots left behind by
    /// `eliminate`. Lets external executors size a `NodeId`-indexed table
    /// (e.g. the parallel executor's `NodeInfo` vector) without assuming
    /// ids are contiguous.
    #[must_use]
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                slot.as_ref()
                    .map(|_| NodeId::new(u32::try_from(i).expect("node arena overflow")))
            })
            .collect()
    }

    #[must_use]
    pub fn is_active(&self, id: NodeId) -> bool {
        self.slot(id).active
    }

    pub fn set_inactive(&mut self, id: NodeId) {
        self.slot_mut(id).active = false;
    }

    #[must_use]
    pub fn num_active_nodes(&self) -> usize {
        self.nodes
            .iter()
            .filter(|s| s.as_ref().is_some_and(|s| s.active))
            .count()
    }

    /// Adds an edge `from -> to`; `to` must already be registered.
    pub fn connect(&mut self, from: NodeId, to: NodeId, filter: StreamFilter) -> EdgeHandle {
        self.connect_labeled(from, to, filter, String::new())
    }

    pub fn connect_labeled(
        &mut self,
        from: NodeId,
        to: NodeId,
        filter: StreamFilter,
        label: impl Into<String>,
    ) -> EdgeHandle {
        assert!(
            self.nodes.get(to.index()).is_some_and(Option::is_some),
            "connect: target {to:?} is not a registered node"
        );
        let index = self.slot(from).callbacks.len();
        self.slot_mut(from)
            .callbacks
            .push(Edge::labeled(to, filter, label));
        EdgeHandle { from, index }
    }

    /// Re-points every incoming edge that terminated at `old` to `new`.
    pub fn replace_connections_to(&mut self, old: NodeId, new: NodeId) {
        for slot in self.nodes.iter_mut().flatten() {
            for edge in &mut slot.callbacks {
                if edge.target == old {
                    edge.target = new;
                }
            }
        }
    }

    /// Moves `old`'s outgoing edge list into `new`, leaving `old` with none.
    pub fn replace_connections_from(&mut self, old: NodeId, new: NodeId) {
        let taken = std::mem::take(&mut self.slot_mut(old).callbacks);
        self.slot_mut(new).callbacks.extend(taken);
    }

    /// Splits a node's responsibilities: inputs that targeted `original`
    /// are redirected to `replacement_in`, and `original`'s outputs move to
    /// `replacement_out`.
    pub fn replace_input_output(
        &mut self,
        original: NodeId,
        replacement_in: NodeId,
        replacement_out: NodeId,
    ) {
        self.replace_connections_to(original, replacement_in);
        self.replace_connections_from(original, replacement_out);
    }

    /// Splices `node` out of the graph: for every edge `u -> node` and every
    /// `node -> v`, creates `u -> v` whose filter is the intersection of the
    /// two and whose label is their concatenation, then removes `node`.
    pub fn eliminate(&mut self, node: NodeId) {
        let outgoing = self.slot(node).callbacks.clone();

        let mut replacements: Vec<(NodeId, Vec<Edge>)> = Vec::new();
        for (i, slot) in self.nodes.iter().enumerate() {
            let Some(slot) = slot else { continue };
            let owner = NodeId::new(u32::try_from(i).expect("node arena overflow"));
            let mut additions = Vec::new();
            let mut has_incoming = false;
            for incoming in &slot.callbacks {
                if incoming.target != node {
                    continue;
                }
                has_incoming = true;
                for outgoing_edge in &outgoing {
                    let filter = incoming.filter.intersect(&outgoing_edge.filter);
                    let label = concat_labels(&incoming.label, &outgoing_edge.label);
                    additions.push(Edge::labeled(outgoing_edge.target, filter, label));
                }
            }
            // `has_incoming` (not `!additions.is_empty()`) decides whether
            // this owner needs its callbacks touched: a node with no
            // outgoing edges of its own (a dead end) still needs every
            // edge that pointed at it dropped.
            if has_incoming {
                replacements.push((owner, additions));
            }
        }

        for (owner, additions) in replacements {
            let slot = self.slot_mut(owner);
            slot.callbacks.retain(|e| e.target != node);
            slot.callbacks.extend(additions);
        }

        self.nodes[node.index()] = None;
        self.sources.retain(|&id| id != node);
    }

    pub fn set_error_signaled(&self) {
        self.error_signaled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn has_error_signaled(&self) -> bool {
        self.error_signaled.load(Ordering::SeqCst)
    }

    /// Renders a DOT document: one box per node, edges labeled with the
    /// edge's debug label and (if restricted) its stream filter.
    #[must_use]
    pub fn graphviz(&self) -> String {
        let mut out = String::from("digraph G {\n");
        for (i, slot) in self.nodes.iter().enumerate() {
            let Some(slot) = slot else { continue };
            let Some(kind) = &slot.kind else { continue };
            let id = NodeId::new(u32::try_from(i).expect("node arena overflow"));
            let mut info = format!("{} ({id:?})", kind.name());
            let desc = kind.graphviz_description();
            if !desc.is_empty() {
                info.push_str(": ");
                info.push_str(&desc);
            }
            let wrapped = graphviz::word_wrap(&info, 40).join("\\n");
            out.push_str(&format!(
                "  n{i} [shape=box label={}];\n",
                graphviz::quote(&wrapped)
            ));
        }
        for (i, slot) in self.nodes.iter().enumerate() {
            let Some(slot) = slot else { continue };
            for edge in &slot.callbacks {
                let mut label = edge.label.clone();
                if !matches!(edge.filter, StreamFilter::All) {
                    if !label.is_empty() {
                        label.push_str("\\n");
                    }
                    label.push_str(&edge.filter.to_string());
                }
                out.push_str(&format!(
                    "  n{i} -> n{} [label={}];\n",
                    edge.target.index(),
                    graphviz::quote(&label)
                ));
            }
        }
        out.push_str("}\n");
        out
    }

    /// Streams currently eligible for input: every registered node, used by
    /// executors to bootstrap their own per-node bookkeeping.
    #[must_use]
    pub fn all_node_ids(&self) -> BTreeSet<NodeId> {
        self.node_ids().into_iter().collect()
    }
}

fn concat_labels(a: &str, b: &str) -> String {
    if a.is_empty() {
        b.to_owned()
    } else if b.is_empty() {
        a.to_owned()
    } else {
        format!("{a} & {b}")
    }
}

#[cfg(test)]
mod tests;
