// SPDX-License-Identifier: GPL-2.0-or-later

//! Single-threaded reference executor. Every `produce()`/`has_input()` call
//! and its full downstream fan-out happen synchronously on the calling
//! thread, in registration order, so stepping through this in a debugger
//! walks the graph exactly the way it was declared.

use common::Streams;
use graph::{Executor, Graph, GraphError, GraphErrors, NodeId, NodeKind};

pub struct SequentialExecutor<'g> {
    graph: &'g mut Graph,
    started: bool,
}

impl<'g> SequentialExecutor<'g> {
    #[must_use]
    pub fn new(graph: &'g mut Graph) -> Self {
        Self {
            graph,
            started: false,
        }
    }

    /// Forwards `streams` along every outgoing edge of `node_id`, applying
    /// each edge's filter, recursing into processors and terminating at
    /// sinks. Errors are accumulated rather than aborting the fan-out, so one
    /// failing sink does not hide a sibling's failure in the same tick.
    fn dispatch(&mut self, errors: &mut GraphErrors, node_id: NodeId, streams: &Streams) {
        let edges = self.graph.callbacks(node_id).to_vec();
        for edge in edges {
            if let Some(filtered) = edge.filter.apply(streams) {
                self.feed(errors, edge.target, filtered);
            }
        }
    }

    fn feed(&mut self, errors: &mut GraphErrors, node_id: NodeId, streams: Streams) {
        let node_name = self.graph.node_name(node_id);
        let Some(kind) = self.graph.find_node_by_id_mut(node_id) else {
            return;
        };
        match kind {
            NodeKind::Processor(processor) => match processor.has_input(streams) {
                Ok(outputs) => {
                    for out in &outputs {
                        self.dispatch(errors, node_id, out);
                    }
                }
                Err(error) => errors.push(GraphError {
                    node_id,
                    node_name,
                    error,
                }),
            },
            NodeKind::Sink(sink) => {
                if let Err(error) = sink.consume(streams) {
                    errors.push(GraphError {
                        node_id,
                        node_name,
                        error,
                    });
                }
            }
            NodeKind::Source(_) => {
                // A source is never the target of an edge; nothing to do.
            }
        }
    }
}

impl Executor for SequentialExecutor<'_> {
    fn step(&mut self) -> Result<bool, GraphErrors> {
        if !self.started {
            for id in self.graph.node_ids() {
                if let Some(kind) = self.graph.find_node_by_id_mut(id) {
                    kind.graph_started();
                }
            }
            self.started = true;
        }

        let mut errors = GraphErrors::default();
        for source_id in self.graph.sources().to_vec() {
            if !self.graph.is_active(source_id) {
                continue;
            }
            let produced = match self.graph.find_node_by_id_mut(source_id) {
                Some(NodeKind::Source(source)) => source.produce(),
                _ => continue,
            };
            match produced {
                Ok(bundles) => {
                    let mut went_eos = false;
                    for streams in &bundles {
                        went_eos |= streams.is_end_of_stream();
                        self.dispatch(&mut errors, source_id, streams);
                    }
                    if went_eos {
                        self.graph.set_inactive(source_id);
                    }
                }
                Err(error) => {
                    let node_name = self.graph.node_name(source_id);
                    errors.push(GraphError {
                        node_id: source_id,
                        node_name,
                        error,
                    });
                }
            }
        }

        if !errors.is_empty() {
            self.graph.set_error_signaled();
            return Err(errors);
        }

        Ok(self
            .graph
            .sources()
            .iter()
            .any(|&id| self.graph.is_active(id)))
    }

    fn stop(&mut self) {}
}

#[cfg(test)]
mod tests;
