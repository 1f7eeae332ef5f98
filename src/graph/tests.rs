// SPDX-License-Identifier: GPL-2.0-or-later

use super::*;
use common::{Data, Streams, StreamId};

struct RecordingSink {
    name: String,
    received: Vec<Streams>,
}

impl NodeBase for RecordingSink {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Sink for RecordingSink {
    fn consume(&mut self, streams: Streams) -> Result<(), NodeError> {
        self.received.push(streams);
        Ok(())
    }
}

struct Forward {
    name: String,
}

impl NodeBase for Forward {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Processor for Forward {
    fn has_input(&mut self, streams: Streams) -> Result<Vec<Streams>, NodeError> {
        Ok(vec![streams])
    }
}

struct CountingSource {
    name: String,
    remaining: u32,
}

impl NodeBase for CountingSource {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Source for CountingSource {
    fn produce(&mut self) -> Result<Vec<Streams>, NodeError> {
        if self.remaining == 0 {
            return Ok(vec![Streams::single(Data::end_of_stream(StreamId::new(1)))]);
        }
        self.remaining -= 1;
        Ok(vec![Streams::single(Data::empty(StreamId::new(1)))])
    }

    fn abort(&mut self) {
        self.remaining = 0;
    }
}

#[test]
fn test_connect_requires_registered_target() {
    let mut graph = Graph::new();
    let sink = graph.add_sink(Box::new(RecordingSink {
        name: "sink".into(),
        received: vec![],
    }));
    let source = graph.add_source(Box::new(CountingSource {
        name: "source".into(),
        remaining: 1,
    }));
    graph.connect(source, sink, StreamFilter::All);
    assert_eq!(graph.callbacks(source).len(), 1);
}

#[test]
#[should_panic(expected = "is not a registered node")]
fn test_connect_panics_on_unregistered_target() {
    let mut graph = Graph::new();
    let source = graph.add_source(Box::new(CountingSource {
        name: "source".into(),
        remaining: 1,
    }));
    let bogus = NodeId::new(99);
    graph.connect(source, bogus, StreamFilter::All);
}

#[test]
fn test_replace_connections_to() {
    let mut graph = Graph::new();
    let a = graph.add_sink(Box::new(RecordingSink {
        name: "a".into(),
        received: vec![],
    }));
    let b = graph.add_sink(Box::new(RecordingSink {
        name: "b".into(),
        received: vec![],
    }));
    let source = graph.add_source(Box::new(CountingSource {
        name: "source".into(),
        remaining: 1,
    }));
    graph.connect(source, a, StreamFilter::All);
    graph.replace_connections_to(a, b);
    assert_eq!(graph.callbacks(source)[0].target, b);
}

#[test]
fn test_replace_connections_from() {
    let mut graph = Graph::new();
    let sink = graph.add_sink(Box::new(RecordingSink {
        name: "sink".into(),
        received: vec![],
    }));
    let old = graph.add_processor(Box::new(Forward { name: "old".into() }));
    let new = graph.add_processor(Box::new(Forward { name: "new".into() }));
    graph.connect(old, sink, StreamFilter::All);
    graph.replace_connections_from(old, new);
    assert!(graph.callbacks(old).is_empty());
    assert_eq!(graph.callbacks(new)[0].target, sink);
}

#[test]
fn test_eliminate_splices_node_out() {
    let mut graph = Graph::new();
    let sink = graph.add_sink(Box::new(RecordingSink {
        name: "sink".into(),
        received: vec![],
    }));
    let middle = graph.add_processor(Box::new(Forward {
        name: "middle".into(),
    }));
    let source = graph.add_source(Box::new(CountingSource {
        name: "source".into(),
        remaining: 1,
    }));
    graph.connect_labeled(source, middle, StreamFilter::All, "a");
    graph.connect_labeled(middle, sink, StreamFilter::All, "b");

    graph.eliminate(middle);

    let edges = graph.callbacks(source);
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].target, sink);
    assert_eq!(edges[0].label, "a & b");
    assert!(graph.find_node_by_id(middle).is_none());
}

#[test]
fn test_eliminate_dead_end_drops_incoming_edges() {
    let mut graph = Graph::new();
    let dead_end = graph.add_sink(Box::new(RecordingSink {
        name: "dead_end".into(),
        received: vec![],
    }));
    let source = graph.add_source(Box::new(CountingSource {
        name: "source".into(),
        remaining: 1,
    }));
    graph.connect(source, dead_end, StreamFilter::All);

    graph.eliminate(dead_end);

    assert!(graph.callbacks(source).is_empty());
}

#[test]
fn test_eliminate_intersects_filters() {
    let mut graph = Graph::new();
    let sink = graph.add_sink(Box::new(RecordingSink {
        name: "sink".into(),
        received: vec![],
    }));
    let middle = graph.add_processor(Box::new(Forward {
        name: "middle".into(),
    }));
    let source = graph.add_source(Box::new(CountingSource {
        name: "source".into(),
        remaining: 1,
    }));
    graph.connect(
        source,
        middle,
        StreamFilter::ids([StreamId::new(1), StreamId::new(2)]),
    );
    graph.connect(middle, sink, StreamFilter::ids([StreamId::new(2)]));

    graph.eliminate(middle);

    let edges = graph.callbacks(source);
    assert_eq!(edges[0].filter, StreamFilter::ids([StreamId::new(2)]));
}

#[test]
fn test_graphviz_contains_nodes_and_edges() {
    let mut graph = Graph::new();
    let sink = graph.add_sink(Box::new(RecordingSink {
        name: "sink".into(),
        received: vec![],
    }));
    let source = graph.add_source(Box::new(CountingSource {
        name: "source".into(),
        remaining: 1,
    }));
    graph.connect(source, sink, StreamFilter::All);
    let dot = graph.graphviz();
    assert!(dot.contains("digraph G"));
    assert!(dot.contains("source"));
    assert!(dot.contains("sink"));
    assert!(dot.contains("->"));
}

#[test]
fn test_error_signaled_latch() {
    let graph = Graph::new();
    assert!(!graph.has_error_signaled());
    graph.set_error_signaled();
    assert!(graph.has_error_signaled());
}
