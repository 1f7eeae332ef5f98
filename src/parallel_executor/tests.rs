// SPDX-License-Identifier: GPL-2.0-or-later

use super::*;
use common::{Data, Streams, StreamId};
use graph::{NodeBase, NodeError, Processor, Sink, Source, StreamFilter};
use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::sync::Arc;
use std::time::Duration;

struct CountingSource {
    next: i64,
    limit: i64,
    aborted: Arc<AtomicBool>,
}

impl NodeBase for CountingSource {
    fn name(&self) -> &str {
        "counting-source"
    }
}

impl Source for CountingSource {
    fn produce(&mut self) -> Result<Vec<Streams>, NodeError> {
        if self.aborted.load(std::sync::atomic::Ordering::SeqCst) || self.next >= self.limit {
            return Ok(vec![Streams::single(Data::end_of_stream(StreamId::new(1)))]);
        }
        let id = self.next;
        self.next += 1;
        Ok(vec![Streams::single(Data::empty(StreamId::new(1)).with_meta(
            common::Meta::raw(common::RawFrameMeta {
                presentation_index: common::PresentationIndex::new(id),
                presentation_time: common::Rational::new(id, 1),
                duration: common::Rational::new(1, 1),
                pixel_format: common::PixelFormat::Yuv420P,
                width: 1,
                height: 1,
            }),
        ))])
    }

    fn abort(&mut self) {
        self.aborted.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

struct Forward;

impl NodeBase for Forward {
    fn name(&self) -> &str {
        "forward"
    }
}

impl Processor for Forward {
    fn has_input(&mut self, streams: Streams) -> Result<Vec<Streams>, NodeError> {
        Ok(vec![streams])
    }
}

struct SlowForward {
    delay: Duration,
}

impl NodeBase for SlowForward {
    fn name(&self) -> &str {
        "slow-forward"
    }
}

impl Processor for SlowForward {
    fn has_input(&mut self, streams: Streams) -> Result<Vec<Streams>, NodeError> {
        std::thread::sleep(self.delay);
        Ok(vec![streams])
    }
}

struct RecordingSink {
    received: Arc<Mutex<Vec<Streams>>>,
}

impl NodeBase for RecordingSink {
    fn name(&self) -> &str {
        "sink"
    }
}

impl Sink for RecordingSink {
    fn consume(&mut self, streams: Streams) -> Result<(), NodeError> {
        self.received.lock().expect("sink mutex poisoned").push(streams);
        Ok(())
    }
}

struct FailingSink;

impl NodeBase for FailingSink {
    fn name(&self) -> &str {
        "failing-sink"
    }
}

impl Sink for FailingSink {
    fn consume(&mut self, _streams: Streams) -> Result<(), NodeError> {
        Err(NodeError::Config("boom".to_owned()))
    }
}

fn run_to_quiescence(executor: &mut ParallelExecutor) -> Result<(), GraphErrors> {
    for _ in 0..10_000 {
        if !executor.step()? {
            return Ok(());
        }
    }
    panic!("executor did not quiesce");
}

#[test]
fn test_e1_linear_passthrough() {
    let mut graph = Graph::new();
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = graph.add_sink(Box::new(RecordingSink {
        received: Arc::clone(&received),
    }));
    let forward = graph.add_processor(Box::new(Forward));
    let source = graph.add_source(Box::new(CountingSource {
        next: 0,
        limit: 5,
        aborted: Arc::new(AtomicBool::new(false)),
    }));
    graph.connect(source, forward, StreamFilter::All);
    graph.connect(forward, sink, StreamFilter::All);

    let mut executor = ParallelExecutor::with_config(
        graph,
        ParallelExecutorConfig {
            num_workers: Some(2),
            ..Default::default()
        },
    );
    run_to_quiescence(&mut executor).expect("no graph errors");

    let received = received.lock().expect("sink mutex poisoned");
    assert_eq!(received.len(), 6);
    assert!(received[5].is_end_of_stream());
    for (i, streams) in received.iter().take(5).enumerate() {
        let meta = streams.as_slice()[0].meta().expect("raw meta present");
        assert_eq!(
            meta.as_raw().expect("raw meta").presentation_index,
            common::PresentationIndex::new(i64::try_from(i).expect("small index"))
        );
    }
}

#[test]
fn test_e6_abort_mid_run_quiesces_cleanly() {
    let mut graph = Graph::new();
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = graph.add_sink(Box::new(RecordingSink {
        received: Arc::clone(&received),
    }));
    let aborted = Arc::new(AtomicBool::new(false));
    let source = graph.add_source(Box::new(CountingSource {
        next: 0,
        limit: 1_000_000,
        aborted: Arc::clone(&aborted),
    }));
    graph.connect(source, sink, StreamFilter::All);

    let mut executor = ParallelExecutor::with_config(
        graph,
        ParallelExecutorConfig {
            num_workers: Some(2),
            ..Default::default()
        },
    );

    for _ in 0..50 {
        executor.step().expect("no graph errors before abort");
    }
    executor.abort();

    run_to_quiescence(&mut executor).expect("no graph errors after abort");
    for info in &executor.shared.infos {
        let info = info.lock().expect("node info mutex poisoned");
        assert!(!info.has_work());
        assert!(!info.running);
    }
}

#[test]
fn test_node_error_surfaces_as_graph_error_and_aborts() {
    let mut graph = Graph::new();
    let sink = graph.add_sink(Box::new(FailingSink));
    let source = graph.add_source(Box::new(CountingSource {
        next: 0,
        limit: 3,
        aborted: Arc::new(AtomicBool::new(false)),
    }));
    graph.connect(source, sink, StreamFilter::All);

    let mut executor = ParallelExecutor::with_config(
        graph,
        ParallelExecutorConfig {
            num_workers: Some(1),
            ..Default::default()
        },
    );

    let mut saw_error = false;
    for _ in 0..1000 {
        match executor.step() {
            Ok(true) => continue,
            Ok(false) => break,
            Err(errors) => {
                saw_error = true;
                assert_eq!(errors.0.len(), 1);
                break;
            }
        }
    }
    assert!(saw_error, "expected the failing sink's error to surface");
}

#[test]
fn test_backpressure_throttles_fast_source() {
    let mut graph = Graph::new();
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = graph.add_sink(Box::new(RecordingSink {
        received: Arc::clone(&received),
    }));
    let slow = graph.add_processor(Box::new(SlowForward {
        delay: Duration::from_millis(5),
    }));
    let source = graph.add_source(Box::new(CountingSource {
        next: 0,
        limit: 40,
        aborted: Arc::new(AtomicBool::new(false)),
    }));
    graph.connect(source, slow, StreamFilter::All);
    graph.connect(slow, sink, StreamFilter::All);

    let mut executor = ParallelExecutor::with_config(
        graph,
        ParallelExecutorConfig {
            num_workers: Some(1),
            ..Default::default()
        },
    );
    run_to_quiescence(&mut executor).expect("no graph errors");

    let received = received.lock().expect("sink mutex poisoned");
    assert_eq!(received.len(), 41);
}

#[allow(dead_code)]
fn silence_unused(_: AtomicUsize) {}
