// SPDX-License-Identifier: GPL-2.0-or-later

use common::{Data, Streams, StreamId};
use std::collections::{BTreeSet, VecDeque};

struct ProducerState {
    queue: VecDeque<Streams>,
    /// Frames ever pushed onto this producer, not counting its `EndOfStream`.
    frame_counter: u64,
    /// Frames this producer has actually forwarded so far; only diverges
    /// from the popped-from-`queue` count during the final ceiling flush.
    consumed: u64,
    eos_received: bool,
    paused: bool,
    observed_stream_ids: BTreeSet<StreamId>,
}

impl ProducerState {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            frame_counter: 0,
            consumed: 0,
            eos_received: false,
            paused: false,
            observed_stream_ids: BTreeSet::new(),
        }
    }
}

/// State shared between every [`crate::MediaStepLockProcessor`] (one per
/// producer) and the [`crate::MediaStepLockSource`] that drains the
/// combined, forwarded output.
///
/// Unlike the combine node, a step-lock round may advance more than one
/// producer's frame in a single `submit`, and the final end-of-stream flush
/// touches every producer regardless of which one triggered it — all of it
/// lands in one shared output queue rather than on each producer's own
/// outgoing edges, since a step-lock group exists specifically to feed one
/// aligned downstream consumer.
pub(crate) struct StepLockState {
    producers: Vec<ProducerState>,
    throttle_limit: usize,
    last_frame: Option<u64>,
    eos_sent: bool,
    forwarded_frame_counter: u64,
    output: VecDeque<Streams>,
}

impl StepLockState {
    pub fn new(num_producers: usize, throttle_limit: usize) -> Self {
        Self {
            producers: (0..num_producers).map(|_| ProducerState::new()).collect(),
            throttle_limit,
            last_frame: None,
            eos_sent: false,
            forwarded_frame_counter: 0,
            output: VecDeque::new(),
        }
    }

    pub fn is_paused(&self, idx: usize) -> bool {
        self.producers[idx].paused
    }

    #[must_use]
    pub fn forwarded_frame_counter(&self) -> u64 {
        self.forwarded_frame_counter
    }

    pub fn drain_output(&mut self) -> Vec<Streams> {
        self.output.drain(..).collect()
    }

    /// Steps 1-5 of the step-lock algorithm for one producer's new frame.
    pub fn submit(&mut self, idx: usize, streams: Streams) {
        if self.eos_sent {
            return;
        }
        for data in streams.as_slice() {
            self.producers[idx].observed_stream_ids.insert(data.stream_id());
        }
        if streams.is_end_of_stream() {
            self.producers[idx].eos_received = true;
        } else {
            self.producers[idx].queue.push_back(streams);
            self.producers[idx].frame_counter += 1;
        }
        self.advance();
    }

    /// Treats every producer as having reached end-of-stream right now,
    /// for `MediaStepLockSource::abort`.
    pub fn force_finish(&mut self) {
        if self.eos_sent {
            return;
        }
        for producer in &mut self.producers {
            producer.eos_received = true;
        }
        self.advance();
    }

    fn advance(&mut self) {
        // Step 2: forward one frame from every producer while all have one queued.
        while self.producers.iter().all(|p| !p.queue.is_empty()) {
            let mut round = Vec::with_capacity(self.producers.len());
            for producer in &mut self.producers {
                let streams = producer
                    .queue
                    .pop_front()
                    .expect("loop condition guarantees a queued frame");
                producer.consumed += 1;
                round.extend(streams.into_vec());
            }
            self.forwarded_frame_counter += 1;
            self.output.push_back(Streams::new(round));
        }

        // Step 3: fix the flush ceiling once any producer at the current
        // minimum frame count has reached end-of-stream.
        if self.last_frame.is_none() {
            if let Some(min_count) = self.producers.iter().map(|p| p.frame_counter).min() {
                let ceiling_reached = self
                    .producers
                    .iter()
                    .any(|p| p.frame_counter == min_count && p.eos_received);
                if ceiling_reached {
                    self.last_frame = Some(min_count);
                }
            }
        }

        let Some(ceiling) = self.last_frame else {
            // Step 5: no ceiling yet, just re-evaluate throttle pauses.
            for producer in &mut self.producers {
                producer.paused = producer.queue.len() > self.throttle_limit;
            }
            return;
        };

        // Step 4: flush every producer up to the ceiling, discard anything
        // queued beyond it, emit each producer's terminal frame, and stop.
        for producer in &mut self.producers {
            while producer.consumed < ceiling {
                let Some(streams) = producer.queue.pop_front() else {
                    break;
                };
                producer.consumed += 1;
                self.output.push_back(streams);
                self.forwarded_frame_counter += 1;
            }
            producer.queue.clear();
            producer.paused = false;
        }
        for producer in &mut self.producers {
            let terminal = producer
                .observed_stream_ids
                .iter()
                .map(|&id| Data::end_of_stream(id))
                .collect::<Vec<_>>();
            self.output.push_back(Streams::new(terminal));
        }
        self.eos_sent = true;
    }
}
