// SPDX-License-Identifier: GPL-2.0-or-later

//! Combine node (`spec.md` §4.4): N `CombineSink` processors, one per input,
//! feed a shared per-input FIFO; a single `CombineSource` interleaves them
//! into one output once every input has either a queued frame or has
//! finished. Used wherever sibling edges must be re-joined in lockstep (e.g.
//! recombining per-tile substreams before a shared sink that expects one
//! frame boundary across all of them).

mod sink;
mod source;
mod state;

pub use sink::CombineSink;
pub use source::CombineSource;

use state::CombineState;
use std::sync::{Arc, Mutex};

/// Builds one [`CombineSource`] plus `num_inputs` [`CombineSink`]s sharing
/// state. Register each sink as a processor node with one inbound edge, and
/// the source as the combine's single source-like output node; `produce` on
/// the source never reads from anywhere but the sinks' shared FIFOs, so it
/// must not itself be the target of any edge.
#[must_use]
pub fn combine_nodes(num_inputs: usize) -> (CombineSource, Vec<CombineSink>) {
    assert!(num_inputs > 0, "a combine node needs at least one input");
    let state = Arc::new(Mutex::new(CombineState::new(num_inputs)));
    let sinks = (0..num_inputs)
        .map(|idx| CombineSink::new(idx, Arc::clone(&state)))
        .collect();
    (CombineSource::new(state), sinks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Data, Streams, StreamId};
    use graph::{NodeBase, Processor, Source};

    #[test]
    fn test_interleaves_two_inputs_in_lockstep() {
        let (mut source, mut sinks) = combine_nodes(2);
        assert_eq!(sinks.len(), 2);

        sinks[0]
            .has_input(Streams::single(Data::empty(StreamId::new(1))))
            .expect("sink 0 accepts frame");
        assert!(source.produce().expect("produce").is_empty());

        sinks[1]
            .has_input(Streams::single(Data::empty(StreamId::new(2))))
            .expect("sink 1 accepts frame");
        let out = source.produce().expect("produce");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_slice().len(), 2);
    }

    #[test]
    fn test_is_blocked_tracks_queue_occupancy() {
        let (_source, mut sinks) = combine_nodes(1);
        assert!(!sinks[0].is_blocked());
        sinks[0]
            .has_input(Streams::single(Data::empty(StreamId::new(1))))
            .expect("accepts frame");
        assert!(sinks[0].is_blocked());
    }

    #[test]
    fn test_end_of_stream_fan_out_after_all_inputs_finish() {
        let (mut source, mut sinks) = combine_nodes(2);
        sinks[0]
            .has_input(Streams::single(Data::end_of_stream(StreamId::new(1))))
            .expect("sink 0 eos");
        assert!(source.produce().expect("produce").is_empty());

        sinks[1]
            .has_input(Streams::single(Data::end_of_stream(StreamId::new(2))))
            .expect("sink 1 eos");
        let out = source.produce().expect("produce");
        assert_eq!(out.len(), 1);
        assert!(out[0].is_end_of_stream());
        assert_eq!(out[0].as_slice().len(), 2);
    }

    #[test]
    fn test_never_drops_a_frame_queued_before_sibling_finishes() {
        let (mut source, mut sinks) = combine_nodes(2);
        sinks[0]
            .has_input(Streams::single(Data::empty(StreamId::new(1))))
            .expect("sink 0 frame");
        sinks[1]
            .has_input(Streams::single(Data::end_of_stream(StreamId::new(2))))
            .expect("sink 1 eos");

        let out = source.produce().expect("produce");
        assert_eq!(out.len(), 1);
        assert!(!out[0].is_end_of_stream());
    }

    /// An input that finishes while it still has frames queued (B gets
    /// `B1,B2,EOS` well before A catches up) must still drain those frames
    /// through the round-robin output before the terminal frame appears.
    /// The finished flag alone must not short-circuit the FIFO.
    #[test]
    fn test_drains_queued_frames_before_terminal_when_input_finishes_early() {
        let (mut source, mut sinks) = combine_nodes(2);

        sinks[1]
            .has_input(Streams::single(Data::empty(StreamId::new(20))))
            .expect("B1");
        sinks[1]
            .has_input(Streams::single(Data::empty(StreamId::new(20))))
            .expect("B2");
        sinks[1]
            .has_input(Streams::single(Data::end_of_stream(StreamId::new(20))))
            .expect("B eos");

        sinks[0]
            .has_input(Streams::single(Data::empty(StreamId::new(10))))
            .expect("A1");
        let round1 = source.produce().expect("produce");
        assert_eq!(round1.len(), 1, "(A1, B1)");
        assert_eq!(round1[0].as_slice().len(), 2);
        assert!(!round1[0].is_end_of_stream());

        sinks[0]
            .has_input(Streams::single(Data::empty(StreamId::new(10))))
            .expect("A2");
        let round2 = source.produce().expect("produce");
        assert_eq!(round2.len(), 1, "(A2, B2)");
        assert!(!round2[0].is_end_of_stream());

        sinks[0]
            .has_input(Streams::single(Data::empty(StreamId::new(10))))
            .expect("A3");
        sinks[0]
            .has_input(Streams::single(Data::end_of_stream(StreamId::new(10))))
            .expect("A eos");
        let round3 = source.produce().expect("produce");
        assert_eq!(
            round3.len(),
            2,
            "(A3, empty) then the terminal frame, not the terminal frame alone"
        );
        assert!(!round3[0].is_end_of_stream());
        assert!(round3[1].is_end_of_stream());
    }
}
