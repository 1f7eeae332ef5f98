// SPDX-License-Identifier: GPL-2.0-or-later

use common::{Data, Streams, StreamId};
use std::collections::VecDeque;

/// State shared between every [`crate::CombineSink`] and the
/// [`crate::CombineSource`] of one combine node.
pub(crate) struct CombineState {
    fifos: Vec<VecDeque<Streams>>,
    finished: Vec<bool>,
    /// Last stream id observed on each input; reused both as the finished
    /// placeholder's id and, once every input is finished, as the id carried
    /// by that input's slot in the terminal end-of-stream frame.
    stream_ids: Vec<StreamId>,
    terminal_sent: bool,
}

impl CombineState {
    pub fn new(num_inputs: usize) -> Self {
        Self {
            fifos: vec![VecDeque::new(); num_inputs],
            finished: vec![false; num_inputs],
            stream_ids: vec![StreamId::UNINITIALIZED; num_inputs],
            terminal_sent: false,
        }
    }

    pub fn add_frame(&mut self, idx: usize, streams: Streams) {
        if let Some(id) = streams.as_slice().first().map(Data::stream_id) {
            self.stream_ids[idx] = id;
        }
        if streams.is_end_of_stream() {
            self.finished[idx] = true;
        } else {
            self.fifos[idx].push_back(streams);
        }
    }

    pub fn is_blocked(&self, idx: usize) -> bool {
        !self.fifos[idx].is_empty()
    }

    /// Every input has either a queued frame or has already finished.
    pub fn ready(&self) -> bool {
        (0..self.fifos.len()).all(|i| self.finished[i] || !self.fifos[i].is_empty())
    }

    /// True once every input is finished *and* its FIFO has been fully
    /// drained, not merely once every `finished` flag is set. An input can
    /// be finished with frames still queued (EOS arrived right behind real
    /// data), and those frames must still be popped through `pop_round`
    /// before the terminal frame is allowed out.
    pub fn all_finished(&self) -> bool {
        (0..self.fifos.len()).all(|i| self.finished[i] && self.fifos[i].is_empty())
    }

    /// Forces every not-yet-finished input to finish, for `CombineSource`'s
    /// `abort`; any stream id recorded so far is kept as-is for the
    /// terminal frame.
    pub fn force_finish(&mut self) {
        self.finished.iter_mut().for_each(|f| *f = true);
    }

    pub fn terminal_pending(&self) -> bool {
        self.all_finished() && !self.terminal_sent
    }

    /// Assembles one output frame: the front queued frame of every input
    /// that still has one, an empty placeholder for every input whose FIFO
    /// is currently drained (whether or not it has finished yet). A FIFO
    /// takes priority over the finished flag, so frames queued before a
    /// sibling's end-of-stream are never skipped.
    pub fn pop_round(&mut self) -> Vec<Data> {
        let mut out = Vec::with_capacity(self.fifos.len());
        for i in 0..self.fifos.len() {
            if let Some(streams) = self.fifos[i].pop_front() {
                out.extend(streams.into_vec());
            } else {
                out.push(Data::empty(self.stream_ids[i]));
            }
        }
        out
    }

    /// One end-of-stream `Data` per recorded stream id; only ever produced
    /// once, since nothing else ever arrives after every input finishes.
    pub fn take_terminal(&mut self) -> Vec<Data> {
        self.terminal_sent = true;
        self.stream_ids
            .iter()
            .map(|&id| Data::end_of_stream(id))
            .collect()
    }
}

impl Drop for CombineState {
    fn drop(&mut self) {
        debug_assert!(
            self.fifos.iter().all(VecDeque::is_empty),
            "combine node dropped with data still queued on an input"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_requires_every_input() {
        let mut state = CombineState::new(2);
        assert!(!state.ready());
        state.add_frame(0, Streams::single(Data::empty(StreamId::new(1))));
        assert!(!state.ready());
        state.add_frame(1, Streams::single(Data::end_of_stream(StreamId::new(2))));
        assert!(state.ready());
    }

    #[test]
    fn test_pop_round_uses_placeholder_for_finished_input() {
        let mut state = CombineState::new(2);
        state.add_frame(0, Streams::single(Data::empty(StreamId::new(1))));
        state.add_frame(1, Streams::single(Data::end_of_stream(StreamId::new(2))));
        let round = state.pop_round();
        assert_eq!(round.len(), 2);
        assert!(!round[0].is_end_of_stream());
        assert!(round[1].storage().is_empty());
    }

    #[test]
    fn test_terminal_pending_only_after_all_finished() {
        let mut state = CombineState::new(2);
        state.add_frame(0, Streams::single(Data::end_of_stream(StreamId::new(1))));
        assert!(!state.terminal_pending());
        state.add_frame(1, Streams::single(Data::end_of_stream(StreamId::new(2))));
        assert!(state.terminal_pending());
        let terminal = state.take_terminal();
        assert_eq!(terminal.len(), 2);
        assert!(!state.terminal_pending());
    }
}
