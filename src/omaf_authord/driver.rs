// SPDX-License-Identifier: GPL-2.0-or-later

//! Caller-level "no active sources" assertion (`spec.md` §7), implemented as
//! a driver helper rather than inside the executors themselves — mirrors the
//! original's `NoActiveSourcesException`, which callers raise against an
//! already-idle graph rather than something `GraphBase::step` enforces
//! internally (`SPEC_FULL.md` §8).

use graph::{Executor, GraphErrors};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("no active sources: step() was called on an already-idle graph")]
    NoActiveSources,

    #[error(transparent)]
    Graph(#[from] GraphErrors),
}

/// Steps `executor` until every source has gone inactive. `has_active_sources`
/// is the caller's own pre-flight check (e.g. `!graph.sources().is_empty()`)
/// run before the first `step()`, since nothing in the `Executor` trait lets
/// a driver distinguish "had nothing to do from the start" from "finished in
/// its very first tick" after the fact.
pub fn run_to_completion<E: Executor>(
    executor: &mut E,
    has_active_sources: bool,
) -> Result<(), DriverError> {
    if !has_active_sources {
        return Err(DriverError::NoActiveSources);
    }
    while executor.step()? {}
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph::{Graph, NodeError, Source};

    struct NeverActive;
    impl graph::NodeBase for NeverActive {
        fn name(&self) -> &str {
            "never-active"
        }
    }
    impl Source for NeverActive {
        fn produce(&mut self) -> Result<Vec<common::Streams>, NodeError> {
            Ok(vec![common::Streams::single(common::Data::end_of_stream(
                common::StreamId::new(0),
            ))])
        }
        fn abort(&mut self) {}
    }

    #[test]
    fn test_no_active_sources_on_empty_graph() {
        let mut graph = Graph::new();
        let mut executor = sequential_executor::SequentialExecutor::new(&mut graph);
        assert!(matches!(
            run_to_completion(&mut executor, false),
            Err(DriverError::NoActiveSources)
        ));
    }

    #[test]
    fn test_runs_to_completion_once_source_finishes() {
        let mut graph = Graph::new();
        graph.add_source(Box::new(NeverActive));
        let mut executor = sequential_executor::SequentialExecutor::new(&mut graph);
        assert!(run_to_completion(&mut executor, true).is_ok());
    }
}
