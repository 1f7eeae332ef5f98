// SPDX-License-Identifier: GPL-2.0-or-later

use crate::node_id::NodeId;
use common::DynError;
use std::fmt;
use thiserror::Error;

/// Declared recoverable error taxonomy a node's `has_input`/`produce`/
/// `consume` may raise. The parallel executor catches exactly these and
/// surfaces them as [`GraphErrors`]; a Rust panic from inside a node is, by
/// contrast, a programming error and is never caught here (see
/// `omaf_parallel_executor`'s worker loop).
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("wrong tile configuration: {0}")]
    WrongTileConfiguration(String),

    #[error("unsupported video input: {0}")]
    UnsupportedVideoInput(String),

    #[error("cannot open file '{path}': {source}")]
    CannotOpenFile {
        path: String,
        source: std::io::Error,
    },

    #[error("cannot write file '{path}': {source}")]
    CannotWriteFile {
        path: String,
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] DynError),
}

/// One node's error, tagged with the offending node's id and debug name so
/// the driver can report which part of the graph failed.
#[derive(Debug, Error)]
#[error("node {node_id:?} ({node_name}): {error}")]
pub struct GraphError {
    pub node_id: NodeId,
    pub node_name: String,
    pub error: NodeError,
}

/// All errors collected during one `step()` that caused the executor to
/// abort.
#[derive(Debug, Default)]
pub struct GraphErrors(pub Vec<GraphError>);

impl std::error::Error for GraphErrors {}

impl GraphErrors {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, error: GraphError) {
        self.0.push(error);
    }
}

impl fmt::Display for GraphErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}
