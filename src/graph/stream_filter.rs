// SPDX-License-Identifier: GPL-2.0-or-later

use common::{Streams, StreamId};
use std::collections::BTreeSet;
use std::fmt;

/// Selects which streams of an upstream node's output are forwarded across
/// one edge. Either every stream, or an explicit id set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamFilter {
    All,
    Ids(BTreeSet<StreamId>),
}

impl StreamFilter {
    #[must_use]
    pub fn ids<I: IntoIterator<Item = StreamId>>(ids: I) -> Self {
        Self::Ids(ids.into_iter().collect())
    }

    #[must_use]
    pub fn matches(&self, id: StreamId) -> bool {
        match self {
            StreamFilter::All => true,
            StreamFilter::Ids(ids) => ids.contains(&id),
        }
    }

    /// Intersection of two filters, used by `eliminate` to combine the
    /// filter of an incoming edge with that of the corresponding outgoing
    /// edge when splicing a node out.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        match (self, other) {
            (StreamFilter::All, StreamFilter::All) => StreamFilter::All,
            (StreamFilter::All, StreamFilter::Ids(ids))
            | (StreamFilter::Ids(ids), StreamFilter::All) => StreamFilter::Ids(ids.clone()),
            (StreamFilter::Ids(a), StreamFilter::Ids(b)) => {
                StreamFilter::Ids(a.intersection(b).copied().collect())
            }
        }
    }

    /// Builds the filtered `Streams` forwarded across an edge; `None` means
    /// nothing in this bundle passes the filter.
    #[must_use]
    pub fn apply(&self, streams: &Streams) -> Option<Streams> {
        match self {
            StreamFilter::All => Some(streams.clone()),
            StreamFilter::Ids(ids) => {
                let filtered: Vec<_> = streams
                    .as_slice()
                    .iter()
                    .filter(|d| ids.contains(&d.stream_id()))
                    .cloned()
                    .collect();
                if filtered.is_empty() {
                    None
                } else {
                    Some(Streams::from(filtered))
                }
            }
        }
    }
}

impl fmt::Display for StreamFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamFilter::All => write!(f, "all"),
            StreamFilter::Ids(ids) => {
                let parts: Vec<String> = ids.iter().map(ToString::to_string).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersect() {
        let a = StreamFilter::ids([StreamId::new(1), StreamId::new(2)]);
        let b = StreamFilter::ids([StreamId::new(2), StreamId::new(3)]);
        assert_eq!(a.intersect(&b), StreamFilter::ids([StreamId::new(2)]));
    }

    #[test]
    fn test_all_is_identity_for_intersect() {
        let a = StreamFilter::ids([StreamId::new(5)]);
        assert_eq!(a.intersect(&StreamFilter::All), a);
    }

    #[test]
    fn test_display() {
        assert_eq!(StreamFilter::All.to_string(), "all");
        assert_eq!(
            StreamFilter::ids([StreamId::new(1)]).to_string(),
            "1"
        );
    }
}
