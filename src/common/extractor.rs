// SPDX-License-Identifier: GPL-2.0-or-later

//! Extractor constructs. The engine does not parse these; it moves them and
//! hands them to the (out-of-scope) segmenter library for serialization.

/// HEVC slice-segment info referenced by a `SampleConstruct`, opaque to the
/// core — only the external slice-header rewriter interprets its bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SliceInfo {
    pub bytes: Vec<u8>,
}

/// References bytes from another track's sample.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleConstruct {
    pub idx: u32,
    pub track_ref_idx: u8,
    pub data_offset: i64,
    pub data_length: u32,
    pub slice_info: SliceInfo,
}

/// Literal bytes inlined directly into the extractor track's sample.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineConstruct {
    pub idx: u32,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Extractor {
    Sample(SampleConstruct),
    Inline(InlineConstruct),
}

impl Extractor {
    #[must_use]
    pub fn idx(&self) -> u32 {
        match self {
            Extractor::Sample(s) => s.idx,
            Extractor::Inline(i) => i.idx,
        }
    }
}

/// Extractor constructs for one sample, always kept sorted by `idx` so the
/// emission loop that walks them to serialize a track is O(n) rather than
/// needing a merge step over two parallel vectors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractorList(Vec<Extractor>);

impl ExtractorList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, extractor: Extractor) {
        let pos = self
            .0
            .partition_point(|existing| existing.idx() <= extractor.idx());
        self.0.insert(pos, extractor);
    }

    #[must_use]
    pub fn iter(&self) -> std::slice::Iter<'_, Extractor> {
        self.0.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Concatenates two extractor lists in `idx` order, as the tile proxy
    /// does when pooling per-tile extractors into one combined sample.
    #[must_use]
    pub fn concat(mut self, other: Self) -> Self {
        for extractor in other.0 {
            self.insert(extractor);
        }
        self
    }
}

impl FromIterator<Extractor> for ExtractorList {
    fn from_iter<I: IntoIterator<Item = Extractor>>(iter: I) -> Self {
        let mut list = Self::new();
        for e in iter {
            list.insert(e);
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inline(idx: u32) -> Extractor {
        Extractor::Inline(InlineConstruct {
            idx,
            bytes: vec![],
        })
    }

    #[test]
    fn test_insert_keeps_order() {
        let mut list = ExtractorList::new();
        list.insert(inline(3));
        list.insert(inline(1));
        list.insert(inline(2));
        let idxs: Vec<u32> = list.iter().map(Extractor::idx).collect();
        assert_eq!(idxs, vec![1, 2, 3]);
    }

    #[test]
    fn test_concat_merges_in_order() {
        let a: ExtractorList = vec![inline(0), inline(2)].into_iter().collect();
        let b: ExtractorList = vec![inline(1), inline(3)].into_iter().collect();
        let merged = a.concat(b);
        let idxs: Vec<u32> = merged.iter().map(Extractor::idx).collect();
        assert_eq!(idxs, vec![0, 1, 2, 3]);
    }
}
