// SPDX-License-Identifier: GPL-2.0-or-later

//! `SliceHeaderRewriter`: the external HEVC bitstream collaborator the
//! multi-resolution tile proxy delegates to. `spec.md` §1 lists "the HEVC
//! parser/rewriter (bitstream-level slice-header rewriting)" as out of
//! scope; this trait is the seam the tile proxy calls through, mirroring
//! `TileProxyMultiRes::convertSliceHeader` and the SPS/PPS rewrite in
//! `collectExtractors` (`original_source/Creator/src/omaf/tileproxymultires.cpp`).

use common::Extractor;

/// One tile's rewritten slice header plus the adjusted sample/inline
/// constructors needed to address it inside the merged picture, and the
/// merged sequence's SPS/PPS once per stream.
pub trait SliceHeaderRewriter: Send + Sync {
    /// Rewrites `extractor`'s slice header to address CTU `ctu_index` in
    /// the merged picture described by `packed_width`/`packed_height` and
    /// the tile grid, matching `convertSliceHeader` + the inline-constructor
    /// bookkeeping around it.
    fn rewrite_slice_header(
        &self,
        extractor: &Extractor,
        ctu_index: u64,
        packed_width: u32,
        packed_height: u32,
    ) -> Extractor;

    /// Rewrites the original SPS/PPS to describe the merged resolution and
    /// tile grid; called once, on the very first emission, matching the
    /// `aFirstPacket` branch of `collectExtractors`.
    fn rewrite_sps_pps(
        &self,
        orig_sps: &[u8],
        orig_pps: &[u8],
        packed_width: u32,
        packed_height: u32,
        column_widths: &[u32],
        row_heights: &[u32],
    ) -> (Vec<u8>, Vec<u8>);
}

/// Identity rewriter used by tests and by callers with no real HEVC parser
/// wired in: returns the extractor and configs unchanged. Never used in a
/// real authoring run (the merged bitstream would be invalid), only to
/// exercise the tile proxy's reassembly logic in isolation.
pub struct IdentitySliceHeaderRewriter;

impl SliceHeaderRewriter for IdentitySliceHeaderRewriter {
    fn rewrite_slice_header(
        &self,
        extractor: &Extractor,
        _ctu_index: u64,
        _packed_width: u32,
        _packed_height: u32,
    ) -> Extractor {
        extractor.clone()
    }

    fn rewrite_sps_pps(
        &self,
        orig_sps: &[u8],
        orig_pps: &[u8],
        _packed_width: u32,
        _packed_height: u32,
        _column_widths: &[u32],
        _row_heights: &[u32],
    ) -> (Vec<u8>, Vec<u8>) {
        (orig_sps.to_vec(), orig_pps.to_vec())
    }
}
