// SPDX-License-Identifier: GPL-2.0-or-later

//! Synthetic first-emission NAL buffer: `spec.md` §4.6 calls for "a
//! synthetic NAL buffer with projection SEI and region-wise-packing SEI" on
//! the tile proxy's first output. The original (`createExtractorSEI` in
//! `tileproxy.cpp`) builds this by handing a real HEVC bitstream writer
//! (`Parser::BitStream`) projection/RWPK SEI payloads; that bit-level SEI
//! encoding is HEVC-parser territory and out of scope here (`spec.md` §1).
//! This module reproduces only the framing the original leaves to its
//! caller — a big-endian length-prefixed sequence of NAL-ish byte buffers —
//! over a deliberately simplified payload encoding, so the tile proxy can
//! still demonstrate "first emission carries extra bytes, later emissions
//! don't" without depending on a real SEI bit writer.

use common::RegionPacking;

fn write_length_prefixed(out: &mut Vec<u8>, payload: &[u8]) {
    out.extend_from_slice(&(u32::try_from(payload.len()).unwrap_or(u32::MAX)).to_be_bytes());
    out.extend_from_slice(payload);
}

/// Builds the synthetic SEI buffer for one pooled/merged extractor stream's
/// first sample: a projection-SEI placeholder followed by an RWPK-SEI
/// placeholder when region packing is present.
#[must_use]
pub fn build_synthetic_sei_buffer(region_packing: Option<&RegionPacking>) -> Vec<u8> {
    let mut buffer = Vec::new();
    write_length_prefixed(&mut buffer, b"projection-sei");
    if let Some(rp) = region_packing {
        let mut payload = Vec::new();
        payload.extend_from_slice(&rp.packed_picture_width.to_be_bytes());
        payload.extend_from_slice(&rp.packed_picture_height.to_be_bytes());
        payload.extend_from_slice(&rp.proj_picture_width.to_be_bytes());
        payload.extend_from_slice(&rp.proj_picture_height.to_be_bytes());
        payload.push(u8::from(rp.constituent_pict_matching));
        payload.extend_from_slice(&u32::try_from(rp.regions.len()).unwrap_or(u32::MAX).to_be_bytes());
        write_length_prefixed(&mut buffer, &payload);
    }
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_grows_with_region_packing_present() {
        let without = build_synthetic_sei_buffer(None);
        let with = build_synthetic_sei_buffer(Some(&RegionPacking::default()));
        assert!(with.len() > without.len());
    }
}
