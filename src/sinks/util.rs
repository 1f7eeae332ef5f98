// SPDX-License-Identifier: GPL-2.0-or-later

use common::Storage;

/// Flattens CPU-resident planes into one contiguous buffer for the
/// illustrative sinks below. Non-CPU storage (GPU, file-backed) has nothing
/// to write here and yields an empty buffer.
pub(crate) fn storage_bytes(storage: &Storage) -> Vec<u8> {
    match storage {
        Storage::Cpu(planes) | Storage::CpuSubView { parent: planes, .. } => {
            planes.planes.iter().flat_map(|p| p.to_vec()).collect()
        }
        Storage::Empty | Storage::EndOfStream | Storage::Gpu { .. } | Storage::File { .. } => {
            Vec::new()
        }
        Storage::Fragmented(parts) => parts.iter().flat_map(storage_bytes).collect(),
    }
}
