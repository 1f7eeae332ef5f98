// SPDX-License-Identifier: GPL-2.0-or-later

//! Illustrative per-frame debug sink (`spec.md` §4.8): writes one file per
//! frame plus a sidecar metadata file. Exists only to enumerate the `Sink`
//! contract end-to-end, not as a production-grade dump tool.

use crate::util::storage_bytes;
use common::Streams;
use graph::{NodeBase, NodeError, Sink};
use std::fs;
use std::path::PathBuf;

pub struct DebugSaveSink {
    name: String,
    dir: PathBuf,
    counter: u64,
}

impl DebugSaveSink {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self {
            name: "debug-save".to_owned(),
            dir,
            counter: 0,
        }
    }
}

impl NodeBase for DebugSaveSink {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Sink for DebugSaveSink {
    fn consume(&mut self, streams: Streams) -> Result<(), NodeError> {
        if streams.is_end_of_stream() {
            return Ok(());
        }
        for data in streams.as_slice() {
            let index = self.counter;
            self.counter += 1;

            let data_path = self
                .dir
                .join(format!("frame-{index:08}-stream{}.bin", data.stream_id()));
            fs::write(&data_path, storage_bytes(data.storage())).map_err(|source| {
                NodeError::CannotWriteFile {
                    path: data_path.display().to_string(),
                    source,
                }
            })?;

            let meta_path = self.dir.join(format!(
                "frame-{index:08}-stream{}.meta.txt",
                data.stream_id()
            ));
            let meta_text = data.meta().map_or_else(String::new, |m| format!("{m:?}"));
            fs::write(&meta_path, meta_text).map_err(|source| NodeError::CannotWriteFile {
                path: meta_path.display().to_string(),
                source,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Data, StreamId};

    #[test]
    fn test_writes_one_file_pair_per_frame() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut sink = DebugSaveSink::new(dir.path().to_path_buf());

        sink.consume(Streams::single(Data::empty(StreamId::new(1))))
            .expect("consume");
        sink.consume(Streams::single(Data::empty(StreamId::new(1))))
            .expect("consume");

        let mut entries: Vec<_> = fs::read_dir(dir.path())
            .expect("read_dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        entries.sort();
        assert_eq!(
            entries,
            vec![
                "frame-00000000-stream1.bin".to_owned(),
                "frame-00000000-stream1.meta.txt".to_owned(),
                "frame-00000001-stream1.bin".to_owned(),
                "frame-00000001-stream1.meta.txt".to_owned(),
            ]
        );
    }

    #[test]
    fn test_end_of_stream_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut sink = DebugSaveSink::new(dir.path().to_path_buf());
        sink.consume(Streams::single(Data::end_of_stream(StreamId::new(1))))
            .expect("consume");
        let count = fs::read_dir(dir.path()).expect("read_dir").count();
        assert_eq!(count, 0);
    }
}
