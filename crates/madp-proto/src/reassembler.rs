//! Per-file reassembly of delivered chunks into completed objects.

use crate::workload::{Chunk, SizeClass};
use bytes::{Bytes, BytesMut};
use log::{debug, trace};
use std::collections::HashMap;

/// Key identifying one file of the workload.
pub type FileKey = (SizeClass, u16);

/// A fully reassembled file, ready to be handed to the writer.
#[derive(Debug, Clone)]
pub struct AssembledObject {
    pub size_class: SizeClass,
    pub file_id: u16,
    pub data: Bytes,
}

impl AssembledObject {
    /// Name of the reconstructed file on disk.
    pub fn file_name(&self) -> String {
        format!("reconstructed_{}{}.obj", self.size_class.tag(), self.file_id)
    }
}

/// Buffers chunks per file and emits each file once its final chunk and every
/// index before it have arrived. Completed files are dropped from the map
/// immediately.
#[derive(Debug, Default)]
pub struct FileReassembler {
    files: HashMap<FileKey, HashMap<u16, Bytes>>,
}

impl FileReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores one chunk. Returns the assembled file when this chunk carried
    /// the `last_of_file` flag and the file is complete.
    pub fn add_chunk(&mut self, chunk: Chunk) -> Option<AssembledObject> {
        let key: FileKey = (chunk.size_class, chunk.file_id);
        let parts = self.files.entry(key).or_default();
        parts.insert(chunk.chunk_num, chunk.payload);
        trace!(
            "buffered chunk {} of {}-{} ({} held)",
            chunk.chunk_num,
            key.0.name(),
            key.1,
            parts.len()
        );

        if !chunk.last_of_file || !Self::is_complete(parts) {
            return None;
        }

        let parts = self.files.remove(&key)?;
        let data = Self::assemble(parts);
        debug!(
            "completed {}-{} ({} bytes)",
            key.0.name(),
            key.1,
            data.len()
        );
        Some(AssembledObject {
            size_class: key.0,
            file_id: key.1,
            data,
        })
    }

    /// A file is complete when every chunk index from 0 through the highest
    /// observed index is present.
    fn is_complete(parts: &HashMap<u16, Bytes>) -> bool {
        let max = match parts.keys().max() {
            Some(max) => *max,
            None => return false,
        };
        (0..=max).all(|num| parts.contains_key(&num))
    }

    fn assemble(parts: HashMap<u16, Bytes>) -> Bytes {
        let mut ordered: Vec<_> = parts.into_iter().collect();
        ordered.sort_unstable_by_key(|(num, _)| *num);
        let mut data = BytesMut::with_capacity(ordered.iter().map(|(_, p)| p.len()).sum());
        for (_, payload) in ordered {
            data.extend_from_slice(&payload);
        }
        data.freeze()
    }

    /// Number of files with buffered chunks still awaiting completion.
    pub fn pending_files(&self) -> usize {
        self.files.len()
    }
}
