//! The deterministic chunk sequence a transfer walks from start to finish.

use crate::error::{Result, TransferError};
use crate::protocol::MSS;
use bytes::Bytes;

/// Distinguishes the two pre-defined object groups of the workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeClass {
    Small,
    Large,
}

impl SizeClass {
    pub fn from_flag(large: bool) -> Self {
        if large { Self::Large } else { Self::Small }
    }

    pub fn is_large(self) -> bool {
        matches!(self, Self::Large)
    }

    /// The object-file prefix ("small" / "large").
    pub fn name(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Large => "large",
        }
    }

    /// Single-character tag used when naming reconstructed files.
    pub fn tag(self) -> char {
        match self {
            Self::Small => 's',
            Self::Large => 'l',
        }
    }
}

/// One source object, loaded fully into memory before chunking.
#[derive(Debug, Clone)]
pub struct SourceObject {
    pub file_id: u16,
    pub size_class: SizeClass,
    pub data: Bytes,
}

/// A single transmission unit: at most [`MSS`] payload bytes of one file.
///
/// Chunks are immutable once produced; `payload` is a zero-copy slice of the
/// loaded object.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub file_id: u16,
    /// Zero-based index of the chunk within its file (payload offset / MSS).
    pub chunk_num: u16,
    pub payload: Bytes,
    pub last_of_file: bool,
    pub size_class: SizeClass,
}

/// The finite ordered chunk sequence. A chunk's position in this sequence is
/// its global sequence number.
#[derive(Debug)]
pub struct Workload {
    chunks: Vec<Chunk>,
}

impl Workload {
    /// Chunks each object in the given order, at exactly [`MSS`] bytes per
    /// payload except possibly the last of each file. The caller supplies the
    /// objects already in the desired global send order.
    pub fn from_objects<I>(objects: I) -> Result<Self>
    where
        I: IntoIterator<Item = SourceObject>,
    {
        let mut chunks = Vec::new();
        for object in objects {
            if object.data.is_empty() {
                // An empty object still occupies one terminating chunk so the
                // receiver can complete the file.
                chunks.push(Chunk {
                    file_id: object.file_id,
                    chunk_num: 0,
                    payload: Bytes::new(),
                    last_of_file: true,
                    size_class: object.size_class,
                });
                continue;
            }
            let mut offset = 0;
            while offset < object.data.len() {
                let end = usize::min(offset + MSS, object.data.len());
                chunks.push(Chunk {
                    file_id: object.file_id,
                    chunk_num: (offset / MSS) as u16,
                    payload: object.data.slice(offset..end),
                    last_of_file: end == object.data.len(),
                    size_class: object.size_class,
                });
                offset = end;
            }
        }
        if chunks.len() > u16::MAX as usize {
            return Err(TransferError::WorkloadTooLarge(chunks.len()));
        }
        Ok(Self { chunks })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total chunk count as carried in every data packet header.
    pub fn total_chunks(&self) -> u16 {
        self.chunks.len() as u16
    }

    /// The chunk at global sequence number `seq_num`.
    pub fn chunk(&self, seq_num: u16) -> &Chunk {
        &self.chunks[seq_num as usize]
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }
}
