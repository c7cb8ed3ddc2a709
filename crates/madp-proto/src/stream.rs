//! # Chunk-Framed Stream Variant
//!
//! The comparison endpoint: the same chunk tagging pushed over a reliable
//! byte stream. No windowing, no digests, no retransmission; end of transfer
//! is the transport's end-of-stream.

use crate::error::{Result, TransferError};
use crate::protocol::{FRAME_HEADER_LEN, FramedChunk};
use crate::reassembler::{AssembledObject, FileReassembler};
use crate::workload::Workload;
use bytes::Bytes;
use log::{debug, info};
use madp_binary::io::{BinaryReader, BinaryWriter};
use madp_binary::traits::{Readable, Writable};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Writes every workload chunk as a framed packet, then shuts the stream
/// down to signal end of transfer.
pub async fn send_framed<S>(stream: &mut S, workload: &Workload) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    for chunk in workload.chunks() {
        let mut writer = BinaryWriter::with_capacity(FRAME_HEADER_LEN + chunk.payload.len());
        FramedChunk {
            chunk: chunk.clone(),
        }
        .write(&mut writer)?;
        stream.write_all(&writer.freeze()).await?;
    }
    stream.flush().await?;
    stream.shutdown().await?;
    info!("streamed {} chunks", workload.len());
    Ok(())
}

/// Reads the stream to end-of-stream, then walks it frame by frame and feeds
/// each chunk to the reassembler. Returns the number of completed files.
pub async fn recv_framed<S, W>(stream: &mut S, mut deliver: W) -> Result<usize>
where
    S: AsyncRead + Unpin,
    W: FnMut(AssembledObject) -> io::Result<()>,
{
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;
    debug!("stream closed after {} bytes", raw.len());

    let mut reader = BinaryReader::new(Bytes::from(raw));
    let mut reassembler = FileReassembler::new();
    let mut completed = 0;
    while reader.remaining() > 0 {
        let frame = FramedChunk::read(&mut reader)?;
        if let Some(object) = reassembler.add_chunk(frame.chunk) {
            deliver(object).map_err(TransferError::Io)?;
            completed += 1;
        }
    }
    Ok(completed)
}
