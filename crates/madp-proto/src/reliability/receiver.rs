//! The receiving half of MADP: in-order delivery through a reorder buffer,
//! cumulative acknowledgments, and per-file reassembly.

use crate::error::{Result, TransferError};
use crate::protocol::{AckPacket, DataPacket, MAX_DATA_PACKET_LEN};
use crate::reassembler::{AssembledObject, FileReassembler};
use crate::workload::Chunk;
use bytes::Bytes;
use log::{debug, trace, warn};
use madp_binary::io::{BinaryReader, BinaryWriter};
use madp_binary::traits::{Readable, Writable};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;

/// What to do with one verified data packet.
#[derive(Debug)]
enum Arrival {
    /// The packet was the expected one; it and any contiguous buffered run
    /// are delivered, acknowledged cumulatively by `ack_seq`.
    Delivered { chunks: Vec<Chunk>, ack_seq: u16 },
    /// The packet arrived early and was buffered. `dup_ack` repeats the last
    /// cumulative acknowledgment to drive fast retransmit, unless nothing
    /// has been delivered yet.
    Buffered { dup_ack: Option<u16> },
    /// Below the expected sequence: already delivered, drop.
    AlreadyDelivered,
}

/// Holds verified out-of-order chunks until the sequence gap closes.
///
/// In practice its size is bounded by the sender's window; every buffered
/// key is strictly greater than `expected_seq`.
#[derive(Debug, Default)]
struct ReorderBuffer {
    expected_seq: u32,
    buffered: HashMap<u16, Chunk>,
}

impl ReorderBuffer {
    fn new() -> Self {
        Self::default()
    }

    /// Next global sequence number required for in-order delivery.
    fn expected_seq(&self) -> u32 {
        self.expected_seq
    }

    fn accept(&mut self, seq_num: u16, chunk: Chunk) -> Arrival {
        let seq = seq_num as u32;
        if seq == self.expected_seq {
            let mut chunks = vec![chunk];
            self.expected_seq += 1;
            while let Some(next) = self.buffered.remove(&(self.expected_seq as u16)) {
                chunks.push(next);
                self.expected_seq += 1;
            }
            Arrival::Delivered {
                chunks,
                ack_seq: (self.expected_seq - 1) as u16,
            }
        } else if seq > self.expected_seq {
            // There is no cumulative sequence to repeat before the first
            // in-order delivery.
            let dup_ack = (self.expected_seq > 0).then(|| (self.expected_seq - 1) as u16);
            self.buffered.entry(seq_num).or_insert(chunk);
            Arrival::Buffered { dup_ack }
        } else {
            Arrival::AlreadyDelivered
        }
    }

    fn buffered_len(&self) -> usize {
        self.buffered.len()
    }
}

/// Counters reported once the transfer completes at the receiver.
#[derive(Debug, Clone, Default)]
pub struct ReceiverReport {
    /// From the first valid packet until the final in-order delivery.
    pub elapsed: Duration,
    /// Workload size learned from the first valid packet.
    pub total_chunks: u32,
    /// Files reassembled and handed to the writer.
    pub completed_objects: usize,
}

/// The MADP receiver endpoint: reads the forward data channel, delivers
/// chunks in order, and acknowledges on the reverse channel.
pub struct MadpReceiver {
    data_socket: UdpSocket,
    ack_socket: UdpSocket,
    ack_target: SocketAddr,
}

impl MadpReceiver {
    /// `data_socket` is bound to the address the sender targets;
    /// acknowledgments go out of `ack_socket` toward `ack_target`.
    pub fn new(data_socket: UdpSocket, ack_socket: UdpSocket, ack_target: SocketAddr) -> Self {
        Self {
            data_socket,
            ack_socket,
            ack_target,
        }
    }

    /// Receives until the whole workload has been delivered in order, handing
    /// each completed file to `deliver`. Finishes by signalling the sender
    /// with a zero-length datagram on the reverse channel.
    pub async fn run<W>(self, mut deliver: W) -> Result<ReceiverReport>
    where
        W: FnMut(AssembledObject) -> io::Result<()>,
    {
        let mut buf = [0u8; MAX_DATA_PACKET_LEN];
        let mut reorder = ReorderBuffer::new();
        let mut reassembler = FileReassembler::new();
        let mut total_chunks: Option<u32> = None;
        let mut started: Option<Instant> = None;
        let mut completed = 0usize;

        loop {
            if let Some(total) = total_chunks {
                if reorder.expected_seq() >= total {
                    break;
                }
            }
            let (len, _) = self.data_socket.recv_from(&mut buf).await?;
            if len == 0 {
                debug!("forward channel closed by peer");
                break;
            }
            let mut reader = BinaryReader::new(Bytes::copy_from_slice(&buf[..len]));
            let packet = match DataPacket::read(&mut reader) {
                Ok(packet) => packet,
                Err(e) => {
                    // No NACK; the sender's timer or duplicate ACKs recover it.
                    debug!("dropping corrupt data packet: {e}");
                    continue;
                }
            };
            if started.is_none() {
                started = Some(Instant::now());
                total_chunks = Some(packet.total_chunks as u32);
            }

            let echo_ts = packet.timestamp;
            match reorder.accept(packet.seq_num, packet.chunk) {
                Arrival::Delivered { chunks, ack_seq } => {
                    for chunk in chunks {
                        if let Some(object) = reassembler.add_chunk(chunk) {
                            deliver(object).map_err(TransferError::Io)?;
                            completed += 1;
                        }
                    }
                    self.send_ack(ack_seq, echo_ts).await?;
                }
                Arrival::Buffered { dup_ack } => {
                    trace!(
                        "buffered #{} ahead of expected {} ({} held)",
                        packet.seq_num,
                        reorder.expected_seq(),
                        reorder.buffered_len()
                    );
                    if let Some(ack_seq) = dup_ack {
                        self.send_ack(ack_seq, echo_ts).await?;
                    }
                }
                Arrival::AlreadyDelivered => {}
            }
        }

        let elapsed = started.map(|t| t.elapsed()).unwrap_or_default();
        if reassembler.pending_files() > 0 {
            warn!(
                "transfer ended with {} incomplete files",
                reassembler.pending_files()
            );
        }

        // Termination signal on the reverse channel.
        self.ack_socket.send_to(&[], self.ack_target).await?;

        Ok(ReceiverReport {
            elapsed,
            total_chunks: total_chunks.unwrap_or(0),
            completed_objects: completed,
        })
    }

    async fn send_ack(&self, ack_seq: u16, echo_ts: f64) -> Result<()> {
        let ack = AckPacket {
            timestamp: echo_ts,
            ack_seq,
        };
        let mut writer = BinaryWriter::new();
        ack.write(&mut writer)?;
        self.ack_socket
            .send_to(&writer.freeze(), self.ack_target)
            .await?;
        trace!("acknowledged up to #{ack_seq}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::SizeClass;

    fn chunk(tag: u8) -> Chunk {
        Chunk {
            file_id: 0,
            chunk_num: tag as u16,
            payload: Bytes::from(vec![tag]),
            last_of_file: false,
            size_class: SizeClass::Small,
        }
    }

    fn payload_tags(chunks: &[Chunk]) -> Vec<u8> {
        chunks.iter().map(|c| c.payload[0]).collect()
    }

    #[test]
    fn in_order_packets_deliver_immediately() {
        let mut reorder = ReorderBuffer::new();
        for seq in 0..3u16 {
            match reorder.accept(seq, chunk(seq as u8)) {
                Arrival::Delivered { chunks, ack_seq } => {
                    assert_eq!(chunks.len(), 1);
                    assert_eq!(ack_seq, seq);
                }
                other => panic!("expected delivery, got {other:?}"),
            }
        }
        assert_eq!(reorder.expected_seq(), 3);
        assert_eq!(reorder.buffered_len(), 0);
    }

    #[test]
    fn gap_buffers_and_repeats_last_ack() {
        let mut reorder = ReorderBuffer::new();
        reorder.accept(0, chunk(0));
        // 2 arrives before 1: repeat the cumulative ACK for 0.
        match reorder.accept(2, chunk(2)) {
            Arrival::Buffered { dup_ack } => assert_eq!(dup_ack, Some(0)),
            other => panic!("expected buffering, got {other:?}"),
        }
        // 1 closes the gap; 1 and 2 come out together.
        match reorder.accept(1, chunk(1)) {
            Arrival::Delivered { chunks, ack_seq } => {
                assert_eq!(payload_tags(&chunks), vec![1, 2]);
                assert_eq!(ack_seq, 2);
            }
            other => panic!("expected delivery, got {other:?}"),
        }
        assert_eq!(reorder.buffered_len(), 0);
    }

    #[test]
    fn no_ack_before_the_first_delivery() {
        let mut reorder = ReorderBuffer::new();
        // Packet 0 was lost; 1 arrives first. Nothing has been delivered so
        // there is no cumulative sequence to acknowledge.
        match reorder.accept(1, chunk(1)) {
            Arrival::Buffered { dup_ack } => assert_eq!(dup_ack, None),
            other => panic!("expected buffering, got {other:?}"),
        }
        match reorder.accept(0, chunk(0)) {
            Arrival::Delivered { chunks, ack_seq } => {
                assert_eq!(payload_tags(&chunks), vec![0, 1]);
                assert_eq!(ack_seq, 1);
            }
            other => panic!("expected delivery, got {other:?}"),
        }
    }

    #[test]
    fn already_delivered_packets_are_dropped() {
        let mut reorder = ReorderBuffer::new();
        reorder.accept(0, chunk(0));
        reorder.accept(1, chunk(1));
        assert!(matches!(
            reorder.accept(0, chunk(0)),
            Arrival::AlreadyDelivered
        ));
        assert_eq!(reorder.expected_seq(), 2);
    }

    #[test]
    fn duplicate_buffered_packet_is_kept_once() {
        let mut reorder = ReorderBuffer::new();
        reorder.accept(0, chunk(0));
        reorder.accept(5, chunk(5));
        reorder.accept(5, chunk(5));
        assert_eq!(reorder.buffered_len(), 1);
    }

    #[test]
    fn reorder_of_five_before_four() {
        let mut reorder = ReorderBuffer::new();
        for seq in 0..4u16 {
            reorder.accept(seq, chunk(seq as u8));
        }
        // 5 before 4: duplicate ACK for 3.
        match reorder.accept(5, chunk(5)) {
            Arrival::Buffered { dup_ack } => assert_eq!(dup_ack, Some(3)),
            other => panic!("expected buffering, got {other:?}"),
        }
        // 4 arrives: 4 then 5 are delivered and 5 is acknowledged.
        match reorder.accept(4, chunk(4)) {
            Arrival::Delivered { chunks, ack_seq } => {
                assert_eq!(payload_tags(&chunks), vec![4, 5]);
                assert_eq!(ack_seq, 5);
            }
            other => panic!("expected delivery, got {other:?}"),
        }
    }
}
