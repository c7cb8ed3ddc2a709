//! # MADP Wire Format
//!
//! Fixed-layout headers for the datagram path (data packets and cumulative
//! acknowledgments, both carrying a 128-bit integrity digest) and for the
//! stream-variant framing (no digest). All multi-byte integers are network
//! byte order.

use crate::workload::{Chunk, SizeClass};
use madp_binary::error::BinaryError;
use madp_binary::io::{BinaryReader, BinaryWriter};
use madp_binary::traits::{Readable, Writable};
use md5::{Digest, Md5};

/// Maximum segment size: the payload byte budget per data packet.
pub const MSS: usize = 1400;
/// Data packet header: 16 digest + 8 timestamp + 2+2+2+2 sequencing + 1+1 flags.
pub const DATA_HEADER_LEN: usize = 34;
/// Largest data packet on the wire.
pub const MAX_DATA_PACKET_LEN: usize = DATA_HEADER_LEN + MSS;
/// Acknowledgment packet: 16 digest + 8 echoed timestamp + 2 ack_seq.
pub const ACK_PACKET_LEN: usize = 26;
/// Stream-variant frame header: 2+2+2 sequencing + 1+1 flags.
pub const FRAME_HEADER_LEN: usize = 8;
/// Largest stream-variant frame.
pub const MAX_FRAME_LEN: usize = FRAME_HEADER_LEN + MSS;

/// MD5 over the payload bytes only. Retransmissions rewrite the header
/// (timestamp) without touching the digest.
fn payload_digest(payload: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(payload);
    hasher.finalize().into()
}

/// MD5 over the two big-endian bytes of the acknowledged sequence number.
fn ack_digest(ack_seq: u16) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(ack_seq.to_be_bytes());
    hasher.finalize().into()
}

/// A data packet: one workload chunk plus its transfer header.
#[derive(Debug, Clone)]
pub struct DataPacket {
    /// Sender-local clock at transmission time, echoed back in the ACK.
    pub timestamp: f64,
    /// Global sequence number of the chunk in the workload.
    pub seq_num: u16,
    /// The sender's count of the entire workload.
    pub total_chunks: u16,
    pub chunk: Chunk,
}

impl Writable for DataPacket {
    fn write(&self, writer: &mut BinaryWriter) -> Result<(), BinaryError> {
        writer.write_bytes(&payload_digest(&self.chunk.payload))?;
        writer.write_f64(self.timestamp)?;
        writer.write_u16(self.seq_num)?;
        writer.write_u16(self.chunk.file_id)?;
        writer.write_u16(self.chunk.chunk_num)?;
        writer.write_u16(self.total_chunks)?;
        writer.write_bool(self.chunk.last_of_file)?;
        writer.write_bool(self.chunk.size_class.is_large())?;
        writer.write_bytes(&self.chunk.payload)?;
        Ok(())
    }
}

impl Readable for DataPacket {
    fn read(reader: &mut BinaryReader) -> Result<Self, BinaryError> {
        let mut digest = [0u8; 16];
        reader.read_exact(&mut digest)?;
        let timestamp = reader.read_f64()?;
        let seq_num = reader.read_u16()?;
        let file_id = reader.read_u16()?;
        let chunk_num = reader.read_u16()?;
        let total_chunks = reader.read_u16()?;
        let last_of_file = reader.read_bool()?;
        let size_class = SizeClass::from_flag(reader.read_bool()?);
        let payload = reader.read_remaining();

        let computed = payload_digest(&payload);
        if digest != computed {
            return Err(BinaryError::InvalidData(format!(
                "data packet digest mismatch: carried {}, computed {}",
                hex::encode(digest),
                hex::encode(computed)
            )));
        }

        Ok(Self {
            timestamp,
            seq_num,
            total_chunks,
            chunk: Chunk {
                file_id,
                chunk_num,
                payload,
                last_of_file,
                size_class,
            },
        })
    }
}

/// A cumulative acknowledgment: the highest sequence number delivered in
/// order, implicitly acknowledging every smaller sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AckPacket {
    /// Timestamp echoed from the data packet being acknowledged.
    pub timestamp: f64,
    pub ack_seq: u16,
}

impl Writable for AckPacket {
    fn write(&self, writer: &mut BinaryWriter) -> Result<(), BinaryError> {
        writer.write_bytes(&ack_digest(self.ack_seq))?;
        writer.write_f64(self.timestamp)?;
        writer.write_u16(self.ack_seq)?;
        Ok(())
    }
}

impl Readable for AckPacket {
    fn read(reader: &mut BinaryReader) -> Result<Self, BinaryError> {
        let mut digest = [0u8; 16];
        reader.read_exact(&mut digest)?;
        let timestamp = reader.read_f64()?;
        let ack_seq = reader.read_u16()?;

        let computed = ack_digest(ack_seq);
        if digest != computed {
            return Err(BinaryError::InvalidData(format!(
                "ACK digest mismatch: carried {}, computed {}",
                hex::encode(digest),
                hex::encode(computed)
            )));
        }

        Ok(Self { timestamp, ack_seq })
    }
}

/// Stream-variant framing: the same chunk tagging over a reliable byte
/// stream, with an explicit payload length instead of a digest.
#[derive(Debug, Clone)]
pub struct FramedChunk {
    pub chunk: Chunk,
}

impl Writable for FramedChunk {
    fn write(&self, writer: &mut BinaryWriter) -> Result<(), BinaryError> {
        let len = self.chunk.payload.len();
        if len > MSS {
            return Err(BinaryError::InvalidData(format!(
                "frame payload of {len} bytes exceeds MSS"
            )));
        }
        writer.write_u16(self.chunk.file_id)?;
        writer.write_u16(self.chunk.chunk_num)?;
        writer.write_u16(len as u16)?;
        writer.write_bool(self.chunk.last_of_file)?;
        writer.write_bool(self.chunk.size_class.is_large())?;
        writer.write_bytes(&self.chunk.payload)?;
        Ok(())
    }
}

impl Readable for FramedChunk {
    fn read(reader: &mut BinaryReader) -> Result<Self, BinaryError> {
        let file_id = reader.read_u16()?;
        let chunk_num = reader.read_u16()?;
        let chunk_size = reader.read_u16()? as usize;
        let last_of_file = reader.read_bool()?;
        let size_class = SizeClass::from_flag(reader.read_bool()?);
        let payload = reader.read_bytes(chunk_size)?;
        Ok(Self {
            chunk: Chunk {
                file_id,
                chunk_num,
                payload,
                last_of_file,
                size_class,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{Bytes, BytesMut};

    fn sample_chunk(payload: &'static [u8]) -> Chunk {
        Chunk {
            file_id: 4,
            chunk_num: 9,
            payload: Bytes::from_static(payload),
            last_of_file: true,
            size_class: SizeClass::Large,
        }
    }

    fn encode<P: Writable>(packet: &P) -> Bytes {
        let mut writer = BinaryWriter::new();
        packet.write(&mut writer).unwrap();
        writer.freeze()
    }

    #[test]
    fn data_packet_round_trip() {
        let packet = DataPacket {
            timestamp: 12.375,
            seq_num: 1000,
            total_chunks: 7230,
            chunk: sample_chunk(b"payload bytes"),
        };
        let encoded = encode(&packet);
        assert_eq!(encoded.len(), DATA_HEADER_LEN + 13);

        let decoded = DataPacket::read(&mut BinaryReader::new(encoded)).unwrap();
        assert_eq!(decoded.timestamp, 12.375);
        assert_eq!(decoded.seq_num, 1000);
        assert_eq!(decoded.total_chunks, 7230);
        assert_eq!(decoded.chunk.file_id, 4);
        assert_eq!(decoded.chunk.chunk_num, 9);
        assert!(decoded.chunk.last_of_file);
        assert_eq!(decoded.chunk.size_class, SizeClass::Large);
        assert_eq!(decoded.chunk.payload.as_ref(), b"payload bytes");
    }

    #[test]
    fn retransmission_rewrites_header_only() {
        let chunk = sample_chunk(b"same payload");
        let first = encode(&DataPacket {
            timestamp: 1.0,
            seq_num: 5,
            total_chunks: 10,
            chunk: chunk.clone(),
        });
        let second = encode(&DataPacket {
            timestamp: 2.0,
            seq_num: 5,
            total_chunks: 10,
            chunk,
        });
        // Digest and everything past the timestamp are identical.
        assert_eq!(first[..16], second[..16]);
        assert_eq!(first[24..], second[24..]);
        let decoded = DataPacket::read(&mut BinaryReader::new(second)).unwrap();
        assert_eq!(decoded.chunk.payload.as_ref(), b"same payload");
    }

    #[test]
    fn corrupted_payload_is_rejected() {
        let packet = DataPacket {
            timestamp: 0.0,
            seq_num: 0,
            total_chunks: 1,
            chunk: sample_chunk(b"fragile"),
        };
        let mut corrupted = BytesMut::from(encode(&packet).as_ref());
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xff;
        let err = DataPacket::read(&mut BinaryReader::new(corrupted.freeze())).unwrap_err();
        assert!(matches!(err, BinaryError::InvalidData(_)));
    }

    #[test]
    fn truncated_data_packet_is_rejected() {
        let packet = DataPacket {
            timestamp: 0.0,
            seq_num: 0,
            total_chunks: 1,
            chunk: sample_chunk(b"x"),
        };
        let encoded = encode(&packet);
        let truncated = encoded.slice(..DATA_HEADER_LEN - 4);
        assert!(DataPacket::read(&mut BinaryReader::new(truncated)).is_err());
    }

    #[test]
    fn ack_round_trip() {
        let ack = AckPacket {
            timestamp: 99.5,
            ack_seq: 4242,
        };
        let encoded = encode(&ack);
        assert_eq!(encoded.len(), ACK_PACKET_LEN);
        let decoded = AckPacket::read(&mut BinaryReader::new(encoded)).unwrap();
        assert_eq!(decoded, ack);
    }

    #[test]
    fn corrupted_ack_is_rejected() {
        let mut corrupted = BytesMut::from(
            encode(&AckPacket {
                timestamp: 1.0,
                ack_seq: 7,
            })
            .as_ref(),
        );
        // Flip a bit in ack_seq; the digest no longer matches.
        corrupted[ACK_PACKET_LEN - 1] ^= 0x01;
        let err = AckPacket::read(&mut BinaryReader::new(corrupted.freeze())).unwrap_err();
        assert!(matches!(err, BinaryError::InvalidData(_)));
    }

    #[test]
    fn framed_chunks_parse_back_to_back() {
        let mut writer = BinaryWriter::new();
        for (num, payload) in [b"first".as_slice(), b"second!".as_slice()]
            .into_iter()
            .enumerate()
        {
            FramedChunk {
                chunk: Chunk {
                    file_id: 2,
                    chunk_num: num as u16,
                    payload: Bytes::copy_from_slice(payload),
                    last_of_file: num == 1,
                    size_class: SizeClass::Small,
                },
            }
            .write(&mut writer)
            .unwrap();
        }

        let mut reader = BinaryReader::new(writer.freeze());
        let first = FramedChunk::read(&mut reader).unwrap();
        assert_eq!(first.chunk.payload.as_ref(), b"first");
        assert!(!first.chunk.last_of_file);
        let second = FramedChunk::read(&mut reader).unwrap();
        assert_eq!(second.chunk.payload.as_ref(), b"second!");
        assert!(second.chunk.last_of_file);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn truncated_frame_payload_is_rejected() {
        let mut writer = BinaryWriter::new();
        FramedChunk {
            chunk: sample_chunk(b"whole payload"),
        }
        .write(&mut writer)
        .unwrap();
        let encoded = writer.freeze();
        let truncated = encoded.slice(..encoded.len() - 3);
        assert!(FramedChunk::read(&mut BinaryReader::new(truncated)).is_err());
    }
}
