use madp_binary::error::BinaryError;
use std::io;
use thiserror::Error;

/// Errors that can occur while driving a MADP transfer.
///
/// Packet-level faults (corruption, duplication, loss) are masked by the
/// retransmission machinery and never surface here; only transport failures
/// and malformed workloads are fatal.
#[derive(Error, Debug)]
pub enum TransferError {
    /// An I/O error on the underlying socket or stream.
    #[error("network I/O error: {0}")]
    Io(#[from] io::Error),

    /// An error during wire serialization or deserialization.
    #[error("binary handling error: {0}")]
    Binary(#[from] BinaryError),

    /// The workload does not fit the 16-bit global sequence space.
    #[error("workload of {0} chunks exceeds the 16-bit sequence space")]
    WorkloadTooLarge(usize),
}

/// Result type alias for MADP transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;
