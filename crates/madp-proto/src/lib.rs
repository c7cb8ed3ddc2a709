//! # MADP Protocol Engine
//!
//! Reliable, ordered, one-way bulk transfer of file chunks over UDP:
//! sliding-window sender with retransmission timeout, duplicate-ACK fast
//! retransmit and slow-start/congestion-avoidance window control, plus the
//! receiving side's reorder buffer and per-file reassembly. A chunk-framed
//! variant over a reliable byte stream shares the same chunk model.

pub mod clock;
pub mod error;
pub mod protocol;
pub mod reassembler;
pub mod reliability;
pub mod stream;
pub mod workload;

pub use error::TransferError;
pub use reassembler::{AssembledObject, FileReassembler};
pub use reliability::{MadpReceiver, MadpSender, ReceiverReport, SenderConfig, SenderReport};
pub use workload::{Chunk, SizeClass, SourceObject, Workload};
