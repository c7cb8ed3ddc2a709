//! # MADP Reliability Layer
//!
//! The sliding-window sender (send loop, ACK handler and retransmission
//! timer as three cooperating tasks) and the receiving side's in-order
//! delivery with its out-of-order reorder buffer.

mod receiver;
mod rtt;
mod sender;
mod timer;

pub use receiver::{MadpReceiver, ReceiverReport};
pub use rtt::RttEstimator;
pub use sender::{MadpSender, SenderConfig, SenderReport};
