//! The sending half of MADP: a send loop, an ACK handler and a
//! retransmission timer as three cooperating tasks over one shared control
//! structure.

use crate::clock::monotonic_secs;
use crate::error::{Result, TransferError};
use crate::protocol::{AckPacket, DATA_HEADER_LEN, DataPacket};
use crate::reliability::rtt::RttEstimator;
use crate::reliability::timer::RetransmitTimer;
use crate::workload::Workload;
use bytes::Bytes;
use log::{debug, error, info, trace, warn};
use madp_binary::io::{BinaryReader, BinaryWriter};
use madp_binary::traits::{Readable, Writable};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, Notify};

// Window growth starts from a single packet.
const INITIAL_CWND: f64 = 1.0;
// The slow-start threshold never collapses below two packets.
const MIN_SSTHRESH: f64 = 2.0;
// Duplicate cumulative ACKs needed to trigger a fast retransmit.
const DUP_ACK_THRESHOLD: u32 = 3;

#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Static flow-control bound on outstanding packets; also the initial
    /// slow-start threshold.
    pub receive_window: u32,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            receive_window: 64_000,
        }
    }
}

/// Counters reported once the transfer is fully acknowledged.
#[derive(Debug, Clone, Default)]
pub struct SenderReport {
    /// From the first packet sent until the last acknowledgment.
    pub elapsed: Duration,
    /// Packets sent more than once (timeout and fast-retransmit resends).
    pub retransmissions: u64,
    /// Retransmission-timer expiries.
    pub timeouts: u64,
    /// Fast retransmits triggered by triple duplicate ACKs.
    pub fast_retransmits: u64,
}

/// What the ACK handler should do after folding one acknowledgment into the
/// control state.
#[derive(Debug, PartialEq)]
enum AckOutcome {
    /// A new cumulative ACK advanced the base.
    Advanced { rto: Duration, rearm: bool },
    /// Third duplicate ACK: resend everything in flight.
    FastRetransmit,
    /// Duplicate below the threshold, or a reordered ACK.
    Ignored,
}

/// Sender state shared by the three tasks, guarded by the control mutex.
#[derive(Debug)]
struct SenderCtrl {
    /// Lowest unacknowledged global sequence number.
    base: u32,
    /// Next global sequence number to send.
    next_seq: u32,
    /// Congestion window in packets; fractional during avoidance.
    cwnd: f64,
    ssthresh: f64,
    dup_ack_count: u32,
    last_ack_seq: Option<u16>,
    rtt: RttEstimator,
}

impl SenderCtrl {
    fn new(config: &SenderConfig) -> Self {
        Self {
            base: 0,
            next_seq: 0,
            cwnd: INITIAL_CWND,
            ssthresh: config.receive_window as f64,
            dup_ack_count: 0,
            last_ack_seq: None,
            rtt: RttEstimator::new(),
        }
    }

    /// Effective window: `min(cwnd, rwnd)`, in packets.
    fn window(&self, receive_window: u32) -> f64 {
        self.cwnd.min(receive_window as f64)
    }

    fn on_ack(&mut self, ack_seq: u16, echo_ts: f64, now: f64) -> AckOutcome {
        let ack_next = ack_seq as u32 + 1;
        let outcome = if ack_next > self.base {
            self.base = ack_next;
            self.dup_ack_count = 0;
            self.rtt.on_sample(now - echo_ts);
            if self.cwnd < self.ssthresh {
                // Slow start doubles per ACK, deliberately more aggressive
                // than one-packet-per-ACK growth.
                self.cwnd *= 2.0;
            } else {
                // Congestion avoidance: one packet per window's worth of ACKs.
                self.cwnd += 1.0 / self.cwnd;
            }
            AckOutcome::Advanced {
                rto: self.rtt.rto(),
                rearm: self.base < self.next_seq,
            }
        } else if self.last_ack_seq == Some(ack_seq) {
            self.dup_ack_count += 1;
            if self.dup_ack_count == DUP_ACK_THRESHOLD {
                self.dup_ack_count = 0;
                self.ssthresh = (self.cwnd / 2.0).max(MIN_SSTHRESH);
                self.cwnd = self.ssthresh;
                AckOutcome::FastRetransmit
            } else {
                AckOutcome::Ignored
            }
        } else {
            // A reordered ACK on the reverse channel, not evidence of loss.
            self.dup_ack_count = 0;
            AckOutcome::Ignored
        };
        self.last_ack_seq = Some(ack_seq);
        outcome
    }

    /// Timeout means congestion: fall back to slow start from one packet.
    fn on_timeout(&mut self) {
        self.ssthresh = (self.cwnd / 2.0).max(MIN_SSTHRESH);
        self.cwnd = 1.0;
    }
}

/// Context shared between the send loop, the ACK handler and the timer.
struct SenderCtx {
    ctrl: Mutex<SenderCtrl>,
    /// Window-advance notification; signalled on every acknowledgment.
    advance: Notify,
    data_socket: Arc<UdpSocket>,
    peer: SocketAddr,
    workload: Arc<Workload>,
    receive_window: u32,
    total: u32,
    /// Set when the reverse channel is done (cleanly or not); unblocks the
    /// send loop.
    finished: AtomicBool,
    retransmissions: AtomicU64,
    timeouts: AtomicU64,
    fast_retransmits: AtomicU64,
}

/// The MADP sender endpoint. Owns the forward data channel and the reverse
/// acknowledgment channel for one transfer.
pub struct MadpSender {
    data_socket: Arc<UdpSocket>,
    ack_socket: Arc<UdpSocket>,
    peer: SocketAddr,
    workload: Arc<Workload>,
    config: SenderConfig,
}

impl MadpSender {
    /// `data_socket` transmits toward `peer`; `ack_socket` is bound to the
    /// address the receiver sends acknowledgments to.
    pub fn new(
        data_socket: UdpSocket,
        ack_socket: UdpSocket,
        peer: SocketAddr,
        workload: Arc<Workload>,
        config: SenderConfig,
    ) -> Self {
        Self {
            data_socket: Arc::new(data_socket),
            ack_socket: Arc::new(ack_socket),
            peer,
            workload,
            config,
        }
    }

    /// Drives the whole workload to acknowledgment, then signals shutdown
    /// with a zero-length datagram on the data channel.
    pub async fn run(self) -> Result<SenderReport> {
        let total = self.workload.total_chunks() as u32;
        if total == 0 {
            info!("empty workload, nothing to send");
            return Ok(SenderReport::default());
        }

        let ctx = Arc::new(SenderCtx {
            ctrl: Mutex::new(SenderCtrl::new(&self.config)),
            advance: Notify::new(),
            data_socket: Arc::clone(&self.data_socket),
            peer: self.peer,
            workload: Arc::clone(&self.workload),
            receive_window: self.config.receive_window,
            total,
            finished: AtomicBool::new(false),
            retransmissions: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            fast_retransmits: AtomicU64::new(0),
        });

        let (timer, timer_task) = RetransmitTimer::spawn({
            let ctx = Arc::clone(&ctx);
            move || on_timeout(Arc::clone(&ctx))
        });
        let ack_task = tokio::spawn(run_ack_handler(
            Arc::clone(&ctx),
            Arc::clone(&self.ack_socket),
            timer.clone(),
        ));

        let started = match run_send_loop(&ctx, &timer).await {
            Ok(started) => started,
            Err(e) => {
                ack_task.abort();
                drop(timer);
                return Err(e);
            }
        };
        ack_task
            .await
            .map_err(|e| TransferError::Io(std::io::Error::other(e)))??;
        drop(timer);
        let _ = timer_task.await;

        // Clean-shutdown signal on the forward channel.
        self.data_socket.send_to(&[], self.peer).await?;

        let report = SenderReport {
            elapsed: started.map(|t| t.elapsed()).unwrap_or_default(),
            retransmissions: ctx.retransmissions.load(Ordering::Relaxed),
            timeouts: ctx.timeouts.load(Ordering::Relaxed),
            fast_retransmits: ctx.fast_retransmits.load(Ordering::Relaxed),
        };
        info!(
            "transfer acknowledged: {} chunks in {:.3}s ({} retransmissions, {} timeouts, {} fast retransmits)",
            total,
            report.elapsed.as_secs_f64(),
            report.retransmissions,
            report.timeouts,
            report.fast_retransmits,
        );
        Ok(report)
    }
}

enum SendStep {
    Transmit { seq: u32, arm_rto: Option<Duration> },
    Wait,
    Done,
}

async fn run_send_loop(ctx: &Arc<SenderCtx>, timer: &RetransmitTimer) -> Result<Option<Instant>> {
    let mut started = None;
    loop {
        if ctx.finished.load(Ordering::SeqCst) {
            break;
        }
        let step = {
            let mut ctrl = ctx.ctrl.lock().await;
            if ctrl.next_seq >= ctx.total {
                SendStep::Done
            } else if ((ctrl.next_seq - ctrl.base) as f64) < ctrl.window(ctx.receive_window) {
                let seq = ctrl.next_seq;
                // Arm the timer whenever the window was empty before this
                // packet, i.e. it tracks the oldest unacknowledged packet.
                let arm_rto = (ctrl.base == seq).then(|| ctrl.rtt.rto());
                ctrl.next_seq += 1;
                SendStep::Transmit { seq, arm_rto }
            } else {
                SendStep::Wait
            }
        };
        match step {
            SendStep::Done => break,
            SendStep::Transmit { seq, arm_rto } => {
                if started.is_none() {
                    started = Some(Instant::now());
                }
                transmit_chunk(ctx, seq as u16).await?;
                trace!("sent #{seq}");
                if let Some(rto) = arm_rto {
                    timer.arm(rto);
                }
            }
            SendStep::Wait => {
                // Signalled by the ACK handler on every acknowledgment; a
                // stored permit covers ACKs that land between the window
                // check and this await.
                ctx.advance.notified().await;
            }
        }
    }
    Ok(started)
}

async fn transmit_chunk(ctx: &SenderCtx, seq_num: u16) -> Result<()> {
    let chunk = ctx.workload.chunk(seq_num);
    let packet = DataPacket {
        timestamp: monotonic_secs(),
        seq_num,
        total_chunks: ctx.workload.total_chunks(),
        chunk: chunk.clone(),
    };
    let mut writer = BinaryWriter::with_capacity(DATA_HEADER_LEN + chunk.payload.len());
    packet.write(&mut writer)?;
    ctx.data_socket.send_to(&writer.freeze(), ctx.peer).await?;
    Ok(())
}

/// Go-back-N resend of every packet in `[base, next_seq)`, each with a fresh
/// timestamp.
async fn retransmit_in_flight(ctx: &SenderCtx) -> Result<u32> {
    let (base, next_seq) = {
        let ctrl = ctx.ctrl.lock().await;
        (ctrl.base, ctrl.next_seq)
    };
    for seq in base..next_seq {
        transmit_chunk(ctx, seq as u16).await?;
    }
    let count = next_seq - base;
    ctx.retransmissions.fetch_add(count as u64, Ordering::Relaxed);
    Ok(count)
}

/// Timer expiry: resend all in-flight packets, collapse the window and rearm
/// with the current RTO. A no-op once everything is acknowledged.
async fn on_timeout(ctx: Arc<SenderCtx>) -> Option<Duration> {
    let rto = {
        let mut ctrl = ctx.ctrl.lock().await;
        if ctrl.base >= ctx.total {
            return None;
        }
        ctrl.on_timeout();
        ctrl.rtt.rto()
    };
    ctx.timeouts.fetch_add(1, Ordering::Relaxed);
    match retransmit_in_flight(&ctx).await {
        Ok(count) => {
            debug!("retransmission timeout: resent {count} in-flight packets");
            Some(rto)
        }
        Err(e) => {
            error!("retransmission failed: {e}");
            None
        }
    }
}

async fn run_ack_handler(
    ctx: Arc<SenderCtx>,
    ack_socket: Arc<UdpSocket>,
    timer: RetransmitTimer,
) -> Result<()> {
    let result = ack_loop(&ctx, &ack_socket, &timer).await;
    // Whatever ended the reverse channel, the send loop must not keep
    // waiting on window advances.
    ctx.finished.store(true, Ordering::SeqCst);
    ctx.advance.notify_one();
    result
}

async fn ack_loop(
    ctx: &Arc<SenderCtx>,
    ack_socket: &UdpSocket,
    timer: &RetransmitTimer,
) -> Result<()> {
    let mut buf = [0u8; 64];
    loop {
        let (len, _) = ack_socket.recv_from(&mut buf).await?;
        if len == 0 {
            // Receiver's termination signal.
            let base = ctx.ctrl.lock().await.base;
            if base < ctx.total {
                warn!(
                    "reverse channel closed with {} packets unacknowledged",
                    ctx.total - base
                );
            }
            return Ok(());
        }
        let mut reader = BinaryReader::new(Bytes::copy_from_slice(&buf[..len]));
        let ack = match AckPacket::read(&mut reader) {
            Ok(ack) => ack,
            Err(e) => {
                debug!("dropping corrupt ACK: {e}");
                continue;
            }
        };

        let (outcome, base) = {
            let mut ctrl = ctx.ctrl.lock().await;
            let outcome = ctrl.on_ack(ack.ack_seq, ack.timestamp, monotonic_secs());
            (outcome, ctrl.base)
        };
        // The send loop re-evaluates window admission on every ACK.
        ctx.advance.notify_one();

        match outcome {
            AckOutcome::Advanced { rto, rearm } => {
                trace!("cumulative ACK {} advanced base to {base}", ack.ack_seq);
                if rearm {
                    timer.arm(rto);
                } else {
                    timer.cancel();
                }
                if base >= ctx.total {
                    return Ok(());
                }
            }
            AckOutcome::FastRetransmit => {
                ctx.fast_retransmits.fetch_add(1, Ordering::Relaxed);
                let count = retransmit_in_flight(ctx).await?;
                debug!(
                    "fast retransmit after {DUP_ACK_THRESHOLD} duplicate ACKs for {}: resent {count} packets",
                    ack.ack_seq
                );
            }
            AckOutcome::Ignored => {}
        }
    }
}
