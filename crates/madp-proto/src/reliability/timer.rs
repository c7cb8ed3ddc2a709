use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

enum TimerCmd {
    Arm(Duration),
    Cancel,
}

/// A resettable one-shot retransmission timer.
///
/// The deadline is owned by a dedicated task, so the expiry callback can
/// never run concurrently with itself. `arm` implicitly cancels any pending
/// deadline. The callback returns the interval to rearm with, or `None` to
/// go idle. Dropping every handle shuts the task down.
#[derive(Clone)]
pub(crate) struct RetransmitTimer {
    tx: mpsc::UnboundedSender<TimerCmd>,
}

impl RetransmitTimer {
    pub fn spawn<F, Fut>(mut on_expiry: F) -> (Self, JoinHandle<()>)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Option<Duration>> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            let mut deadline: Option<Instant> = None;
            loop {
                let cmd = match deadline {
                    None => rx.recv().await,
                    Some(when) => {
                        tokio::select! {
                            cmd = rx.recv() => cmd,
                            _ = time::sleep_until(when) => {
                                deadline = on_expiry().await.map(|rearm| Instant::now() + rearm);
                                continue;
                            }
                        }
                    }
                };
                match cmd {
                    Some(TimerCmd::Arm(after)) => deadline = Some(Instant::now() + after),
                    Some(TimerCmd::Cancel) => deadline = None,
                    None => break,
                }
            }
        });
        (Self { tx }, task)
    }

    /// Arms the timer, replacing any pending deadline.
    pub fn arm(&self, after: Duration) {
        let _ = self.tx.send(TimerCmd::Arm(after));
    }

    /// Clears any pending deadline.
    pub fn cancel(&self) {
        let _ = self.tx.send(TimerCmd::Cancel);
    }
}
