use std::time::Duration;

use tokio::sync::mpsc::WeakUnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// One countdown tick, tagged with where it came from.
///
/// `generation` is the session run the ticker was started for; `ticker`
/// identifies the ticker task itself. Either one going stale makes the tick
/// a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSignal {
    pub generation: u64,
    pub ticker: u64,
}

/// Owns the background task that feeds ticks into a session's queue.
///
/// At most one ticker is alive. The task only holds a weak sender, so it
/// never keeps the queue open on its own and winds down once the owner is gone.
#[derive(Debug)]
pub struct TimerDriver {
    period: Duration,
    ticker: u64,
    task: Option<JoinHandle<()>>,
}

impl TimerDriver {
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            ticker: 0,
            task: None,
        }
    }

    #[must_use]
    pub fn is_ticking(&self) -> bool {
        self.task.is_some()
    }

    /// True if `signal` came from the live ticker.
    #[must_use]
    pub fn is_current(&self, signal: TickSignal) -> bool {
        self.task.is_some() && signal.ticker == self.ticker
    }

    /// Starts or stops the ticker so it matches `running`.
    pub fn sync<M>(&mut self, running: bool, generation: u64, tx: &WeakUnboundedSender<M>)
    where
        M: From<TickSignal> + Send + 'static,
    {
        match (running, self.task.is_some()) {
            (true, false) => self.start(generation, tx.clone()),
            (false, true) => self.stop(),
            _ => {}
        }
    }

    fn start<M>(&mut self, generation: u64, tx: WeakUnboundedSender<M>)
    where
        M: From<TickSignal> + Send + 'static,
    {
        self.ticker += 1;
        let signal = TickSignal {
            generation,
            ticker: self.ticker,
        };
        let period = self.period;
        log::debug!("starting ticker {} for generation {generation}", signal.ticker);

        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(tx) = tx.upgrade() else { break };
                if tx.send(M::from(signal)).is_err() {
                    break;
                }
            }
        }));
    }

    /// Aborts the live ticker. Ticks it already queued become stale.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.ticker += 1;
            log::debug!("ticker stopped");
        }
    }
}

impl Drop for TimerDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
