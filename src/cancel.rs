//! Cooperative cancellation for a running analysis.
//!
//! A [`CancelHandle`] / [`CancelSignal`] pair wraps a `tokio::sync::watch`
//! flag. The signal can also carry a deadline; it reports cancelled once
//! either the flag is raised or the deadline passes. Work that observes the
//! signal abandons its remote call but still runs its cleanup.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Raises the cancellation flag for every clone of the paired signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // send_replace never fails, even with no receivers left
        self.tx.send_replace(true);
    }
}

/// Observed by the pipeline to abandon work promptly.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

/// Create a connected handle/signal pair.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx, deadline: None })
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx, deadline: None }
    }

    /// Same signal, additionally firing `timeout` from now. An earlier
    /// existing deadline is kept.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let at = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < at => existing,
            _ => at,
        });
        self
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the signal fires. Pending forever for [`CancelSignal::never`].
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let flag = async move {
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    // sender gone without cancelling: the flag can never rise
                    std::future::pending::<()>().await;
                }
            }
        };
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = flag => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => flag.await,
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::never()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handle_cancels_all_clones() {
        let (handle, signal) = cancel_pair();
        let other = signal.clone();
        assert!(!signal.is_cancelled());
        let waiter = tokio::spawn(async move { other.cancelled().await });
        handle.cancel();
        waiter.await.unwrap();
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn deadline_fires() {
        let signal = CancelSignal::never().with_timeout(Duration::from_millis(20));
        tokio::time::timeout(Duration::from_secs(2), signal.cancelled())
            .await
            .expect("deadline should resolve the signal");
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn never_stays_pending() {
        let signal = CancelSignal::never();
        let res = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(res.is_err());
        assert!(!signal.is_cancelled());
    }
}
