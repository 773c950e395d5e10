//! Cancellation signals shared between the scheduler and its watchers.

use tokio::sync::watch;

/// Sending half of a cancellation signal. Triggering is idempotent.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// What a watcher listens to: the run-wide signal and its own.
#[derive(Debug, Clone)]
pub struct StopSignal {
    run: watch::Receiver<bool>,
    own: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn new(run: &StopHandle, own: &StopHandle) -> Self {
        Self {
            run: run.subscribe(),
            own: own.subscribe(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.run.borrow() || *self.own.borrow()
    }

    /// Resolve once either signal fires. A dropped sender counts as fired.
    pub async fn stopped(&mut self) {
        tokio::select! {
            _ = self.run.wait_for(|stop| *stop) => {}
            _ = self.own.wait_for(|stop| *stop) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_signal_stops_every_watcher() {
        let run = StopHandle::new();
        let a = StopHandle::new();
        let b = StopHandle::new();
        let mut sig_a = StopSignal::new(&run, &a);
        let mut sig_b = StopSignal::new(&run, &b);
        assert!(!sig_a.is_stopped());

        run.trigger();
        run.trigger();
        assert!(sig_a.is_stopped() && sig_b.is_stopped());
        tokio::time::timeout(Duration::from_secs(1), sig_a.stopped()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), sig_b.stopped()).await.unwrap();
    }

    #[tokio::test]
    async fn test_own_signal_is_independent() {
        let run = StopHandle::new();
        let a = StopHandle::new();
        let b = StopHandle::new();
        let mut sig_a = StopSignal::new(&run, &a);
        let sig_b = StopSignal::new(&run, &b);

        a.trigger();
        tokio::time::timeout(Duration::from_secs(1), sig_a.stopped()).await.unwrap();
        assert!(!sig_b.is_stopped());
        assert!(!run.is_triggered());
    }

    #[tokio::test]
    async fn test_dropped_handle_counts_as_stopped() {
        let run = StopHandle::new();
        let own = StopHandle::new();
        let mut signal = StopSignal::new(&run, &own);
        drop(own);
        tokio::time::timeout(Duration::from_secs(1), signal.stopped()).await.unwrap();
    }
}
