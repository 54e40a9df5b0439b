//! Delayed and debounced delivery of app events.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Send `event` on `tx` after `delay`
pub fn send_after<T: Send + 'static>(
    tx: mpsc::UnboundedSender<T>,
    delay: Duration,
    event: T,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = tx.send(event);
    })
}

/// A single pending-timer slot. Scheduling again replaces whatever was
/// pending, so a burst of triggers fires once, `delay` after the last one.
pub struct Debouncer {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn schedule<T: Send + 'static>(&mut self, tx: &mpsc::UnboundedSender<T>, event: T) {
        self.cancel();
        self.pending = Some(send_after(tx.clone(), self.delay, event));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_fires_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut debouncer = Debouncer::new(Duration::from_millis(500));

        for i in 0..5 {
            debouncer.schedule(&tx, i);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(rx.try_recv().ok(), Some(4));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_delivery() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut debouncer = Debouncer::new(Duration::from_millis(500));
        debouncer.schedule(&tx, ());
        assert!(debouncer.is_pending());
        debouncer.cancel();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn send_after_waits_for_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        send_after(tx, Duration::from_secs(2), "redirect");
        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert!(rx.try_recv().is_err());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(rx.try_recv().ok(), Some("redirect"));
    }
}
