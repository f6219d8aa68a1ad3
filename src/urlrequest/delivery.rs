//! Where listener notifications run.
//!
//! A client is given one [`Delivery`] at build time. [`InlineDelivery`]
//! runs notifications on the worker that produced them; [`ChannelDelivery`]
//! hands them to a [`DeliveryQueue`] drained by a task the application
//! chooses, such as a UI loop.

use tokio::sync::mpsc;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Delivery: Send + Sync {
    fn deliver(&self, task: Task);
}

/// Runs each notification immediately on the calling task.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDelivery;

impl Delivery for InlineDelivery {
    fn deliver(&self, task: Task) {
        task();
    }
}

/// Queues notifications for a [`DeliveryQueue`].
#[derive(Clone)]
pub struct ChannelDelivery {
    tx: mpsc::UnboundedSender<Task>,
}

impl ChannelDelivery {
    pub fn new() -> (Self, DeliveryQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, DeliveryQueue { rx })
    }
}

impl Delivery for ChannelDelivery {
    fn deliver(&self, task: Task) {
        if self.tx.send(task).is_err() {
            tracing::debug!("Delivery queue closed, dropping notification");
        }
    }
}

/// The receiving side of a [`ChannelDelivery`].
pub struct DeliveryQueue {
    rx: mpsc::UnboundedReceiver<Task>,
}

impl DeliveryQueue {
    /// Wait for the next notification and run it. Returns false once every
    /// sender is gone.
    pub async fn run_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run notifications already queued without waiting.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Run notifications until every sender is dropped.
    pub async fn run(mut self) {
        while self.run_next().await {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_inline_runs_immediately() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        InlineDelivery.deliver(Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_channel_defers_until_drained() {
        let (delivery, mut queue) = ChannelDelivery::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let h = hits.clone();
            delivery.deliver(Box::new(move || {
                h.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(queue.run_pending(), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        drop(delivery);
        assert!(!queue.run_next().await);
    }
}
