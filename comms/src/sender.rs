//! The sending end of a hand-off queue.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use tokio::sync::mpsc;

use crate::{CommsErr, Msg, Result};

enum Inner<T> {
    Bounded {
        tx: mpsc::Sender<Msg<T>>,
        peak: Arc<AtomicUsize>,
    },
    Unbounded(mpsc::UnboundedSender<Msg<T>>),
}

/// The sending end handle of a hand-off queue. There's exactly one per queue.
pub struct HandOffSender<T> {
    inner: Inner<T>,
}

impl<T> HandOffSender<T> {
    pub(super) fn bounded(tx: mpsc::Sender<Msg<T>>, peak: Arc<AtomicUsize>) -> Self {
        Self {
            inner: Inner::Bounded { tx, peak },
        }
    }

    pub(super) fn unbounded(tx: mpsc::UnboundedSender<Msg<T>>) -> Self {
        Self {
            inner: Inner::Unbounded(tx),
        }
    }

    /// Sends `msg` from synchronous code, blocking the thread while the queue is full.
    ///
    /// # Arguments
    /// * `msg` - The message to hand off.
    ///
    /// # Returns
    /// An error if the receiving end was dropped.
    ///
    /// # Panics
    /// If called from within an asynchronous execution context.
    pub fn send_blocking(&self, msg: Msg<T>) -> Result<()> {
        match &self.inner {
            Inner::Bounded { tx, peak } => {
                tx.blocking_send(msg).map_err(|_| closed())?;
                record_depth(tx, peak);
                Ok(())
            }
            Inner::Unbounded(tx) => tx.send(msg).map_err(|_| closed()),
        }
    }

    /// Sends `msg`, waiting while the queue is full.
    ///
    /// # Arguments
    /// * `msg` - The message to hand off.
    ///
    /// # Returns
    /// An error if the receiving end was dropped.
    pub async fn send(&self, msg: Msg<T>) -> Result<()> {
        match &self.inner {
            Inner::Bounded { tx, peak } => {
                tx.send(msg).await.map_err(|_| closed())?;
                record_depth(tx, peak);
                Ok(())
            }
            Inner::Unbounded(tx) => tx.send(msg).map_err(|_| closed()),
        }
    }

    /// Returns the highest amount of queued messages observed right after a send.
    ///
    /// Always zero for unbounded queues, which are not instrumented.
    pub fn peak_depth(&self) -> usize {
        match &self.inner {
            Inner::Bounded { peak, .. } => peak.load(Ordering::Relaxed),
            Inner::Unbounded(_) => 0,
        }
    }
}

fn record_depth<T>(tx: &mpsc::Sender<T>, peak: &AtomicUsize) {
    let depth = tx.max_capacity() - tx.capacity();
    peak.fetch_max(depth, Ordering::Relaxed);
}

fn closed() -> CommsErr {
    CommsErr::Closed { side: "receiving" }
}
