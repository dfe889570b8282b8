use tokio::sync::mpsc;

use crate::{CommsErr, Msg, Result};

enum Inner<T> {
    Bounded(mpsc::Receiver<Msg<T>>),
    Unbounded(mpsc::UnboundedReceiver<Msg<T>>),
}

/// The receiving end handle of a hand-off queue. There's exactly one per queue.
pub struct HandOffReceiver<T> {
    inner: Inner<T>,
}

impl<T> HandOffReceiver<T> {
    pub(super) fn bounded(rx: mpsc::Receiver<Msg<T>>) -> Self {
        Self {
            inner: Inner::Bounded(rx),
        }
    }

    pub(super) fn unbounded(rx: mpsc::UnboundedReceiver<Msg<T>>) -> Self {
        Self {
            inner: Inner::Unbounded(rx),
        }
    }

    /// Waits to receive the next message.
    ///
    /// # Returns
    /// The next message or an error if the sending end was dropped and the queue is drained.
    pub async fn recv(&mut self) -> Result<Msg<T>> {
        let msg = match &mut self.inner {
            Inner::Bounded(rx) => rx.recv().await,
            Inner::Unbounded(rx) => rx.recv().await,
        };

        msg.ok_or(CommsErr::Closed { side: "sending" })
    }

    /// Blocks the current thread until the next message arrives.
    ///
    /// # Returns
    /// The next message or an error if the sending end was dropped and the queue is drained.
    ///
    /// # Panics
    /// If called from within an asynchronous execution context.
    pub fn recv_blocking(&mut self) -> Result<Msg<T>> {
        let msg = match &mut self.inner {
            Inner::Bounded(rx) => rx.blocking_recv(),
            Inner::Unbounded(rx) => rx.blocking_recv(),
        };

        msg.ok_or(CommsErr::Closed { side: "sending" })
    }
}
