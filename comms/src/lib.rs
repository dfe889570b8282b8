mod error;
mod lr;
pub mod msg;
mod receiver;
mod sender;

use std::sync::{Arc, atomic::AtomicUsize};

use tokio::sync::mpsc;

pub use error::{CommsErr, Result};
pub use lr::LearningRate;
pub use msg::{Batch, Mode, Msg, Report};
pub use receiver::HandOffReceiver;
pub use sender::HandOffSender;

/// The queue between the batch producer and the training engine.
pub type BatchSender = HandOffSender<Batch>;
pub type BatchReceiver = HandOffReceiver<Batch>;

/// The queue between the training engine and the metrics logger.
pub type ReportSender = HandOffSender<Report>;
pub type ReportReceiver = HandOffReceiver<Report>;

/// Creates both ends of a bounded hand-off queue.
///
/// The sending end blocks (or awaits) once `capacity` messages are queued and not yet
/// received, this is what throttles a producer to stay close to its consumer.
///
/// # Arguments
/// * `capacity` - The maximum amount of queued messages, must be greater than zero.
///
/// # Returns
/// The sending and receiving ends of the queue.
///
/// # Panics
/// If `capacity` is zero.
pub fn hand_off<T>(capacity: usize) -> (HandOffSender<T>, HandOffReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    let peak = Arc::new(AtomicUsize::new(0));
    (
        HandOffSender::bounded(tx, peak),
        HandOffReceiver::bounded(rx),
    )
}

/// Creates both ends of an unbounded hand-off queue. Sending never blocks.
///
/// # Returns
/// The sending and receiving ends of the queue.
pub fn unbounded<T>() -> (HandOffSender<T>, HandOffReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (HandOffSender::unbounded(tx), HandOffReceiver::unbounded(rx))
}
