use std::sync::mpsc;

use tracing::trace;

pub struct EventSender<T> {
    tx: mpsc::Sender<T>,
}

pub struct EventReceiver<T> {
    rx: mpsc::Receiver<T>,
}

pub fn channel<T>() -> (EventSender<T>, EventReceiver<T>) {
    let (tx, rx) = mpsc::channel();
    (EventSender { tx }, EventReceiver { rx })
}

impl<T> Clone for EventSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> EventSender<T> {
    /// Sends `event`, dropping it when nobody is listening anymore.
    /// Returns whether the event was delivered.
    pub fn emit(&self, event: T) -> bool {
        if self.tx.send(event).is_err() {
            trace!("event receiver dropped; discarding event");
            return false;
        }
        true
    }
}

impl<T> EventReceiver<T> {
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Collects every event queued so far without blocking.
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }
}
