//! Single-assignment result slot.
//!
//! Several sources may race to finish one helper call: the reply, the reader
//! noticing the connection closed, an I/O error, the caller's deadline. Each
//! calls [`OnceResult::complete`]; only the first value is delivered and every
//! later one is dropped.

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

#[derive(Debug)]
pub struct OnceResult<T> {
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> OnceResult<T> {
    /// A fresh slot plus the receiver that observes the winning value.
    pub fn channel() -> (Arc<Self>, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Self {
            sender: Mutex::new(Some(tx)),
        });
        (slot, rx)
    }

    /// Offer a value. Returns `true` if this call won the slot.
    pub fn complete(&self, value: T) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match sender {
            Some(tx) => {
                // The receiver may already be gone; the slot is still consumed.
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }
}
