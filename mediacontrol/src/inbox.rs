//! Handoff between engine threads and a coordinator's owning context.
//!
//! Engines may call their listeners from any thread. Listener handles only
//! post a message here; the coordinator drains the inbox from the thread
//! that owns it and applies the messages to its state machine. This is the
//! only synchronization point of the core: once a message has been taken
//! out of the inbox, the state machines are strictly single-writer.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use tracing::trace;

#[derive(Debug)]
pub(crate) struct Inbox<M> {
    tx: Sender<M>,
    rx: Receiver<M>,
}

impl<M> Inbox<M> {
    pub(crate) fn new() -> Self {
        let (tx, rx) = unbounded::<M>();
        Self { tx, rx }
    }

    /// A cloneable sending side, safe to hand to engine threads.
    pub(crate) fn handle(&self) -> InboxHandle<M> {
        InboxHandle {
            tx: self.tx.clone(),
        }
    }

    /// Takes the next message if one is already waiting.
    pub(crate) fn try_next(&self) -> Option<M> {
        self.rx.try_recv().ok()
    }

    /// Waits up to `timeout` for the next message.
    pub(crate) fn next_timeout(&self, timeout: Duration) -> Option<M> {
        match self.rx.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout) => None,
            // Impossible tant que l'inbox garde son propre Sender
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }
}

#[derive(Debug)]
pub(crate) struct InboxHandle<M> {
    tx: Sender<M>,
}

impl<M> Clone for InboxHandle<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<M> InboxHandle<M> {
    /// Posts a message; returns false when the coordinator is gone.
    pub(crate) fn post(&self, message: M) -> bool {
        if self.tx.send(message).is_err() {
            trace!("inbox closed, dropping engine callback");
            return false;
        }
        true
    }
}
