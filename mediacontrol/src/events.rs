//! Ordered event relay between coordinators and their observer.
//!
//! Each coordinator owns one [`EventRelay`]. Events are queued in emission
//! order and delivered on [`EventRelay::flush`], which the coordinator calls
//! at the end of every public operation and after draining its inbox. The
//! relay holds at most one observer: registering a new one silently drops
//! the previous one.

use std::collections::VecDeque;

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::trace;

/// Receives the events of one coordinator.
pub trait EventObserver<E>: Send {
    fn on_event(&mut self, event: &E);
}

impl<E, F> EventObserver<E> for F
where
    F: FnMut(&E) + Send,
{
    fn on_event(&mut self, event: &E) {
        self(event)
    }
}

/// Observer forwarding every event into a crossbeam channel.
pub struct ChannelObserver<E> {
    tx: Sender<E>,
}

impl<E> ChannelObserver<E> {
    pub fn new(tx: Sender<E>) -> Self {
        Self { tx }
    }
}

impl<E: Clone + Send> EventObserver<E> for ChannelObserver<E> {
    fn on_event(&mut self, event: &E) {
        // Le récepteur peut avoir été abandonné : on ignore simplement
        let _ = self.tx.send(event.clone());
    }
}

pub struct EventRelay<E> {
    observer: Option<Box<dyn EventObserver<E>>>,
    pending: VecDeque<E>,
}

impl<E> Default for EventRelay<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventRelay<E> {
    pub fn new() -> Self {
        Self {
            observer: None,
            pending: VecDeque::new(),
        }
    }

    /// Registers `observer`, replacing the current one.
    ///
    /// Returns true if an observer was replaced.
    pub fn set_observer(&mut self, observer: Box<dyn EventObserver<E>>) -> bool {
        self.observer.replace(observer).is_some()
    }

    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    pub fn has_observer(&self) -> bool {
        self.observer.is_some()
    }

    /// Queues an event for the next flush.
    pub fn emit(&mut self, event: E) {
        self.pending.push_back(event);
    }

    /// Delivers every queued event, oldest first.
    ///
    /// Without an observer the events are discarded.
    pub fn flush(&mut self) -> usize {
        let mut delivered = 0;
        while let Some(event) = self.pending.pop_front() {
            match self.observer.as_mut() {
                Some(observer) => {
                    observer.on_event(&event);
                    delivered += 1;
                }
                None => trace!("no observer registered, dropping event"),
            }
        }
        delivered
    }
}

impl<E: Clone + Send + 'static> EventRelay<E> {
    /// Registers a channel observer and returns its receiving end.
    pub fn observe(&mut self) -> Receiver<E> {
        let (tx, rx) = unbounded::<E>();
        self.set_observer(Box::new(ChannelObserver::new(tx)));
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_flush_keeps_emission_order() {
        let mut relay = EventRelay::<u32>::new();
        let rx = relay.observe();

        relay.emit(1);
        relay.emit(2);
        relay.emit(3);
        assert!(rx.try_recv().is_err(), "nothing is delivered before flush");

        assert_eq!(relay.flush(), 3);
        let received: Vec<u32> = rx.try_iter().collect();
        assert_eq!(received, vec![1, 2, 3]);
    }

    #[test]
    fn test_replacing_observer_stops_previous_delivery() {
        let mut relay = EventRelay::<&'static str>::new();
        let first = relay.observe();
        relay.emit("a");
        relay.flush();

        let second = relay.observe();
        relay.emit("b");
        relay.flush();

        assert_eq!(first.try_iter().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(second.try_iter().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_closure_observer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut relay = EventRelay::<u32>::new();
        let replaced = relay.set_observer(Box::new(move |event: &u32| {
            sink.lock().unwrap().push(*event);
        }));
        assert!(!replaced);

        relay.emit(42);
        relay.flush();
        assert_eq!(*seen.lock().unwrap(), vec![42]);
    }

    #[test]
    fn test_events_without_observer_are_dropped() {
        let mut relay = EventRelay::<u32>::new();
        relay.emit(1);
        assert_eq!(relay.flush(), 0);

        let rx = relay.observe();
        relay.flush();
        assert!(rx.try_recv().is_err());
    }
}
