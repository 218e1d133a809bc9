//! Thread-safe hand-off between transport callbacks and the consumer.

use crate::cancel::Wake;
use crate::{CancelToken, Message};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Insertion-ordered queue of inbound messages.
///
/// Any number of producers (transport callbacks, on whatever thread the
/// transport uses) append with [`on_message`]; a single consumer takes from
/// the head with [`pop`]. Clones share the same queue, so one clone can be
/// moved into the transport's message callback while the other stays with
/// the consumer.
///
/// The queue is unbounded.
///
/// [`on_message`]: InboundMessageQueue::on_message
/// [`pop`]: InboundMessageQueue::pop
#[derive(Clone, Default)]
pub struct InboundMessageQueue {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    items: Mutex<VecDeque<Message>>,
    available: Condvar,
}

impl Wake for Shared {
    fn wake_all(&self) {
        let _items = self.items.lock();
        self.available.notify_all();
    }
}

impl InboundMessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a payload to the tail. Never blocks for long and never fails.
    pub fn on_message(&self, payload: impl Into<Message>) {
        let message = payload.into();
        let mut items = self.shared.items.lock();
        items.push_back(message);
        tracing::trace!(queued = items.len(), "Inbound message queued");
        self.shared.available.notify_one();
    }

    /// A callback that feeds this queue, for
    /// [`Transport::set_message_callback`](crate::Transport::set_message_callback).
    pub fn callback(&self) -> impl Fn(String) + Send + Sync + 'static {
        let queue = self.clone();
        move |payload| queue.on_message(payload)
    }

    /// Block until a message is available, then remove and return the head.
    pub fn pop(&self) -> Message {
        let mut items = self.shared.items.lock();
        loop {
            if let Some(message) = items.pop_front() {
                return message;
            }
            self.shared.available.wait(&mut items);
        }
    }

    /// Like [`pop`](Self::pop), giving up after `timeout`. A timeout too
    /// large to represent as a deadline waits forever.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Message> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Some(self.pop());
        };
        let mut items = self.shared.items.lock();
        loop {
            if let Some(message) = items.pop_front() {
                return Some(message);
            }
            if self
                .shared
                .available
                .wait_until(&mut items, deadline)
                .timed_out()
            {
                return items.pop_front();
            }
        }
    }

    /// Like [`pop`](Self::pop), returning `None` once `cancel` fires.
    ///
    /// A message already queued is returned even if the token is cancelled.
    pub fn pop_until(&self, cancel: &CancelToken) -> Option<Message> {
        let weak: Weak<dyn Wake> = Arc::downgrade(&self.shared) as Weak<dyn Wake>;
        cancel.register(weak);
        let mut items = self.shared.items.lock();
        loop {
            if let Some(message) = items.pop_front() {
                return Some(message);
            }
            if cancel.is_cancelled() {
                return None;
            }
            self.shared.available.wait(&mut items);
        }
    }

    /// Remove and return the head without blocking.
    pub fn try_pop(&self) -> Option<Message> {
        self.shared.items.lock().pop_front()
    }

    /// Drop every queued message and return how many were dropped.
    ///
    /// Call this only while no [`pop`](Self::pop) is pending and no reply is
    /// expected, e.g. right before sending a new query. The operation itself
    /// is atomic, but a message the transport delivers concurrently with a
    /// reset may land on either side of it: it is either discarded or kept,
    /// and the caller cannot tell which.
    pub fn reset(&self) -> usize {
        let mut items = self.shared.items.lock();
        let dropped = items.len();
        items.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "Discarded stale inbound messages");
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.shared.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.items.lock().is_empty()
    }
}

impl std::fmt::Debug for InboundMessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundMessageQueue")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn pops_in_fifo_order() {
        let queue = InboundMessageQueue::new();
        for i in 0..5 {
            queue.on_message(format!("m{i}"));
        }
        for i in 0..5 {
            assert_eq!(queue.pop(), format!("m{i}").as_str());
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn pop_blocks_until_message_arrives() {
        let queue = InboundMessageQueue::new();
        let producer = queue.clone();
        let started = Instant::now();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            producer.on_message("late");
        });

        let message = queue.pop();
        assert_eq!(message, "late");
        assert!(started.elapsed() >= Duration::from_millis(100));
        handle.join().unwrap();
    }

    #[test]
    fn reset_discards_stale_messages() {
        let queue = InboundMessageQueue::new();
        queue.on_message("stale-1");
        queue.on_message("stale-2");
        assert_eq!(queue.reset(), 2);

        assert_eq!(queue.pop_timeout(Duration::from_millis(50)), None);

        let producer = queue.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            producer.on_message("fresh");
        });
        assert_eq!(queue.pop(), "fresh");
        handle.join().unwrap();
    }

    #[test]
    fn pop_timeout_returns_none_when_empty() {
        let queue = InboundMessageQueue::new();
        let started = Instant::now();
        assert_eq!(queue.pop_timeout(Duration::from_millis(30)), None);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn pop_timeout_accepts_unrepresentable_deadline() {
        let queue = InboundMessageQueue::new();
        queue.on_message("ready");
        assert_eq!(queue.pop_timeout(Duration::MAX), Some(Message::from("ready")));

        let producer = queue.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            producer.on_message("later");
        });
        assert_eq!(
            queue.pop_timeout(Duration::from_secs(u64::MAX)),
            Some(Message::from("later"))
        );
        handle.join().unwrap();
    }

    #[test]
    fn pop_until_is_woken_by_cancel() {
        let queue = InboundMessageQueue::new();
        let token = CancelToken::new();
        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });
        assert_eq!(queue.pop_until(&token), None);
        handle.join().unwrap();
    }

    #[test]
    fn pop_until_prefers_queued_message() {
        let queue = InboundMessageQueue::new();
        let token = CancelToken::new();
        token.cancel();
        queue.on_message("ready");
        assert_eq!(queue.pop_until(&token), Some(Message::from("ready")));
    }

    #[test]
    fn callback_feeds_queue() {
        let queue = InboundMessageQueue::new();
        let callback = queue.callback();
        callback("from-transport".to_string());
        assert_eq!(queue.try_pop(), Some(Message::from("from-transport")));
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        const PRODUCERS: usize = 8;
        const PER_PRODUCER: usize = 500;

        let queue = InboundMessageQueue::new();
        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let producer = queue.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        producer.on_message(format!("{p}:{i}"));
                    }
                })
            })
            .collect();

        let mut seen = HashSet::new();
        let mut last_per_producer = vec![None; PRODUCERS];
        for _ in 0..PRODUCERS * PER_PRODUCER {
            let message = queue.pop().into_string();
            let (p, i) = message.split_once(':').unwrap();
            let (p, i): (usize, usize) = (p.parse().unwrap(), i.parse().unwrap());
            // Each producer's own messages keep their order.
            if let Some(prev) = last_per_producer[p] {
                assert!(i > prev);
            }
            last_per_producer[p] = Some(i);
            assert!(seen.insert(message), "duplicate delivery");
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(seen.len(), PRODUCERS * PER_PRODUCER);
        assert!(queue.is_empty());
    }
}
