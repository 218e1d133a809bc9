//! Blocking wait for the transport to reach the connected state.

use crate::cancel::Wake;
use crate::{BridgeError, CancelToken, ConnectionState, Transport};
use parking_lot::{Condvar, Mutex};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Poll intervals below this are raised to it.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Blocks the calling thread until the transport reports
/// [`ConnectionState::Connected`].
///
/// The gate registers the transport's state callback so a transition wakes
/// waiters right away. The state is still re-read at least once per poll
/// interval, so transports that change state without notifying are observed
/// too. Registering another state callback on the same transport afterwards
/// disables the early wake-up, not the gate.
pub struct ConnectionGate<T: Transport + ?Sized> {
    transport: Arc<T>,
    signal: Arc<Signal>,
}

/// Bumped on every state notification or cancellation.
#[derive(Default)]
struct Signal {
    generation: Mutex<u64>,
    changed: Condvar,
}

impl Signal {
    fn bump(&self) {
        let mut generation = self.generation.lock();
        *generation = generation.wrapping_add(1);
        self.changed.notify_all();
    }
}

impl Wake for Signal {
    fn wake_all(&self) {
        self.bump();
    }
}

impl<T: Transport + ?Sized> ConnectionGate<T> {
    pub fn new(transport: Arc<T>) -> Self {
        let signal = Arc::new(Signal::default());
        let notifier = Arc::downgrade(&signal);
        transport.set_state_callback(Box::new(move |state: ConnectionState| {
            tracing::debug!(%state, "Transport state changed");
            if let Some(signal) = notifier.upgrade() {
                signal.bump();
            }
        }));
        Self { transport, signal }
    }

    /// Whether the transport is connected right now.
    pub fn is_ready(&self) -> bool {
        self.transport.state().is_connected()
    }

    /// Block until the transport is connected. There is no timeout: a
    /// transport that never connects blocks the caller forever. Use
    /// [`await_connected_for`](Self::await_connected_for) or
    /// [`await_connected_until`](Self::await_connected_until) for a bounded
    /// wait.
    pub fn await_connected(&self, poll_interval: Duration) {
        // Neither a deadline nor a token, so the wait cannot fail.
        let _ = self.wait(poll_interval, None, None);
    }

    /// Block until connected or until `timeout` has elapsed.
    pub fn await_connected_for(
        &self,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<(), BridgeError> {
        // A deadline past what `Instant` can represent is no deadline.
        let deadline = Instant::now().checked_add(timeout);
        self.wait(poll_interval, deadline, None)
            .map_err(|err| match err {
                BridgeError::ConnectTimeout { .. } => {
                    BridgeError::ConnectTimeout { waited: timeout }
                }
                other => other,
            })
    }

    /// Block until connected or until `cancel` fires.
    pub fn await_connected_until(
        &self,
        poll_interval: Duration,
        cancel: &CancelToken,
    ) -> Result<(), BridgeError> {
        self.wait(poll_interval, None, Some(cancel))
    }

    fn wait(
        &self,
        poll_interval: Duration,
        deadline: Option<Instant>,
        cancel: Option<&CancelToken>,
    ) -> Result<(), BridgeError> {
        let poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        let started = Instant::now();
        if let Some(cancel) = cancel {
            let weak: Weak<dyn Wake> = Arc::downgrade(&self.signal) as Weak<dyn Wake>;
            cancel.register(weak);
        }

        let mut last_seen: Option<ConnectionState> = None;
        loop {
            // Snapshot the generation before reading the state, so a
            // notification between the read and the wait is not lost. The
            // transport is never called with the signal lock held.
            let generation = *self.signal.generation.lock();
            let state = self.transport.state();
            if last_seen != Some(state) {
                if state.is_terminal() {
                    tracing::warn!(%state, "Transport is down while waiting to connect");
                } else {
                    tracing::debug!(%state, "Waiting for transport to connect");
                }
                last_seen = Some(state);
            }
            if state.is_connected() {
                tracing::info!(elapsed = ?started.elapsed(), "Transport connected");
                return Ok(());
            }
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return Err(BridgeError::Cancelled);
            }

            let now = Instant::now();
            let mut wake_at = now.checked_add(poll_interval);
            if let Some(deadline) = deadline {
                if now >= deadline {
                    return Err(BridgeError::ConnectTimeout {
                        waited: started.elapsed(),
                    });
                }
                wake_at = Some(wake_at.map_or(deadline, |at| at.min(deadline)));
            }

            let mut current = self.signal.generation.lock();
            if *current == generation {
                match wake_at {
                    Some(wake_at) => {
                        self.signal.changed.wait_until(&mut current, wake_at);
                    }
                    None => self.signal.changed.wait(&mut current),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;
    use std::thread;

    const POLL: Duration = Duration::from_millis(20);

    #[test]
    fn returns_immediately_when_connected() {
        let transport = Arc::new(FakeTransport::new());
        transport.set_state(ConnectionState::Connected);
        let gate = ConnectionGate::new(transport);
        assert!(gate.is_ready());
        gate.await_connected(POLL);
    }

    #[test]
    fn waits_through_intermediate_states() {
        let transport = Arc::new(FakeTransport::new());
        let gate = ConnectionGate::new(transport.clone());
        assert!(!gate.is_ready());

        let driver = transport.clone();
        let handle = thread::spawn(move || {
            for state in [
                ConnectionState::Startup,
                ConnectionState::Signup,
                ConnectionState::Offered,
            ] {
                thread::sleep(POLL * 2);
                driver.set_state(state);
            }
            thread::sleep(POLL * 2);
            driver.set_state(ConnectionState::Connected);
        });

        gate.await_connected(POLL);
        assert_eq!(transport.state(), ConnectionState::Connected);
        // Every state before Connected was observed by the gate at least once.
        assert!(transport.state_reads() >= 4);
        handle.join().unwrap();
    }

    #[test]
    fn observes_silent_transitions_by_polling() {
        let transport = Arc::new(FakeTransport::new());
        let gate = ConnectionGate::new(transport.clone());

        let driver = transport.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(60));
            driver.set_state_silently(ConnectionState::Connected);
        });

        let started = Instant::now();
        gate.await_connected(POLL);
        assert!(started.elapsed() < Duration::from_millis(60) + POLL * 5);
        handle.join().unwrap();
    }

    #[test]
    fn huge_poll_interval_relies_on_notification() {
        let transport = Arc::new(FakeTransport::new());
        let gate = ConnectionGate::new(transport.clone());

        let driver = transport.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            driver.set_state(ConnectionState::Connected);
        });

        gate.await_connected(Duration::MAX);
        assert!(gate.is_ready());
        handle.join().unwrap();
    }

    #[test]
    fn huge_timeout_is_unbounded() {
        let transport = Arc::new(FakeTransport::new());
        let gate = ConnectionGate::new(transport.clone());

        let driver = transport.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            driver.set_state_silently(ConnectionState::Connected);
        });

        gate.await_connected_for(POLL, Duration::from_secs(u64::MAX)).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn bounded_wait_times_out() {
        let transport = Arc::new(FakeTransport::new());
        let gate = ConnectionGate::new(transport);
        let err = gate
            .await_connected_for(POLL, Duration::from_millis(80))
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::ConnectTimeout { waited } if waited == Duration::from_millis(80)
        ));
    }

    #[test]
    fn cancelled_wait_returns_error() {
        let transport = Arc::new(FakeTransport::new());
        let gate = ConnectionGate::new(transport);
        let token = CancelToken::new();
        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(40));
            canceller.cancel();
        });

        // A long poll interval shows the cancel wakes the gate early.
        let started = Instant::now();
        let err = gate
            .await_connected_until(Duration::from_secs(10), &token)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }
}
